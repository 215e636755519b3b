//! Filesystem-backed [`FileStorageService`].

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use voxline_core::error::CoreError;
use voxline_core::services::FileStorageService;

/// Stores objects as files under a root directory.
///
/// Remote paths are relative, `/`-separated keys; absolute paths and `..`
/// components are rejected so every key resolves inside the root.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a remote key to a path under the root.
    fn resolve(&self, remote_path: &str) -> Result<PathBuf, CoreError> {
        let key = Path::new(remote_path);
        if remote_path.trim().is_empty() {
            return Err(CoreError::Storage("Remote path must not be empty".into()));
        }
        if !key.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(CoreError::Storage(format!(
                "Remote path '{remote_path}' escapes the storage root"
            )));
        }
        Ok(self.root.join(key))
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> CoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CoreError::not_found("file", path.display())
    } else {
        CoreError::Storage(format!("Failed to {action} {}: {e}", path.display()))
    }
}

async fn copy_file(from: &Path, to: &Path) -> Result<(), CoreError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error("create", parent, e))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| io_error("copy", from, e))?;
    Ok(())
}

#[async_trait]
impl FileStorageService for LocalFileStorage {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<String, CoreError> {
        let target = self.resolve(remote_path)?;
        copy_file(local_path, &target).await?;
        tracing::debug!(local = %local_path.display(), remote_path, "File uploaded");
        self.get_url(remote_path).await
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), CoreError> {
        let source = self.resolve(remote_path)?;
        copy_file(&source, local_path).await
    }

    async fn delete(&self, remote_path: &str) -> Result<(), CoreError> {
        let target = self.resolve(remote_path)?;
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| io_error("delete", &target, e))
    }

    async fn get_url(&self, remote_path: &str) -> Result<String, CoreError> {
        let target = self.resolve(remote_path)?;
        let absolute = if target.is_absolute() {
            target
        } else {
            std::env::current_dir()
                .map_err(|e| CoreError::Storage(format!("Cannot resolve working directory: {e}")))?
                .join(target)
        };
        Ok(format!("file://{}", absolute.display()))
    }
}
