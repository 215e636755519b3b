//! Collaborator interfaces the worker pool calls but does not implement.
//!
//! Engines (narration, mixing) and persistence (database, file storage) are
//! external. The pool only depends on these traits; reference adapters live
//! in `voxline-worker` and `voxline-db`.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::Job;
use crate::job_status::JobStatus;
use crate::types::JobId;

/// What an engine produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedAudio {
    /// Path the engine actually wrote; becomes the job's final output path.
    pub output_path: String,
}

impl RenderedAudio {
    pub fn new(output_path: impl Into<String>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }
}

/// Text-to-speech engine.
#[async_trait]
pub trait NarratorService: Send + Sync {
    /// Render `text` with `voice_id` into `output_path`.
    ///
    /// Failures are reported as [`CoreError::Service`].
    async fn narrate(
        &self,
        text: &str,
        voice_id: &str,
        output_path: &str,
    ) -> Result<RenderedAudio, CoreError>;
}

/// Audio mixing engine.
#[async_trait]
pub trait AudioMixerService: Send + Sync {
    /// Mix `background_path` at `volume` under `input_path` into `output_path`.
    async fn mix(
        &self,
        input_path: &str,
        background_path: &str,
        output_path: &str,
        volume: f64,
    ) -> Result<RenderedAudio, CoreError>;
}

/// Job record store.
///
/// Implementations report missing rows as [`CoreError::NotFound`] and
/// backend failures as [`CoreError::Storage`].
#[async_trait]
pub trait Database: Send + Sync {
    async fn save_job(&self, job: &Job) -> Result<(), CoreError>;

    async fn get_job(&self, id: JobId) -> Result<Job, CoreError>;

    async fn update_job(&self, job: &Job) -> Result<(), CoreError>;

    async fn delete_job(&self, id: JobId) -> Result<(), CoreError>;

    /// List jobs ordered by creation time, optionally filtered by status.
    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, CoreError>;
}

/// Mapping between local files and a remote object store.
#[async_trait]
pub trait FileStorageService: Send + Sync {
    /// Upload a local file, returning its URL.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<String, CoreError>;

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), CoreError>;

    async fn delete(&self, remote_path: &str) -> Result<(), CoreError>;

    async fn get_url(&self, remote_path: &str) -> Result<String, CoreError>;
}
