//! Shared subprocess execution for the command-line engines.
//!
//! Engines build a [`Command`] and delegate spawn, output capture and exit
//! status handling to [`run_command`]. The child is spawned with
//! `kill_on_drop(true)`, so dropping the returned future (the worker's job
//! timeout firing) kills the process.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use voxline_core::error::CoreError;

/// Maximum stderr/stdout captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Maximum stderr characters carried into an error message.
const MAX_ERROR_CHARS: usize = 500;

/// Error from running an external engine program.
#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with code {exit_code:?}: {stderr}")]
    ExecutionFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SubprocessError> for CoreError {
    fn from(err: SubprocessError) -> Self {
        CoreError::Service(err.to_string())
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Spawn `cmd`, capture its output, and fail on a non-zero exit.
pub async fn run_command(cmd: &mut Command) -> Result<CommandOutput, SubprocessError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| SubprocessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let status = child.wait().await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

    if !status.success() {
        return Err(SubprocessError::ExecutionFailed {
            program,
            exit_code: status.code(),
            stderr: truncate(stderr.trim(), MAX_ERROR_CHARS),
        });
    }

    tracing::debug!(program = %program, duration_ms, "Engine command finished");
    Ok(CommandOutput {
        stdout,
        stderr,
        duration_ms,
    })
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Create the directory an engine will write `output_path` into.
pub(crate) async fn create_parent_dir(output_path: &str) -> Result<(), CoreError> {
    let Some(parent) = Path::new(output_path).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| CoreError::Service(format!("cannot create {}: {e}", parent.display())))
}
