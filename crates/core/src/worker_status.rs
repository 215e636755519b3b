//! Per-worker status snapshots and worker id validation.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp, WorkerId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The worker is waiting for an assignment.
pub const WORKER_IDLE: &str = "idle";

/// The worker is executing a job.
pub const WORKER_BUSY: &str = "busy";

/// The worker is available but its recent jobs keep failing.
pub const WORKER_ERROR: &str = "error";

/// Consecutive job failures after which an idle worker reports [`WORKER_ERROR`].
pub const ERROR_STREAK_THRESHOLD: u32 = 3;

/// Maximum length of a worker id.
const MAX_ID_LEN: usize = 128;

// ---------------------------------------------------------------------------
// WorkerStatus
// ---------------------------------------------------------------------------

/// Point-in-time view of one worker.
///
/// `status` is open-ended; the pool writes one of [`WORKER_IDLE`],
/// [`WORKER_BUSY`] or [`WORKER_ERROR`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_job: Option<JobId>,
    pub last_active: Timestamp,
}

impl WorkerStatus {
    pub fn new(id: impl Into<WorkerId>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            current_job: None,
            last_active: Utc::now(),
        }
    }

    /// A worker without a current job counts as idle, whatever its label.
    pub fn is_idle(&self) -> bool {
        self.current_job.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.status == WORKER_ERROR
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a worker id.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_ID_LEN` characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters.
pub fn validate_worker_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::Validation(
            "Worker id must not be empty".to_string(),
        ));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Worker id must not exceed {MAX_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "Worker id may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}
