//! Job record, type-specific payloads, and the partial-update message.
//!
//! A [`Job`] is created once via [`Job::new`] and afterwards only moves
//! through the lifecycle in [`crate::job_status`]. Each transition method
//! returns the [`JobUpdate`] that describes it, so callers can publish it
//! without re-reading the job.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job_status::JobStatus;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lowest accepted background volume for mixing jobs.
pub const MIN_VOLUME: f64 = 0.0;

/// Highest accepted background volume for mixing jobs.
pub const MAX_VOLUME: f64 = 1.0;

// ---------------------------------------------------------------------------
// Job kind and payload
// ---------------------------------------------------------------------------

/// The two kinds of audio-production work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Narration,
    Mixing,
}

impl JobKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Narration => "narration",
            Self::Mixing => "mixing",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type-specific job data. The variant *is* the job type, so a job can
/// never carry the fields of both kinds.
///
/// Serialized inline into the job record with a `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobPayload {
    /// Text-to-speech narration.
    Narration {
        text_content: String,
        voice_id: String,
    },
    /// Mix a background track under the input audio.
    Mixing {
        background_audio_file_path: String,
        /// Background gain, `0.0..=1.0`.
        volume: f64,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Narration { .. } => JobKind::Narration,
            Self::Mixing { .. } => JobKind::Mixing,
        }
    }

    /// Check that the payload carries everything its kind needs.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::Narration {
                text_content,
                voice_id,
            } => {
                if text_content.trim().is_empty() {
                    return Err(CoreError::InvalidJob(
                        "Narration job requires non-empty text_content".to_string(),
                    ));
                }
                if voice_id.trim().is_empty() {
                    return Err(CoreError::InvalidJob(
                        "Narration job requires a voice_id".to_string(),
                    ));
                }
            }
            Self::Mixing {
                background_audio_file_path,
                volume,
            } => {
                if background_audio_file_path.trim().is_empty() {
                    return Err(CoreError::InvalidJob(
                        "Mixing job requires a background_audio_file_path".to_string(),
                    ));
                }
                if !volume.is_finite() || !(MIN_VOLUME..=MAX_VOLUME).contains(volume) {
                    return Err(CoreError::InvalidJob(format!(
                        "Mixing volume {volume} is outside {MIN_VOLUME}..={MAX_VOLUME}"
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One unit of audio-production work.
///
/// Serializes to the flat persisted record: `id`, `type`, `status`,
/// `created_at`, `updated_at`, `input_file_path`, `output_file_path`, the
/// payload fields of its kind, and `error` when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    #[serde(flatten)]
    payload: JobPayload,
    status: JobStatus,
    created_at: Timestamp,
    updated_at: Timestamp,
    input_file_path: String,
    output_file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Job {
    /// Create a pending job with a fresh id. Both timestamps are set to now.
    pub fn new(
        payload: JobPayload,
        input_file_path: impl Into<String>,
        output_file_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new_v4(),
            payload,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            input_file_path: input_file_path.into(),
            output_file_path: output_file_path.into(),
            error: None,
        }
    }

    /// Create a narration job.
    pub fn narration(
        input_file_path: impl Into<String>,
        output_file_path: impl Into<String>,
        text_content: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> Self {
        Self::new(
            JobPayload::Narration {
                text_content: text_content.into(),
                voice_id: voice_id.into(),
            },
            input_file_path,
            output_file_path,
        )
    }

    /// Create a mixing job.
    pub fn mixing(
        input_file_path: impl Into<String>,
        output_file_path: impl Into<String>,
        background_audio_file_path: impl Into<String>,
        volume: f64,
    ) -> Self {
        Self::new(
            JobPayload::Mixing {
                background_audio_file_path: background_audio_file_path.into(),
                volume,
            },
            input_file_path,
            output_file_path,
        )
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn input_file_path(&self) -> &str {
        &self.input_file_path
    }

    pub fn output_file_path(&self) -> &str {
        &self.output_file_path
    }

    /// Failure reason; only ever set on failed jobs.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validate a submission: payload consistent with its kind, and a
    /// destination to write to. Mixing also needs the input to mix over.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.output_file_path.trim().is_empty() {
            return Err(CoreError::InvalidJob(
                "Job requires an output_file_path".to_string(),
            ));
        }
        if self.kind() == JobKind::Mixing && self.input_file_path.trim().is_empty() {
            return Err(CoreError::InvalidJob(
                "Mixing job requires an input_file_path".to_string(),
            ));
        }
        self.payload.validate()
    }

    // ---- transitions ----

    /// `pending -> running`, on dispatch to a worker.
    pub fn start(&mut self) -> Result<JobUpdate, CoreError> {
        self.transition(JobStatus::Running)?;
        Ok(JobUpdate::new(self.id, JobStatus::Running))
    }

    /// `running -> completed`. `output_file_path` replaces the requested
    /// path when the engine reports where it actually wrote.
    pub fn complete(&mut self, output_file_path: Option<String>) -> Result<JobUpdate, CoreError> {
        self.transition(JobStatus::Completed)?;
        if let Some(path) = output_file_path {
            self.output_file_path = path;
        }
        Ok(JobUpdate {
            output_file_path: Some(self.output_file_path.clone()),
            ..JobUpdate::new(self.id, JobStatus::Completed)
        })
    }

    /// `running -> failed`, recording the reason.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<JobUpdate, CoreError> {
        self.transition(JobStatus::Failed)?;
        let error = error.into();
        self.error = Some(error.clone());
        Ok(JobUpdate {
            error: Some(error),
            ..JobUpdate::new(self.id, JobStatus::Failed)
        })
    }

    /// `pending | running -> canceled`.
    pub fn cancel(&mut self) -> Result<JobUpdate, CoreError> {
        self.transition(JobStatus::Canceled)?;
        Ok(JobUpdate::new(self.id, JobStatus::Canceled))
    }

    /// Replay an update produced elsewhere (e.g. by a worker) onto this copy.
    ///
    /// Replaying the status the job already has is a no-op, so duplicate
    /// deliveries are harmless.
    pub fn apply(&mut self, update: &JobUpdate) -> Result<(), CoreError> {
        if update.id != self.id {
            return Err(CoreError::InvalidJob(format!(
                "Update for job {} applied to job {}",
                update.id, self.id
            )));
        }
        if update.status == self.status {
            return Ok(());
        }
        match update.status {
            JobStatus::Completed => {
                self.complete(update.output_file_path.clone())?;
            }
            JobStatus::Failed => {
                self.fail(update.error.clone().unwrap_or_default())?;
            }
            status => self.transition(status)?,
        }
        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), CoreError> {
        self.status.validate_transition(to)?;
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    // ---- encoding ----

    /// Encode the persisted JSON record.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a persisted JSON record.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(data)?)
    }
}

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// Partial update describing one status transition of a job.
///
/// Carries no payload fields, so it cannot change a job's type or inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Finalized output path; only present on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_path: Option<String>,
}

impl JobUpdate {
    pub fn new(id: JobId, status: JobStatus) -> Self {
        Self {
            id,
            status,
            error: None,
            output_file_path: None,
        }
    }
}

impl fmt::Display for JobUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {} -> {}", self.id, self.status)?;
        if let Some(error) = &self.error {
            write!(f, " ({error})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SubmitJob
// ---------------------------------------------------------------------------

/// DTO for describing a job to submit, e.g. from a JSON spool file.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJob {
    #[serde(default)]
    pub input_file_path: String,
    pub output_file_path: String,
    #[serde(flatten)]
    pub payload: JobPayload,
}

impl SubmitJob {
    pub fn into_job(self) -> Job {
        Job::new(self.payload, self.input_file_path, self.output_file_path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
