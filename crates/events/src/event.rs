//! Job event envelope and per-tag payload schemas.
//!
//! | tag            | payload                        |
//! |----------------|--------------------------------|
//! | `job.created`  | full [`Job`] record            |
//! | `job.updated`  | [`JobUpdate`]                  |
//! | `job.progress` | [`JobProgress`]                |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use voxline_core::error::CoreError;
use voxline_core::job::{Job, JobUpdate};
use voxline_core::types::JobId;

/// A job was accepted for processing.
pub const EVENT_JOB_CREATED: &str = "job.created";

/// A job changed status.
pub const EVENT_JOB_UPDATED: &str = "job.updated";

/// Interim progress of a running job.
pub const EVENT_JOB_PROGRESS: &str = "job.progress";

/// Progress report for a running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub id: JobId,
    /// Completion percentage (0-100).
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobProgress {
    pub fn new(id: JobId, percent: u8) -> Self {
        Self {
            id,
            percent: percent.min(100),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Tagged event envelope. Decode `payload` according to `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl JobEvent {
    /// Wrap any serializable payload under `event_type`.
    pub fn new(event_type: impl Into<String>, payload: &impl Serialize) -> Result<Self, CoreError> {
        Ok(Self {
            event_type: event_type.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// `job.created` carrying a copy of the job.
    pub fn created(job: &Job) -> Result<Self, CoreError> {
        Self::new(EVENT_JOB_CREATED, job)
    }

    /// `job.updated` carrying the transition.
    pub fn updated(update: &JobUpdate) -> Result<Self, CoreError> {
        Self::new(EVENT_JOB_UPDATED, update)
    }

    /// `job.progress` carrying a progress report.
    pub fn progress(progress: &JobProgress) -> Result<Self, CoreError> {
        Self::new(EVENT_JOB_PROGRESS, progress)
    }

    /// Decode the payload into the schema the caller expects for this tag.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use voxline_core::error::CoreError;
    use voxline_core::job_status::JobStatus;

    use super::*;

    #[test]
    fn created_event_carries_job_copy() {
        let job = Job::narration("", "/out/a.wav", "hello", "v1");
        let event = JobEvent::created(&job).unwrap();

        assert_eq!(event.event_type, EVENT_JOB_CREATED);
        let decoded: Job = event.decode_payload().unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn updated_event_decodes_update() {
        let mut job = Job::narration("", "/out/a.wav", "hello", "v1");
        let update = job.start().unwrap();
        let event = JobEvent::updated(&update).unwrap();

        assert_eq!(event.event_type, EVENT_JOB_UPDATED);
        assert_eq!(event.payload["status"], "running");
        let decoded: JobUpdate = event.decode_payload().unwrap();
        assert_eq!(decoded.status, JobStatus::Running);
    }

    #[test]
    fn progress_is_clamped() {
        let progress = JobProgress::new(JobId::new_v4(), 250).with_message("rendering");
        assert_eq!(progress.percent, 100);
        let event = JobEvent::progress(&progress).unwrap();
        assert_eq!(event.payload["message"], "rendering");
    }

    #[test]
    fn decoding_with_wrong_schema_fails() {
        let event = JobEvent::progress(&JobProgress::new(JobId::new_v4(), 5)).unwrap();
        assert_matches!(event.decode_payload::<Job>(), Err(CoreError::Serialization(_)));
    }

    #[test]
    fn envelope_uses_type_key() {
        let event = JobEvent::progress(&JobProgress::new(JobId::new_v4(), 5)).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "job.progress");
    }
}
