use crate::job_status::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A submission whose payload is missing or inconsistent with its type.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Queue is closed")]
    QueueClosed,

    #[error("Queue is empty")]
    QueueEmpty,

    /// A waiting operation observed its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// Failure reported by a narration or mixing engine.
    #[error("Service error: {0}")]
    Service(String),

    /// Failure reported by a storage or database collaborator.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] keyed by any displayable id.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_queue_full() {
        let err = CoreError::QueueFull { capacity: 8 };
        assert_eq!(err.to_string(), "Queue is full (capacity 8)");
    }

    #[test]
    fn display_invalid_transition() {
        let err = CoreError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Running,
        };
        assert_eq!(err.to_string(), "Invalid transition: completed -> running");
    }

    #[test]
    fn not_found_formats_id() {
        let err = CoreError::not_found("worker", "worker-7");
        assert_eq!(err.to_string(), "Entity not found: worker with id worker-7");
    }
}
