/// Jobs are identified by random (v4) UUIDs generated at creation.
pub type JobId = uuid::Uuid;

/// Workers are identified by operator-chosen names, e.g. `worker-1`.
pub type WorkerId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
