//! Voxline core domain types.
//!
//! Pure data and rules shared by every other crate in the workspace:
//!
//! - [`job`]: the [`Job`](job::Job) record, its tagged payload and the
//!   [`JobUpdate`](job::JobUpdate) partial-update message.
//! - [`job_status`]: job lifecycle states and the transition table.
//! - [`worker_status`] / [`system_status`]: per-worker snapshots and the
//!   rolled-up system health report.
//! - [`services`]: collaborator traits (narration, mixing, storage, database)
//!   the worker pool calls but does not implement.
//!
//! This crate has no internal dependencies and performs no I/O.

pub mod error;
pub mod job;
pub mod job_status;
pub mod services;
pub mod system_status;
pub mod types;
pub mod worker_status;
