//! Voxline job execution: queue, worker pool and reference engines.
//!
//! [`WorkerPool`] is the entry point. Build it with a [`PoolConfig`], the
//! [`Engines`] jobs are routed to, and an event publisher (normally an
//! `Arc<voxline_events::EventBus>`), register workers, then
//! [`start`](WorkerPool::start) it.

mod board;
pub mod config;
mod dispatcher;
pub mod engines;
pub mod pool;
pub mod queue;
pub mod reporter;
pub mod storage;
mod worker;

pub use config::{LogFormat, PoolConfig, ShutdownPolicy, WorkerConfig};
pub use engines::{CommandNarrator, Engines, FfmpegMixer};
pub use pool::WorkerPool;
pub use queue::JobQueue;
pub use reporter::StatusReporter;
pub use storage::LocalFileStorage;
