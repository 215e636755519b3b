//! Pool counters and the rolled-up system status report.
//!
//! [`SystemStatus`] is built fresh for every reporting cycle. Its fields are
//! private; the mutation methods below are the only way to change it.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp, WorkerId};
use crate::worker_status::WorkerStatus;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Queued jobs per worker above which the system is reported as degraded.
pub const DEGRADED_BACKLOG_PER_WORKER: usize = 10;

/// Failures in one UTC day at which the system is reported as degraded.
pub const DEGRADED_FAILURES_PER_DAY: u32 = 25;

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Health {
    pub fn name(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregate pool counters. Always derived from live state, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStatus {
    pub total_workers: usize,
    pub idle_workers: usize,
    pub processing_jobs: usize,
    pub queued_jobs: usize,
    pub failed_jobs_today: u32,
}

/// Classify health from pool counters and worker snapshots.
///
/// - `Unhealthy`: no workers, or every worker in error.
/// - `Degraded`: any worker in error, a backlog above
///   [`DEGRADED_BACKLOG_PER_WORKER`] per worker, or at least
///   [`DEGRADED_FAILURES_PER_DAY`] failures today.
/// - `Healthy`: otherwise.
pub fn evaluate_health(pool: &WorkerPoolStatus, workers: &[WorkerStatus]) -> Health {
    let erroring = workers.iter().filter(|w| w.is_error()).count();

    if pool.total_workers == 0 || (!workers.is_empty() && erroring == workers.len()) {
        return Health::Unhealthy;
    }
    if erroring > 0
        || pool.queued_jobs > pool.total_workers * DEGRADED_BACKLOG_PER_WORKER
        || pool.failed_jobs_today >= DEGRADED_FAILURES_PER_DAY
    {
        return Health::Degraded;
    }
    Health::Healthy
}

// ---------------------------------------------------------------------------
// SystemStatus
// ---------------------------------------------------------------------------

/// Externally reportable health snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    overall_health: Health,
    worker_pool: WorkerPoolStatus,
    workers: Vec<WorkerStatus>,
    last_updated: Timestamp,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    messages: Vec<String>,
}

impl SystemStatus {
    /// A healthy status with zeroed counters and no workers.
    pub fn new() -> Self {
        Self {
            overall_health: Health::Healthy,
            worker_pool: WorkerPoolStatus::default(),
            workers: Vec::new(),
            last_updated: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Build a report from a consistent pool snapshot, applying the health
    /// policy and attaching alert messages.
    pub fn from_snapshot(pool: WorkerPoolStatus, workers: Vec<WorkerStatus>) -> Self {
        let mut status = Self::new();
        status.update_worker_pool_status(pool);
        status.update_overall_health(evaluate_health(&pool, &workers));

        if pool.total_workers == 0 {
            status.add_message("No workers registered");
        }
        for worker in workers.iter().filter(|w| w.is_error()) {
            status.add_message(format!("Worker {} is failing repeatedly", worker.id));
        }
        if pool.queued_jobs > pool.total_workers * DEGRADED_BACKLOG_PER_WORKER {
            status.add_message(format!(
                "{} jobs queued for {} workers",
                pool.queued_jobs, pool.total_workers
            ));
        }
        if pool.failed_jobs_today >= DEGRADED_FAILURES_PER_DAY {
            status.add_message(format!("{} jobs failed today", pool.failed_jobs_today));
        }

        status.workers = workers;
        status
    }

    pub fn overall_health(&self) -> Health {
        self.overall_health
    }

    pub fn worker_pool(&self) -> &WorkerPoolStatus {
        &self.worker_pool
    }

    pub fn workers(&self) -> &[WorkerStatus] {
        &self.workers
    }

    pub fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    // ---- mutation ----

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn update_worker_pool_status(&mut self, pool: WorkerPoolStatus) {
        self.worker_pool = pool;
    }

    /// Upsert a worker entry by id, stamping `last_active` with now.
    /// New workers are appended, so insertion order is preserved.
    pub fn update_worker_status(
        &mut self,
        worker_id: &str,
        status: impl Into<String>,
        current_job: Option<JobId>,
    ) {
        let status = status.into();
        match self.workers.iter_mut().find(|w| w.id == worker_id) {
            Some(worker) => {
                worker.status = status;
                worker.current_job = current_job;
                worker.last_active = Utc::now();
            }
            None => {
                let mut worker = WorkerStatus::new(WorkerId::from(worker_id), status);
                worker.current_job = current_job;
                self.workers.push(worker);
            }
        }
    }

    pub fn remove_worker_status(&mut self, worker_id: &str) {
        self.workers.retain(|w| w.id != worker_id);
    }

    pub fn update_overall_health(&mut self, health: Health) {
        self.overall_health = health;
    }

    pub fn refresh_last_updated(&mut self) {
        self.last_updated = Utc::now();
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
