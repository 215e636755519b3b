//! Per-pool worker status arena and failure counter.
//!
//! The pool keeps one [`StatusBoard`] behind a single mutex. Callers go
//! through the three mutating entry points; reads return clones, so no
//! reference into the arena outlives the lock.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use voxline_core::system_status::WorkerPoolStatus;
use voxline_core::types::{JobId, WorkerId};
use voxline_core::worker_status::WorkerStatus;

pub(crate) struct StatusBoard {
    workers: BTreeMap<WorkerId, WorkerStatus>,
    failed_today: u32,
    /// UTC day `failed_today` counts for.
    failed_day: NaiveDate,
}

impl StatusBoard {
    pub(crate) fn new() -> Self {
        Self {
            workers: BTreeMap::new(),
            failed_today: 0,
            failed_day: Utc::now().date_naive(),
        }
    }

    /// Upsert a worker entry, stamping `last_active`.
    pub(crate) fn set_worker_status(&mut self, id: &str, status: &str, current_job: Option<JobId>) {
        let entry = self
            .workers
            .entry(id.to_string())
            .or_insert_with(|| WorkerStatus::new(id, status));
        entry.status = status.to_string();
        entry.current_job = current_job;
        entry.last_active = Utc::now();
    }

    pub(crate) fn remove_worker_status(&mut self, id: &str) -> bool {
        self.workers.remove(id).is_some()
    }

    pub(crate) fn record_failure(&mut self) {
        self.record_failure_on(Utc::now().date_naive());
    }

    fn record_failure_on(&mut self, today: NaiveDate) {
        self.roll_to(today);
        self.failed_today = self.failed_today.saturating_add(1);
    }

    fn roll_to(&mut self, today: NaiveDate) {
        if today != self.failed_day {
            self.failed_day = today;
            self.failed_today = 0;
        }
    }

    pub(crate) fn get(&self, id: &str) -> Option<WorkerStatus> {
        self.workers.get(id).cloned()
    }

    /// Counters for the current arena plus `queued_jobs`.
    pub(crate) fn pool_status(&mut self, queued_jobs: usize) -> WorkerPoolStatus {
        self.roll_to(Utc::now().date_naive());
        let total_workers = self.workers.len();
        let processing_jobs = self.workers.values().filter(|w| !w.is_idle()).count();
        WorkerPoolStatus {
            total_workers,
            idle_workers: total_workers - processing_jobs,
            processing_jobs,
            queued_jobs,
            failed_jobs_today: self.failed_today,
        }
    }

    /// Counters and worker entries taken under the same lock.
    pub(crate) fn snapshot(&mut self, queued_jobs: usize) -> (WorkerPoolStatus, Vec<WorkerStatus>) {
        let pool = self.pool_status(queued_jobs);
        (pool, self.workers.values().cloned().collect())
    }
}
