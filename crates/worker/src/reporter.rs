//! Periodic system status snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use voxline_core::system_status::{Health, SystemStatus};

use crate::pool::WorkerPool;

/// Background task that samples [`WorkerPool::system_status`] on a fixed
/// interval, logs it, and publishes it on a `watch` channel.
pub struct StatusReporter;

impl StatusReporter {
    /// Spawn the reporter. The receiver always holds the latest snapshot;
    /// the task exits when `cancel` fires.
    pub fn spawn(
        pool: Arc<WorkerPool>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (watch::Receiver<SystemStatus>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(pool.system_status());
        let task = tokio::spawn(Self::run(pool, interval, tx, cancel));
        (rx, task)
    }

    async fn run(
        pool: Arc<WorkerPool>,
        interval: Duration,
        tx: watch::Sender<SystemStatus>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            "Status reporter started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Status reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let status = pool.system_status();
                    log_status(&status);
                    tx.send_replace(status);
                }
            }
        }
    }
}

fn log_status(status: &SystemStatus) {
    let pool = status.worker_pool();
    match status.overall_health() {
        Health::Healthy => tracing::info!(
            health = %status.overall_health(),
            total_workers = pool.total_workers,
            idle_workers = pool.idle_workers,
            processing_jobs = pool.processing_jobs,
            queued_jobs = pool.queued_jobs,
            failed_jobs_today = pool.failed_jobs_today,
            "System status",
        ),
        Health::Degraded | Health::Unhealthy => tracing::warn!(
            health = %status.overall_health(),
            total_workers = pool.total_workers,
            idle_workers = pool.idle_workers,
            processing_jobs = pool.processing_jobs,
            queued_jobs = pool.queued_jobs,
            failed_jobs_today = pool.failed_jobs_today,
            messages = ?status.messages(),
            "System status",
        ),
    }
}
