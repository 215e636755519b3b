//! A single worker: announce idle, take one assignment, execute, repeat.
//!
//! Job failures never leave the loop. The job is marked `failed`, the
//! failure is counted, and the worker goes back to idle. After
//! [`ERROR_STREAK_THRESHOLD`] consecutive failures it reports `error`
//! instead of `idle` until a job succeeds.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use voxline_core::error::CoreError;
use voxline_core::job::{Job, JobUpdate};
use voxline_core::services::RenderedAudio;
use voxline_core::types::WorkerId;
use voxline_core::worker_status::{ERROR_STREAK_THRESHOLD, WORKER_BUSY, WORKER_ERROR, WORKER_IDLE};
use voxline_events::JobProgress;

use crate::dispatcher::{Assignment, ReadyToken};
use crate::pool::PoolShared;

/// Worker inbox depth. A worker holds at most one assignment it has not
/// started, matching its single outstanding ready announcement.
const INBOX_CAPACITY: usize = 1;

pub(crate) struct Worker {
    id: WorkerId,
    shared: Arc<PoolShared>,
    inbox: mpsc::Receiver<Assignment>,
    inbox_tx: mpsc::Sender<Assignment>,
    stop: CancellationToken,
    failure_streak: u32,
}

/// Stop switch for a worker that may already be running in its own task.
/// The worker's status is read through `WorkerPool::worker_status`.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    stop: CancellationToken,
}

impl WorkerHandle {
    /// Ask the worker to exit after its current job. Non-blocking.
    pub(crate) fn stop(&self) {
        self.stop.cancel();
    }
}

impl Worker {
    pub(crate) fn new(id: WorkerId, shared: Arc<PoolShared>) -> Self {
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        Self {
            id,
            shared,
            inbox,
            inbox_tx,
            stop: CancellationToken::new(),
            failure_streak: 0,
        }
    }

    pub(crate) fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            stop: self.stop.clone(),
        }
    }

    /// Run until stopped. Consumes the worker.
    pub(crate) async fn run(mut self) {
        tracing::info!(worker_id = %self.id, "Worker started");

        while !self.stop.is_cancelled() {
            self.announce_idle();

            // Prefer a buffered assignment over the stop signal: a job the
            // dispatcher already handed over is processed, not stranded.
            let assignment = tokio::select! {
                biased;
                assignment = self.inbox.recv() => assignment,
                _ = self.stop.cancelled() => None,
            };
            let Some(assignment) = assignment else {
                break;
            };

            self.process(assignment).await;
        }

        self.detach();
        tracing::info!(worker_id = %self.id, "Worker stopped");
    }

    fn announce_idle(&self) {
        let status = if self.failure_streak >= ERROR_STREAK_THRESHOLD {
            WORKER_ERROR
        } else {
            WORKER_IDLE
        };
        self.shared.set_worker_status(&self.id, status, None);

        let ready = ReadyToken {
            worker_id: self.id.clone(),
            inbox: self.inbox_tx.clone(),
        };
        if self.shared.ready_tx.send(ready).is_err() {
            tracing::debug!(worker_id = %self.id, "Dispatcher gone, idle announcement dropped");
        }
    }

    async fn process(&mut self, assignment: Assignment) {
        let Assignment { mut job, cancel } = assignment;
        let job_id = job.id();
        self.shared.set_worker_status(&self.id, WORKER_BUSY, Some(job_id));

        let outcome = if cancel.is_cancelled() {
            job.cancel()
        } else {
            self.run_job(&mut job, &cancel).await
        };

        match outcome {
            Ok(update) => {
                tracing::info!(
                    job_id = %job_id,
                    worker_id = %self.id,
                    status = %update.status,
                    "Job finished",
                );
                self.shared.publish_update(&update);
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    worker_id = %self.id,
                    error = %e,
                    "Job transition rejected",
                );
            }
        }

        self.shared.release(job_id);
    }

    /// Move `job` to running, call its engine, and return the terminal
    /// transition.
    async fn run_job(
        &mut self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<JobUpdate, CoreError> {
        let started = job.start()?;
        self.shared.publish_update(&started);
        self.shared.publish_progress(&JobProgress::new(job.id(), 0));
        tracing::info!(
            job_id = %job.id(),
            worker_id = %self.id,
            job_type = %job.kind(),
            "Job started",
        );

        let result = self.execute(job).await;
        self.shared.publish_progress(&JobProgress::new(job.id(), 100));

        if cancel.is_cancelled() {
            return job.cancel();
        }

        match result {
            Ok(rendered) => {
                self.failure_streak = 0;
                job.complete(Some(rendered.output_path))
            }
            Err(e) => {
                self.failure_streak += 1;
                self.shared.record_failure();
                tracing::warn!(
                    job_id = %job.id(),
                    worker_id = %self.id,
                    error = %e,
                    failure_streak = self.failure_streak,
                    "Job failed",
                );
                job.fail(e.to_string())
            }
        }
    }

    /// Call the engine under the job timeout. Engine panics become errors.
    async fn execute(&self, job: &Job) -> Result<RenderedAudio, CoreError> {
        let timeout = self.shared.config.job_timeout;
        let call = AssertUnwindSafe(self.shared.engines.execute(job)).catch_unwind();

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(CoreError::Service("Engine panicked".into())),
            Err(_elapsed) => Err(CoreError::Service(format!(
                "Job timed out after {timeout:?}"
            ))),
        }
    }

    /// Return anything still buffered in the inbox to the queue and leave
    /// the status arena.
    fn detach(&mut self) {
        self.inbox.close();
        while let Ok(assignment) = self.inbox.try_recv() {
            self.shared.return_to_queue(assignment.job);
        }
        self.shared.remove_worker_status(&self.id);
    }
}
