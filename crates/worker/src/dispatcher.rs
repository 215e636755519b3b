//! Pairs idle workers with queued jobs.
//!
//! A single long-lived task. Each iteration waits for a worker to announce
//! itself idle, then takes the next job from the queue (FIFO) and hands it
//! to that worker's inbox together with the job's cancellation token.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use voxline_core::error::CoreError;
use voxline_core::job::Job;
use voxline_core::types::WorkerId;

use crate::pool::PoolShared;

/// A job handed to a worker, with its cancellation token.
pub(crate) struct Assignment {
    pub(crate) job: Job,
    pub(crate) cancel: CancellationToken,
}

/// A worker's announcement that it can take one job.
pub(crate) struct ReadyToken {
    pub(crate) worker_id: WorkerId,
    pub(crate) inbox: mpsc::Sender<Assignment>,
}

pub(crate) struct Dispatcher {
    shared: Arc<PoolShared>,
    ready_rx: mpsc::UnboundedReceiver<ReadyToken>,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<PoolShared>,
        ready_rx: mpsc::UnboundedReceiver<ReadyToken>,
    ) -> Self {
        Self { shared, ready_rx }
    }

    /// Run until the pool shuts down or the queue is closed and empty.
    pub(crate) async fn run(mut self) {
        let shutdown = self.shared.shutdown.clone();
        tracing::info!("Job dispatcher started");

        loop {
            let ready = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                ready = self.ready_rx.recv() => match ready {
                    Some(ready) => ready,
                    None => break,
                },
            };

            let job = match self.shared.queue.dequeue(&shutdown).await {
                Ok(job) => job,
                Err(CoreError::QueueClosed) | Err(CoreError::Cancelled) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Dequeue failed, dispatcher exiting");
                    break;
                }
            };

            self.assign(ready, job);
        }

        tracing::info!("Job dispatcher shutting down");
    }

    fn assign(&self, ready: ReadyToken, job: Job) {
        let job_id = job.id();
        let cancel = self.shared.job_token(job_id);

        match ready.inbox.try_send(Assignment { job, cancel }) {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, worker_id = %ready.worker_id, "Job assigned");
            }
            // The worker left (or is mid-job) after announcing; nobody
            // else has seen the job, so it goes back to the head.
            Err(TrySendError::Closed(assignment)) | Err(TrySendError::Full(assignment)) => {
                tracing::debug!(
                    job_id = %job_id,
                    worker_id = %ready.worker_id,
                    "Worker unavailable, returning job",
                );
                self.shared.return_to_queue(assignment.job);
            }
        }
    }
}
