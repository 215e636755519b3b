//! Worker pool: submission, dispatch wiring, worker lifecycle and shutdown.
//!
//! A [`WorkerPool`] owns one [`JobQueue`], one dispatcher task and one task
//! per worker. Workers announce themselves idle on a shared ready channel;
//! the dispatcher pairs each announcement with the next queued job and
//! sends it to that worker's inbox. All job state changes are published on
//! the [`EventPublisher`] the pool was built with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use voxline_core::error::CoreError;
use voxline_core::job::{Job, JobUpdate};
use voxline_core::job_status::JobStatus;
use voxline_core::system_status::{SystemStatus, WorkerPoolStatus};
use voxline_core::types::{JobId, WorkerId};
use voxline_core::worker_status::{validate_worker_id, WorkerStatus, WORKER_IDLE};
use voxline_events::{EventPublisher, JobEvent, JobProgress};

use crate::board::StatusBoard;
use crate::config::{PoolConfig, ShutdownPolicy};
use crate::dispatcher::{Dispatcher, ReadyToken};
use crate::engines::Engines;
use crate::queue::JobQueue;
use crate::worker::{Worker, WorkerHandle};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by the pool handle, the dispatcher and every worker.
pub(crate) struct PoolShared {
    pub(crate) config: PoolConfig,
    pub(crate) engines: Engines,
    pub(crate) queue: JobQueue,
    events: Arc<dyn EventPublisher>,
    board: Mutex<StatusBoard>,
    /// Every admitted job that has not reached a terminal status, queued or
    /// running, with its cancellation token. An id appears at most once.
    active: Mutex<HashMap<JobId, CancellationToken>>,
    /// Submission gate. Held for reading across a whole `submit_job`, so
    /// `stop` cannot interleave between enqueue and the `job.created` event.
    accepting: RwLock<bool>,
    /// Pool-wide cancellation. Every in-flight job token is a child.
    pub(crate) shutdown: CancellationToken,
    pub(crate) ready_tx: mpsc::UnboundedSender<ReadyToken>,
}

impl PoolShared {
    fn board(&self) -> MutexGuard<'_, StatusBoard> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- status arena ----

    pub(crate) fn set_worker_status(&self, id: &str, status: &str, current_job: Option<JobId>) {
        self.board().set_worker_status(id, status, current_job);
    }

    pub(crate) fn remove_worker_status(&self, id: &str) {
        self.board().remove_worker_status(id);
    }

    pub(crate) fn record_failure(&self) {
        self.board().record_failure();
    }

    pub(crate) fn worker_status(&self, id: &str) -> Option<WorkerStatus> {
        self.board().get(id)
    }

    // ---- active jobs ----

    /// Claim `id` for a new submission and create its cancellation token.
    fn admit(&self, id: JobId) -> Result<(), CoreError> {
        let mut active = self.active();
        if active.contains_key(&id) {
            return Err(CoreError::Conflict(format!(
                "Job '{id}' is already queued or running"
            )));
        }
        active.insert(id, self.shutdown.child_token());
        Ok(())
    }

    /// The cancellation token created when `id` was admitted.
    pub(crate) fn job_token(&self, id: JobId) -> CancellationToken {
        self.active()
            .entry(id)
            .or_insert_with(|| self.shutdown.child_token())
            .clone()
    }

    /// Forget a job that reached a terminal status.
    pub(crate) fn release(&self, id: JobId) {
        self.active().remove(&id);
    }

    fn cancel_active(&self, id: JobId) -> bool {
        match self.active().get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Return an assignment that never reached a worker to the queue head.
    /// The job keeps its token, so a cancellation requested meanwhile still
    /// applies when it is dispatched again.
    pub(crate) fn return_to_queue(&self, job: Job) {
        tracing::debug!(job_id = %job.id(), "Job returned to queue");
        self.queue.requeue_front(job);
    }

    // ---- events ----

    fn publish(&self, event: Result<JobEvent, CoreError>) {
        match event {
            Ok(event) => self.events.publish(event),
            Err(e) => tracing::error!(error = %e, "Failed to encode job event"),
        }
    }

    pub(crate) fn publish_created(&self, job: &Job) {
        self.publish(JobEvent::created(job));
    }

    pub(crate) fn publish_update(&self, update: &JobUpdate) {
        self.publish(JobEvent::updated(update));
    }

    pub(crate) fn publish_progress(&self, progress: &JobProgress) {
        self.publish(JobEvent::progress(progress));
    }

    /// Cancel a job that will never run and announce it.
    fn cancel_unstarted(&self, mut job: Job) {
        self.release(job.id());
        match job.cancel() {
            Ok(update) => {
                tracing::info!(job_id = %job.id(), "Queued job canceled");
                self.publish_update(&update);
            }
            Err(e) => tracing::warn!(job_id = %job.id(), error = %e, "Could not cancel queued job"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct WorkerSlot {
    handle: WorkerHandle,
    /// Worker added before `start`, waiting to be spawned.
    staged: Option<Worker>,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    started: bool,
    stopped: bool,
    workers: HashMap<WorkerId, WorkerSlot>,
    dispatcher: Option<JoinHandle<()>>,
    ready_rx: Option<mpsc::UnboundedReceiver<ReadyToken>>,
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// A set of workers consuming one job queue.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    registry: tokio::sync::Mutex<Registry>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, engines: Engines, events: Arc<dyn EventPublisher>) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let shared = PoolShared {
            queue: JobQueue::new(config.queue_capacity),
            config,
            engines,
            events,
            board: Mutex::new(StatusBoard::new()),
            active: Mutex::new(HashMap::new()),
            accepting: RwLock::new(true),
            shutdown: CancellationToken::new(),
            ready_tx,
        };
        Self {
            shared: Arc::new(shared),
            registry: tokio::sync::Mutex::new(Registry {
                ready_rx: Some(ready_rx),
                ..Registry::default()
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    // ---- worker set ----

    /// Register a worker. It starts consuming jobs immediately if the pool
    /// is running, otherwise on [`WorkerPool::start`].
    pub async fn add_worker(&self, id: impl Into<WorkerId>) -> Result<(), CoreError> {
        let id = id.into();
        validate_worker_id(&id)?;

        let mut registry = self.registry.lock().await;
        if registry.stopped {
            return Err(CoreError::Conflict("Worker pool is stopped".into()));
        }
        if registry.workers.contains_key(&id) {
            return Err(CoreError::Conflict(format!("Worker '{id}' already exists")));
        }

        let worker = Worker::new(id.clone(), Arc::clone(&self.shared));
        let handle = worker.handle();
        self.shared.set_worker_status(&id, WORKER_IDLE, None);

        let slot = if registry.started {
            WorkerSlot {
                handle,
                staged: None,
                task: Some(tokio::spawn(worker.run())),
            }
        } else {
            WorkerSlot {
                handle,
                staged: Some(worker),
                task: None,
            }
        };
        registry.workers.insert(id.clone(), slot);

        tracing::info!(worker_id = %id, running = registry.started, "Worker added");
        Ok(())
    }

    /// Detach a worker. A busy worker finishes its current job first; this
    /// returns once it has exited.
    pub async fn remove_worker(&self, id: &str) -> Result<(), CoreError> {
        let slot = self
            .registry
            .lock()
            .await
            .workers
            .remove(id)
            .ok_or_else(|| CoreError::not_found("worker", id))?;

        slot.handle.stop();
        match slot.task {
            Some(task) => join_worker(id, task).await,
            None => self.shared.remove_worker_status(id),
        }

        tracing::info!(worker_id = %id, "Worker removed");
        Ok(())
    }

    /// A worker's current status: `idle`, `busy` with its job, or `error`.
    pub fn worker_status(&self, id: &str) -> Result<WorkerStatus, CoreError> {
        self.shared
            .worker_status(id)
            .ok_or_else(|| CoreError::not_found("worker", id))
    }

    // ---- jobs ----

    /// Validate and enqueue a new job, publishing `job.created`.
    ///
    /// Returns the job id without waiting for execution. A job whose id is
    /// still queued or running is a [`CoreError::Conflict`].
    pub fn submit_job(&self, job: Job) -> Result<JobId, CoreError> {
        let accepting = self
            .shared
            .accepting
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if !*accepting {
            return Err(CoreError::QueueClosed);
        }

        job.validate()?;
        if job.status() != JobStatus::Pending {
            return Err(CoreError::InvalidJob(format!(
                "Only pending jobs can be submitted, got '{}'",
                job.status()
            )));
        }

        let id = job.id();
        self.shared.admit(id)?;
        let slot = match self.shared.queue.reserve() {
            Ok(slot) => slot,
            Err(e) => {
                self.shared.release(id);
                return Err(e);
            }
        };
        let kind = job.kind();
        self.shared.publish_created(&job);
        slot.fill(job);

        tracing::info!(job_id = %id, job_type = %kind, "Job submitted");
        Ok(id)
    }

    /// Cancel a job. A queued job is removed and marked `canceled` at once;
    /// any other active job is signalled and its worker cancels it at the
    /// next checkpoint.
    pub fn cancel_job(&self, id: JobId) -> Result<(), CoreError> {
        if let Some(job) = self.shared.queue.remove(id) {
            self.shared.cancel_unstarted(job);
            return Ok(());
        }
        if self.shared.cancel_active(id) {
            tracing::info!(job_id = %id, "Cancellation requested for running job");
            return Ok(());
        }
        Err(CoreError::not_found("job", id))
    }

    pub fn queue_size(&self) -> usize {
        self.shared.queue.size()
    }

    // ---- lifecycle ----

    /// Spawn the dispatcher and every registered worker.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut registry = self.registry.lock().await;
        if registry.started {
            return Err(CoreError::Conflict("Worker pool already started".into()));
        }
        let ready_rx = registry
            .ready_rx
            .take()
            .ok_or_else(|| CoreError::Conflict("Worker pool already started".into()))?;
        registry.started = true;

        let dispatcher = Dispatcher::new(Arc::clone(&self.shared), ready_rx);
        registry.dispatcher = Some(tokio::spawn(dispatcher.run()));

        for slot in registry.workers.values_mut() {
            if let Some(worker) = slot.staged.take() {
                slot.task = Some(tokio::spawn(worker.run()));
            }
        }

        tracing::info!(
            workers = registry.workers.len(),
            queue_capacity = ?self.shared.config.queue_capacity,
            "Worker pool started",
        );
        Ok(())
    }

    /// Stop accepting jobs and shut down per the configured
    /// [`ShutdownPolicy`]. Returns once every worker has exited.
    pub async fn stop(&self) -> Result<(), CoreError> {
        let mut registry = self.registry.lock().await;
        if !registry.started {
            return Err(CoreError::Conflict("Worker pool not started".into()));
        }
        if registry.stopped {
            return Err(CoreError::Conflict("Worker pool already stopped".into()));
        }
        registry.stopped = true;

        *self
            .shared
            .accepting
            .write()
            .unwrap_or_else(PoisonError::into_inner) = false;

        let mut policy = self.shared.config.shutdown_policy;
        if policy == ShutdownPolicy::Drain && registry.workers.is_empty() {
            tracing::warn!("No workers to drain the queue, canceling queued jobs instead");
            policy = ShutdownPolicy::Cancel;
        }
        tracing::info!(?policy, queued = self.shared.queue.size(), "Stopping worker pool");

        // Cancel before closing, so the dispatcher and any blocked dequeue
        // observe cancellation rather than a half-drained queue.
        if policy == ShutdownPolicy::Cancel {
            self.shared.shutdown.cancel();
        }
        self.shared.queue.close();

        if let Some(dispatcher) = registry.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                tracing::error!(error = %e, "Dispatcher task failed");
            }
        }

        for slot in registry.workers.values() {
            slot.handle.stop();
        }
        for (id, slot) in registry.workers.drain() {
            if let Some(task) = slot.task {
                join_worker(&id, task).await;
            }
        }

        for job in self.shared.queue.drain() {
            self.shared.cancel_unstarted(job);
        }
        self.shared.shutdown.cancel();

        tracing::info!("Worker pool stopped");
        Ok(())
    }

    // ---- status ----

    /// Point-in-time counters.
    pub fn status(&self) -> WorkerPoolStatus {
        let queued = self.shared.queue.size();
        self.shared.board().pool_status(queued)
    }

    /// Counters, per-worker entries and the derived health.
    pub fn system_status(&self) -> SystemStatus {
        let queued = self.shared.queue.size();
        let (pool, workers) = self.shared.board().snapshot(queued);
        SystemStatus::from_snapshot(pool, workers)
    }
}

async fn join_worker(id: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        tracing::error!(worker_id = %id, error = %e, "Worker task failed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use voxline_core::services::{AudioMixerService, NarratorService, RenderedAudio};
    use voxline_events::{EventBus, EVENT_JOB_CREATED, EVENT_JOB_UPDATED};

    use super::*;

    struct Echo;

    #[async_trait]
    impl NarratorService for Echo {
        async fn narrate(&self, _: &str, _: &str, out: &str) -> Result<RenderedAudio, CoreError> {
            Ok(RenderedAudio::new(out))
        }
    }

    #[async_trait]
    impl AudioMixerService for Echo {
        async fn mix(
            &self,
            _: &str,
            _: &str,
            out: &str,
            _: f64,
        ) -> Result<RenderedAudio, CoreError> {
            Ok(RenderedAudio::new(out))
        }
    }

    fn pool_with(config: PoolConfig) -> (WorkerPool, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let engines = Engines::new(Arc::new(Echo), Arc::new(Echo));
        (WorkerPool::new(config, engines, bus.clone()), bus)
    }

    fn narration() -> Job {
        Job::narration("", "/out/a.wav", "hello", "v1")
    }

    #[tokio::test]
    async fn worker_ids_are_validated_and_unique() {
        let (pool, _) = pool_with(PoolConfig::default());
        assert_matches!(pool.add_worker("").await, Err(CoreError::Validation(_)));
        assert_matches!(pool.add_worker("has space").await, Err(CoreError::Validation(_)));

        pool.add_worker("w1").await.unwrap();
        assert_matches!(pool.add_worker("w1").await, Err(CoreError::Conflict(_)));
        assert_eq!(pool.status().total_workers, 1);
    }

    #[tokio::test]
    async fn staged_worker_reports_idle_and_can_be_removed() {
        let (pool, _) = pool_with(PoolConfig::default());
        pool.add_worker("w1").await.unwrap();
        assert_eq!(pool.worker_status("w1").unwrap().status, WORKER_IDLE);

        pool.remove_worker("w1").await.unwrap();
        assert_matches!(
            pool.worker_status("w1"),
            Err(CoreError::NotFound { entity: "worker", .. })
        );
        assert_matches!(pool.remove_worker("w1").await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn submit_before_start_stays_queued() {
        let (pool, bus) = pool_with(PoolConfig::default());
        let created = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&created);
        bus.on(EVENT_JOB_CREATED, move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        pool.submit_job(narration()).unwrap();
        assert_eq!(pool.queue_size(), 1);
        assert_eq!(pool.status().queued_jobs, 1);
        assert_eq!(*created.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn non_pending_job_is_rejected() {
        let (pool, _) = pool_with(PoolConfig::default());
        let mut job = narration();
        job.start().unwrap();
        assert_matches!(pool.submit_job(job), Err(CoreError::InvalidJob(_)));
        assert_eq!(pool.queue_size(), 0);
    }

    #[tokio::test]
    async fn full_queue_publishes_nothing() {
        let config = PoolConfig {
            queue_capacity: Some(1),
            ..PoolConfig::default()
        };
        let (pool, bus) = pool_with(config);
        let (_, mut rx) = bus.subscribe_channel(EVENT_JOB_CREATED);

        pool.submit_job(narration()).unwrap();
        assert_matches!(
            pool.submit_job(narration()),
            Err(CoreError::QueueFull { capacity: 1 })
        );

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn queued_job_id_is_admitted_once() {
        let (pool, bus) = pool_with(PoolConfig::default());
        let (_, mut rx) = bus.subscribe_channel(EVENT_JOB_CREATED);
        let job = narration();

        pool.submit_job(job.clone()).unwrap();
        assert_matches!(pool.submit_job(job.clone()), Err(CoreError::Conflict(_)));
        assert_eq!(pool.queue_size(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_by_full_queue_is_not_left_active() {
        let config = PoolConfig {
            queue_capacity: Some(1),
            ..PoolConfig::default()
        };
        let (pool, _) = pool_with(config);
        let first = pool.submit_job(narration()).unwrap();

        let overflow = narration();
        assert_matches!(pool.submit_job(overflow.clone()), Err(CoreError::QueueFull { .. }));
        assert_matches!(pool.cancel_job(overflow.id()), Err(CoreError::NotFound { .. }));

        pool.cancel_job(first).unwrap();
        pool.submit_job(overflow).unwrap();
    }

    #[tokio::test]
    async fn cancel_reaches_job_taken_but_not_yet_assigned() {
        let (pool, bus) = pool_with(PoolConfig::default());
        let (_, mut updates) = bus.subscribe_channel(EVENT_JOB_UPDATED);
        pool.add_worker("w1").await.unwrap();
        let id = pool.submit_job(narration()).unwrap();

        // Off the queue as the dispatcher holds it, with no worker yet.
        let taken = pool.shared.queue.try_dequeue().unwrap();
        pool.cancel_job(id).unwrap();
        pool.shared.return_to_queue(taken);

        pool.start().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), updates.recv())
            .await
            .expect("the worker should settle the job")
            .unwrap();
        let update: JobUpdate = event.decode_payload().unwrap();
        assert_eq!(update.id, id);
        assert_eq!(update.status, JobStatus::Canceled);

        pool.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_conflicts() {
        let (pool, _) = pool_with(PoolConfig::default());
        assert_matches!(pool.stop().await, Err(CoreError::Conflict(_)));

        pool.start().await.unwrap();
        assert_matches!(pool.start().await, Err(CoreError::Conflict(_)));

        pool.stop().await.unwrap();
        assert_matches!(pool.stop().await, Err(CoreError::Conflict(_)));
        assert_matches!(pool.add_worker("late").await, Err(CoreError::Conflict(_)));
        assert_matches!(pool.submit_job(narration()), Err(CoreError::QueueClosed));
    }

    #[tokio::test]
    async fn cancel_unknown_job_is_not_found() {
        let (pool, _) = pool_with(PoolConfig::default());
        assert_matches!(
            pool.cancel_job(JobId::new_v4()),
            Err(CoreError::NotFound { entity: "job", .. })
        );
    }

    #[tokio::test]
    async fn drain_without_workers_cancels_queue() {
        let config = PoolConfig {
            shutdown_policy: ShutdownPolicy::Drain,
            ..PoolConfig::default()
        };
        let (pool, _) = pool_with(config);
        pool.start().await.unwrap();
        pool.submit_job(narration()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), pool.stop())
            .await
            .expect("stop must not wait for absent workers")
            .unwrap();
        assert_eq!(pool.queue_size(), 0);
    }
}
