//! Shared helpers for worker pool integration tests.
//!
//! [`FakeEngine`] stands in for both engines and decides per call what to do
//! from the job's output path. [`EventLog`] records every job event the
//! pool publishes.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use voxline_core::error::CoreError;
use voxline_core::job::{Job, JobUpdate};
use voxline_core::job_status::JobStatus;
use voxline_core::services::{AudioMixerService, NarratorService, RenderedAudio};
use voxline_core::types::JobId;
use voxline_events::{
    EventBus, JobEvent, JobProgress, EVENT_JOB_CREATED, EVENT_JOB_PROGRESS, EVENT_JOB_UPDATED,
};
use voxline_worker::{Engines, PoolConfig, WorkerPool};

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

/// What a [`FakeEngine`] call does.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    Sleep(Duration),
    /// Block until [`FakeEngine::release`] grants a permit, then succeed.
    Gate,
    Panic,
}

type Rule = Arc<dyn Fn(&str) -> Behavior + Send + Sync>;

/// Narrator and mixer double that records every call.
pub struct FakeEngine {
    rule: Rule,
    gate: Semaphore,
    calls: Mutex<Vec<String>>,
}

impl FakeEngine {
    /// Same behaviour for every job.
    pub fn always(behavior: Behavior) -> Arc<Self> {
        Self::with(move |_| behavior.clone())
    }

    /// Behaviour chosen from the job's output path.
    pub fn with<F>(rule: F) -> Arc<Self>
    where
        F: Fn(&str) -> Behavior + Send + Sync + 'static,
    {
        Arc::new(Self {
            rule: Arc::new(rule),
            gate: Semaphore::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn engines(self: &Arc<Self>) -> Engines {
        Engines::new(self.clone(), self.clone())
    }

    /// Let `n` gated calls finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Output paths of every call so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn render(&self, output_path: &str) -> Result<RenderedAudio, CoreError> {
        self.calls.lock().unwrap().push(output_path.to_string());
        match (self.rule)(output_path) {
            Behavior::Succeed => {}
            Behavior::Fail(message) => return Err(CoreError::Service(message)),
            Behavior::Sleep(duration) => tokio::time::sleep(duration).await,
            Behavior::Gate => {
                let permit = self.gate.acquire().await.expect("gate closed");
                permit.forget();
            }
            Behavior::Panic => panic!("engine exploded"),
        }
        Ok(RenderedAudio::new(format!("{output_path}.rendered")))
    }
}

#[async_trait]
impl NarratorService for FakeEngine {
    async fn narrate(
        &self,
        _: &str,
        _: &str,
        output_path: &str,
    ) -> Result<RenderedAudio, CoreError> {
        self.render(output_path).await
    }
}

#[async_trait]
impl AudioMixerService for FakeEngine {
    async fn mix(
        &self,
        _: &str,
        _: &str,
        output_path: &str,
        _: f64,
    ) -> Result<RenderedAudio, CoreError> {
        self.render(output_path).await
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Every job event published on a bus, in publish order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<JobEvent>>>,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let log = Self::default();
        for event_type in [EVENT_JOB_CREATED, EVENT_JOB_UPDATED, EVENT_JOB_PROGRESS] {
            let events = Arc::clone(&log.events);
            bus.on(event_type, move |event| {
                events.lock().unwrap().push(event.clone());
                Ok(())
            });
        }
        log
    }

    pub fn all(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn created(&self, id: JobId) -> Vec<Job> {
        self.all()
            .iter()
            .filter(|e| e.event_type == EVENT_JOB_CREATED)
            .map(|e| e.decode_payload::<Job>().unwrap())
            .filter(|job| job.id() == id)
            .collect()
    }

    pub fn updates(&self, id: JobId) -> Vec<JobUpdate> {
        self.all()
            .iter()
            .filter(|e| e.event_type == EVENT_JOB_UPDATED)
            .map(|e| e.decode_payload::<JobUpdate>().unwrap())
            .filter(|update| update.id == id)
            .collect()
    }

    pub fn statuses(&self, id: JobId) -> Vec<JobStatus> {
        self.updates(id).iter().map(|u| u.status).collect()
    }

    pub fn progress(&self, id: JobId) -> Vec<u8> {
        self.all()
            .iter()
            .filter(|e| e.event_type == EVENT_JOB_PROGRESS)
            .map(|e| e.decode_payload::<JobProgress>().unwrap())
            .filter(|p| p.id == id)
            .map(|p| p.percent)
            .collect()
    }

    /// The single terminal update for `id`, if one was published.
    pub fn terminal(&self, id: JobId) -> Option<JobUpdate> {
        let mut terminal: Vec<JobUpdate> = self
            .updates(id)
            .into_iter()
            .filter(|u| u.status.is_terminal())
            .collect();
        assert!(terminal.len() <= 1, "job {id} reached a terminal status twice");
        terminal.pop()
    }

    /// Wait until `id` has a terminal update.
    pub async fn wait_terminal(&self, id: JobId) -> JobUpdate {
        eventually(|| self.terminal(id).is_some()).await;
        self.terminal(id).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pool: Arc<WorkerPool>,
    pub bus: Arc<EventBus>,
    pub log: EventLog,
    pub engine: Arc<FakeEngine>,
}

/// A pool with `workers` registered workers (`w1`..), not yet started.
pub async fn harness(config: PoolConfig, workers: usize, engine: Arc<FakeEngine>) -> Harness {
    let bus = Arc::new(EventBus::new());
    let log = EventLog::attach(&bus);
    let pool = Arc::new(WorkerPool::new(config, engine.engines(), bus.clone()));
    for n in 1..=workers {
        pool.add_worker(format!("w{n}")).await.unwrap();
    }
    Harness {
        pool,
        bus,
        log,
        engine,
    }
}

pub fn config() -> PoolConfig {
    PoolConfig {
        job_timeout: Duration::from_secs(5),
        ..PoolConfig::default()
    }
}

pub fn narration(name: &str) -> Job {
    Job::narration("", format!("/out/{name}.wav"), "hello", "v1")
}

/// Poll `check` until it passes, failing the test after two seconds.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
