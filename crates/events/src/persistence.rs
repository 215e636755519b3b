//! Durable job record mirroring.
//!
//! [`EventPersistence`] receives `job.created` and `job.updated` events
//! through a channel subscription on the [`EventBus`] and writes them to a
//! [`Database`]. It runs as a long-lived background task and shuts down
//! when every sender is gone (the bus dropped or the handlers removed).

use std::sync::Arc;

use tokio::sync::mpsc;
use voxline_core::error::CoreError;
use voxline_core::job::{Job, JobUpdate};
use voxline_core::services::Database;

use crate::bus::{EventBus, SubscriptionId};
use crate::event::{JobEvent, EVENT_JOB_CREATED, EVENT_JOB_UPDATED};

/// Background service that persists job events.
pub struct EventPersistence;

impl EventPersistence {
    /// Register the persistence handlers on `bus`.
    ///
    /// Both event types share one channel so created/updated ordering for a
    /// job is preserved. Returns the subscription tokens and the receiver to
    /// pass to [`EventPersistence::run`].
    pub fn subscribe(bus: &EventBus) -> (Vec<SubscriptionId>, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ids = vec![
            bus.forward_to(EVENT_JOB_CREATED, tx.clone()),
            bus.forward_to(EVENT_JOB_UPDATED, tx),
        ];
        (ids, rx)
    }

    /// Run the persistence loop until the channel closes.
    pub async fn run(db: Arc<dyn Database>, mut receiver: mpsc::UnboundedReceiver<JobEvent>) {
        while let Some(event) = receiver.recv().await {
            if let Err(e) = Self::persist(db.as_ref(), &event).await {
                tracing::error!(
                    error = %e,
                    event_type = %event.event_type,
                    "Failed to persist job event"
                );
            }
        }
        tracing::info!("Event channel closed, persistence shutting down");
    }

    /// Apply one event to the store.
    ///
    /// `job.created` inserts the record; `job.updated` replays the
    /// transition onto the stored copy. Other tags are ignored.
    async fn persist(db: &dyn Database, event: &JobEvent) -> Result<(), CoreError> {
        match event.event_type.as_str() {
            EVENT_JOB_CREATED => {
                let job: Job = event.decode_payload()?;
                db.save_job(&job).await
            }
            EVENT_JOB_UPDATED => {
                let update: JobUpdate = event.decode_payload()?;
                let mut job = db.get_job(update.id).await?;
                job.apply(&update)?;
                db.update_job(&job).await
            }
            _ => Ok(()),
        }
    }
}
