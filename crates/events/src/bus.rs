//! In-process event bus with per-type handler registration.
//!
//! [`EventBus`] delivers each published [`JobEvent`] synchronously, in the
//! publisher's task, to every handler registered for its `event_type`.
//! It is designed to be shared via `Arc<EventBus>` across the application.
//!
//! Handlers must not block: a slow handler stalls the worker that
//! published. Handlers that need to do I/O should hand the event off, e.g.
//! via [`EventBus::subscribe_channel`].

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::event::JobEvent;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of a handler invocation. Errors are logged, never propagated.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A registered event callback.
pub type Handler = Arc<dyn Fn(&JobEvent) -> HandlerResult + Send + Sync>;

/// Token identifying one registration. Unsubscription is by token, so two
/// registrations of equivalent closures never shadow each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Publishing half of the bus.
pub trait EventPublisher: Send + Sync {
    /// Deliver `event` to all current handlers for its type. Fire-and-forget.
    fn publish(&self, event: JobEvent);
}

/// Registration half of the bus.
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self, event_type: &str, handler: Handler) -> SubscriptionId;

    /// Remove a registration. Returns `false` if the token is unknown for
    /// that event type.
    fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool;
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Synchronous fan-out event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for `event_type`.
    pub fn on<F>(&self, event_type: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&JobEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(handler))
    }

    /// Register a handler that forwards every `event_type` event into an
    /// unbounded channel, for consumers running in their own task.
    ///
    /// The handler fails (and is logged) once the receiver is dropped.
    pub fn subscribe_channel(
        &self,
        event_type: &str,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.forward_to(event_type, tx);
        (id, rx)
    }

    /// Register a handler forwarding `event_type` events into `tx`.
    pub fn forward_to(
        &self,
        event_type: &str,
        tx: mpsc::UnboundedSender<JobEvent>,
    ) -> SubscriptionId {
        self.on(event_type, move |event| {
            tx.send(event.clone())
                .map_err(|_| "event receiver dropped".into())
        })
    }

    /// Number of handlers registered for `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: JobEvent) {
        // Snapshot the handler list so handlers may (un)subscribe re-entrantly.
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        event_type = %event.event_type,
                        subscription = id.0,
                        error = %e,
                        "Event handler failed",
                    );
                }
                Err(_) => {
                    tracing::error!(
                        event_type = %event.event_type,
                        subscription = id.0,
                        "Event handler panicked",
                    );
                }
            }
        }
    }
}

impl EventSubscriber for EventBus {
    fn subscribe(&self, event_type: &str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
