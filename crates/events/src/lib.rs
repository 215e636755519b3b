//! Voxline job event bus and event persistence.
//!
//! - [`JobEvent`]: the tagged envelope published on every job lifecycle
//!   transition, with one payload schema per tag.
//! - [`EventBus`]: synchronous in-process publish/subscribe hub keyed by
//!   event type, with token-based unsubscription.
//! - [`EventPersistence`]: background service mirroring job events into a
//!   [`Database`](voxline_core::services::Database).

pub mod bus;
pub mod event;
pub mod persistence;

pub use bus::{EventBus, EventPublisher, EventSubscriber, Handler, HandlerResult, SubscriptionId};
pub use event::{JobEvent, JobProgress, EVENT_JOB_CREATED, EVENT_JOB_PROGRESS, EVENT_JOB_UPDATED};
pub use persistence::EventPersistence;
