//! FIFO job queue between submission and dispatch.
//!
//! State lives behind a short-held `std::sync::Mutex`; waiters park on a
//! [`Notify`]. Closing the queue wakes every waiter, so a blocked
//! [`JobQueue::dequeue`] always returns once shutdown starts.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use voxline_core::error::CoreError;
use voxline_core::job::Job;
use voxline_core::types::JobId;

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    /// Slots handed out by [`JobQueue::reserve`] but not yet filled.
    reserved: usize,
    closed: bool,
}

/// Ordered holding area for pending jobs.
#[derive(Debug)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    /// `None` means unbounded.
    capacity: Option<usize>,
}

/// A claimed queue slot. Filling it appends the job at the tail; dropping it
/// unfilled releases the slot.
///
/// Lets a caller publish side effects for a job after the capacity check
/// succeeded but before any consumer can observe the job.
#[derive(Debug)]
pub struct QueueSlot<'a> {
    queue: &'a JobQueue,
    filled: bool,
}

impl JobQueue {
    /// Create a queue. `capacity` of `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `job` at the tail.
    ///
    /// Fails with [`CoreError::QueueFull`] at capacity and
    /// [`CoreError::QueueClosed`] after [`JobQueue::close`]. Never blocks.
    pub fn enqueue(&self, job: Job) -> Result<(), CoreError> {
        self.reserve()?.fill(job);
        Ok(())
    }

    /// Claim room for one job without publishing it yet.
    pub fn reserve(&self) -> Result<QueueSlot<'_>, CoreError> {
        let mut state = self.state();
        if state.closed {
            return Err(CoreError::QueueClosed);
        }
        if let Some(capacity) = self.capacity {
            if state.jobs.len() + state.reserved >= capacity {
                return Err(CoreError::QueueFull { capacity });
            }
        }
        state.reserved += 1;
        Ok(QueueSlot {
            queue: self,
            filled: false,
        })
    }

    /// Remove and return the head, waiting while the queue is empty.
    ///
    /// Returns [`CoreError::QueueClosed`] once the queue is closed and
    /// drained, or [`CoreError::Cancelled`] if `cancel` fires first.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<Job, CoreError> {
        loop {
            // Register interest before checking, so a notify between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(job) = state.jobs.pop_front() {
                    return Ok(job);
                }
                if state.closed {
                    return Err(CoreError::QueueClosed);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    /// Remove and return the head if there is one.
    pub fn try_dequeue(&self) -> Option<Job> {
        self.state().jobs.pop_front()
    }

    /// Clone of the head, or [`CoreError::QueueEmpty`].
    pub fn peek(&self) -> Result<Job, CoreError> {
        self.state().jobs.front().cloned().ok_or(CoreError::QueueEmpty)
    }

    /// Number of queued jobs.
    pub fn size(&self) -> usize {
        self.state().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Reject further enqueues and wake all waiters. Queued jobs remain
    /// available to [`JobQueue::dequeue`] until drained.
    pub fn close(&self) {
        self.state().closed = true;
        self.notify.notify_waiters();
    }

    /// Remove a specific queued job.
    pub fn remove(&self, id: JobId) -> Option<Job> {
        let mut state = self.state();
        let index = state.jobs.iter().position(|job| job.id() == id)?;
        state.jobs.remove(index)
    }

    /// Remove and return every queued job, in order.
    pub fn drain(&self) -> Vec<Job> {
        self.state().jobs.drain(..).collect()
    }

    /// Put a job that was dequeued but never started back at the head.
    ///
    /// Accepted even when closed or at capacity: the job was already
    /// admitted once and must not be dropped.
    pub(crate) fn requeue_front(&self, job: Job) {
        self.state().jobs.push_front(job);
        self.notify.notify_one();
    }
}

impl QueueSlot<'_> {
    /// Append `job` at the tail and wake one waiter.
    pub fn fill(mut self, job: Job) {
        {
            let mut state = self.queue.state();
            state.reserved -= 1;
            state.jobs.push_back(job);
        }
        self.filled = true;
        self.queue.notify.notify_one();
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        if !self.filled {
            self.queue.state().reserved -= 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
