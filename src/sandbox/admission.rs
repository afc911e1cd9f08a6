//! Bounded-concurrency admission control shared by both executors.
//!
//! At most `admission_limit` sandboxes run at once, system-wide. Excess
//! requests wait in FIFO order (`tokio::sync::Semaphore` queues waiters
//! fairly). The wait queue is unbounded by default, matching the original
//! behavior under request flood; deployments can opt into a depth bound
//! that rejects excess waiters instead.
//!
//! Slots are RAII: the permit inside an [`AdmissionSlot`] is released on
//! drop, so a slot is returned exactly once whether the executor
//! succeeded, crashed, was killed, or the task panicked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, ValidationError};

/// A capacity token for one running sandbox.
///
/// Dropping the slot releases the capacity and wakes the next queued
/// request, if any.
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// FIFO admission gate for sandbox executions.
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    waiting: Arc<AtomicUsize>,
    limit: usize,
    max_queue_depth: Option<usize>,
}

impl AdmissionController {
    /// Create a controller allowing `limit` concurrent sandboxes.
    ///
    /// `max_queue_depth` bounds how many requests may wait for a slot;
    /// `None` leaves the queue unbounded.
    pub fn new(limit: usize, max_queue_depth: Option<usize>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            active: Arc::new(AtomicUsize::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
            limit,
            max_queue_depth,
        }
    }

    /// Acquire a slot, waiting in FIFO order if all are taken.
    ///
    /// Wait time does not count against the request timeout; the timeout
    /// clock starts once the executor is actually spawned.
    pub async fn acquire(&self) -> Result<AdmissionSlot> {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                // Reserve the queue position atomically; a load-then-add
                // would let a burst of concurrent arrivals all pass the
                // depth check before any of them incremented.
                let _waiting = match self.max_queue_depth {
                    Some(depth) => WaitingGuard::try_enter(&self.waiting, depth)
                        .ok_or(ValidationError::Overloaded)?,
                    None => WaitingGuard::enter(&self.waiting),
                };
                self.semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| ValidationError::Internal(anyhow::anyhow!(e)))?
            }
            Err(e) => return Err(ValidationError::Internal(anyhow::anyhow!(e))),
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(AdmissionSlot {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Number of sandboxes currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of requests currently waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// The configured concurrency limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Tracks queue depth; decrements even if the waiting future is dropped.
struct WaitingGuard<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn enter(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Self { waiting }
    }

    /// Claim a queue position only while the count is below `depth`.
    /// The increment and the bound check are one atomic operation.
    fn try_enter(waiting: &'a AtomicUsize, depth: usize) -> Option<Self> {
        waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < depth).then_some(current + 1)
            })
            .ok()
            .map(|_| Self { waiting })
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}
