//! Single-consumer event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::task::current;
use crate::time::Deadline;
use crate::wait::{WaitListLight, WaitListRef, WaitStrategy};

/// A one-shot signal with a single waiter.
///
/// `send` stores the signal and wakes the waiter if one is parked; `wait_until`
/// consumes the signal. At most one task may wait at a time, which lets this
/// primitive use the single-slot wait list instead of full semaphore
/// bookkeeping. Used as the gate on the single-producer / single-consumer
/// sides of the handoff queue.
#[derive(Debug, Clone)]
pub struct SingleConsumerEvent {
    inner: Arc<EventInner>,
}

#[derive(Debug, Default)]
struct EventInner {
    signaled: AtomicBool,
    waiter: WaitListLight,
}

impl SingleConsumerEvent {
    /// Creates an event in the unsignaled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner::default()),
        }
    }

    /// Signals the event, waking the waiter if one is parked.
    pub fn send(&self) {
        self.inner.signaled.store(true, Ordering::Release);
        self.inner.waiter.wake_one();
    }

    /// Clears a pending signal.
    pub fn reset(&self) {
        self.inner.signaled.store(false, Ordering::Release);
    }

    /// Consumes a pending signal without waiting.
    pub fn try_wait(&self) -> bool {
        self.inner.signaled.swap(false, Ordering::AcqRel)
    }

    /// Waits for the event, consuming the signal.
    ///
    /// Returns false on deadline expiry or when the current task is
    /// cancelled. Must run inside a task if it actually has to wait.
    pub fn wait_until(&self, deadline: Deadline) -> bool {
        if self.try_wait() {
            return true;
        }
        if deadline.is_reached() {
            return false;
        }

        let ctx = current::context();
        loop {
            if self.try_wait() {
                return true;
            }
            if deadline.is_reached() || ctx.should_cancel() {
                return false;
            }
            let strategy = Arc::new(EventWaitStrategy {
                deadline,
                inner: Arc::clone(&self.inner),
                waiter: Arc::clone(&ctx),
            });
            ctx.sleep(strategy);
        }
    }
}

impl Default for SingleConsumerEvent {
    fn default() -> Self {
        Self::new()
    }
}

struct EventWaitStrategy {
    deadline: Deadline,
    inner: Arc<EventInner>,
    waiter: Arc<crate::task::context::TaskContext>,
}

impl WaitStrategy for EventWaitStrategy {
    fn deadline(&self) -> Deadline {
        self.deadline
    }

    fn wait_list(&self) -> Option<&dyn WaitListRef> {
        Some(&self.inner.waiter)
    }

    fn after_asleep(&self) {
        self.inner.waiter.set(Arc::clone(&self.waiter));
        // The signal may have arrived between the failed consume and the
        // registration above.
        if self.inner.signaled.load(Ordering::Acquire) {
            self.inner.waiter.wake_one();
        }
    }
}
