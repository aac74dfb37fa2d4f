//! Counting semaphore integrated with the task sleep facility.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::task::current;
use crate::time::Deadline;
use crate::wait::{WaitList, WaitListRef, WaitStrategy};

/// Token count added by `force_open`: enough to satisfy any realistic
/// number of pending and future acquisitions. Kept internal to the
/// semaphore; callers see only `force_open`/`undo_force_open`.
const UNLOCK_ALL_TOKENS: usize = usize::MAX / 2;

/// A shared-lock counting semaphore.
///
/// `capacity` tokens are available initially; `held + available == capacity`
/// in the steady state. Acquisition is deadline-bounded and supports atomic
/// bulk acquire; blocked acquirers park through the task wait protocol, so
/// blocking calls must run inside a task.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<SemaphoreInner>,
}

#[derive(Debug)]
struct SemaphoreInner {
    available: AtomicUsize,
    capacity: usize,
    waiters: WaitList,
}

impl Semaphore {
    /// Creates a semaphore with `capacity` tokens available.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                available: AtomicUsize::new(capacity),
                capacity,
                waiters: WaitList::new(),
            }),
        }
    }

    /// The initial token count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// The approximate number of currently available tokens.
    #[must_use]
    pub fn available_approx(&self) -> usize {
        self.inner.available.load(Ordering::Relaxed)
    }

    /// Acquires one token without blocking.
    #[must_use]
    pub fn try_lock_shared(&self) -> bool {
        self.try_acquire(1)
    }

    /// Atomically acquires `count` tokens without blocking.
    #[must_use]
    pub fn try_lock_shared_count(&self, count: usize) -> bool {
        self.try_acquire(count)
    }

    /// Acquires one token, waiting until `deadline`.
    ///
    /// Returns true iff a token was acquired before the deadline; returns
    /// false early if the current task is cancelled.
    #[must_use]
    pub fn try_lock_shared_until(&self, deadline: Deadline) -> bool {
        self.acquire_until(deadline, 1)
    }

    /// Atomically acquires `count` tokens, waiting until `deadline`.
    #[must_use]
    pub fn try_lock_shared_until_count(&self, deadline: Deadline, count: usize) -> bool {
        self.acquire_until(deadline, count)
    }

    /// Releases one token.
    pub fn unlock_shared(&self) {
        self.release(1);
    }

    /// Releases `count` tokens.
    pub fn unlock_shared_count(&self, count: usize) {
        self.release(count);
    }

    /// Floods the semaphore with tokens so every pending and future acquire
    /// succeeds immediately. Paired with [`Self::undo_force_open`].
    pub(crate) fn force_open(&self) {
        self.release(UNLOCK_ALL_TOKENS);
    }

    /// Reclaims the tokens added by [`Self::force_open`].
    ///
    /// Token conservation by the callers (every failed post-flood operation
    /// returns its token) makes this acquisition immediate in practice.
    pub(crate) fn undo_force_open(&self) {
        let reclaimed = self.acquire_until(Deadline::Unreachable, UNLOCK_ALL_TOKENS);
        debug_assert!(reclaimed);
    }

    fn try_acquire(&self, count: usize) -> bool {
        let mut available = self.inner.available.load(Ordering::Acquire);
        loop {
            if available < count {
                return false;
            }
            match self.inner.available.compare_exchange_weak(
                available,
                available - count,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => available = observed,
            }
        }
    }

    fn acquire_until(&self, deadline: Deadline, count: usize) -> bool {
        if self.try_acquire(count) {
            return true;
        }
        if deadline.is_reached() {
            return false;
        }

        let ctx = current::context();
        let mut woken_from_list = false;
        loop {
            if self.try_acquire(count) {
                return true;
            }
            if deadline.is_reached() || ctx.should_cancel() {
                if woken_from_list {
                    // Pass the baton: the wakeup we consumed belongs to
                    // another waiter now.
                    self.inner.waiters.wake_one();
                }
                return false;
            }
            let strategy = Arc::new(SemaphoreWaitStrategy {
                deadline,
                inner: Arc::clone(&self.inner),
                need: count,
                waiter: Arc::clone(&ctx),
            });
            woken_from_list = ctx.sleep(strategy) == crate::task::context::WakeupSource::WaitList;
        }
    }

    fn release(&self, count: usize) {
        let previous = self.inner.available.fetch_add(count, Ordering::AcqRel);
        debug_assert!(previous.checked_add(count).is_some(), "semaphore overflow");
        if count == 1 {
            self.inner.waiters.wake_one();
        } else {
            self.inner.waiters.wake_all();
        }
    }
}

struct SemaphoreWaitStrategy {
    deadline: Deadline,
    inner: Arc<SemaphoreInner>,
    need: usize,
    waiter: Arc<crate::task::context::TaskContext>,
}

impl WaitStrategy for SemaphoreWaitStrategy {
    fn deadline(&self) -> Deadline {
        self.deadline
    }

    fn wait_list(&self) -> Option<&dyn WaitListRef> {
        Some(&self.inner.waiters)
    }

    fn after_asleep(&self) {
        self.inner.waiters.append(Arc::clone(&self.waiter));
        // Tokens may have arrived between the failed acquire and the
        // registration above; wake the front waiter to re-check.
        if self.inner.available.load(Ordering::SeqCst) >= self.need {
            self.inner.waiters.wake_one();
        }
    }
}
