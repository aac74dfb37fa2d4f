//! Task accounting for a processor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic task counters plus an alive gauge.
///
/// The alive gauge is driven by [`CounterToken`]s: one is issued per task
/// context and released when the context is dropped, so the gauge also
/// covers tasks kept alive only by timers or wait lists.
#[derive(Debug, Default)]
pub struct TaskCounter {
    created: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    cancellation_requests: AtomicU64,
    overload_cancellations: AtomicU64,
    alive: AtomicU64,
}

impl TaskCounter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn token(self: &Arc<Self>) -> CounterToken {
        self.created.fetch_add(1, Ordering::Relaxed);
        self.alive.fetch_add(1, Ordering::Relaxed);
        CounterToken {
            counter: Arc::clone(self),
        }
    }

    pub(crate) fn account_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn account_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn account_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn account_cancel_requested(&self) {
        self.cancellation_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn account_overload_cancellation(&self) {
        self.overload_cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Tasks created so far.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Tasks that entered their first step.
    #[must_use]
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Tasks that finished normally.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Tasks that finished cancelled.
    #[must_use]
    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Cancellation requests that won the one-shot transition.
    #[must_use]
    pub fn cancellation_requests(&self) -> u64 {
        self.cancellation_requests.load(Ordering::Relaxed)
    }

    /// Non-critical tasks cancelled by overload admission control.
    #[must_use]
    pub fn overload_cancellations(&self) -> u64 {
        self.overload_cancellations.load(Ordering::Relaxed)
    }

    /// Task contexts currently alive (including suspended and queued).
    #[must_use]
    pub fn alive(&self) -> u64 {
        self.alive.load(Ordering::Relaxed)
    }
}

/// RAII token backing the alive gauge.
#[derive(Debug)]
pub(crate) struct CounterToken {
    counter: Arc<TaskCounter>,
}

impl Drop for CounterToken {
    fn drop(&mut self) {
        self.counter.alive.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_drives_alive_gauge() {
        let counter = TaskCounter::new();
        let token_a = counter.token();
        let token_b = counter.token();
        assert_eq!(counter.created(), 2);
        assert_eq!(counter.alive(), 2);

        drop(token_a);
        assert_eq!(counter.alive(), 1);
        drop(token_b);
        assert_eq!(counter.alive(), 0);
        assert_eq!(counter.created(), 2);
    }
}
