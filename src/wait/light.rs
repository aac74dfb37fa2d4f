//! Single-waiter wait list.

use std::sync::{Arc, Mutex};

use super::WaitListRef;
use crate::task::context::{TaskContext, WakeupSource};

/// A wait list holding at most one waiter.
///
/// Used for finish-waiters of a single task and for single-consumer events,
/// where the full list bookkeeping of `WaitList` is unnecessary.
#[derive(Debug, Default)]
pub(crate) struct WaitListLight {
    slot: Mutex<Option<Arc<TaskContext>>>,
}

impl WaitListLight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers the waiter. Panics if another task is already registered:
    /// the primitives built on this list admit one waiter at a time.
    pub(crate) fn set(&self, ctx: Arc<TaskContext>) {
        let mut slot = self.slot.lock().expect("wait slot poisoned");
        assert!(
            slot.is_none(),
            "WaitListLight already holds a waiter; a second task tried to wait"
        );
        *slot = Some(ctx);
    }

    /// Wakes the registered waiter, if any. Returns false if the slot was
    /// empty.
    pub(crate) fn wake_one(&self) -> bool {
        let ctx = self.slot.lock().expect("wait slot poisoned").take();
        match ctx {
            Some(ctx) => {
                ctx.wakeup(WakeupSource::WaitList);
                true
            }
            None => false,
        }
    }

    /// Wakes the registered waiter, if any.
    pub(crate) fn wake_all(&self) {
        self.wake_one();
    }
}

impl WaitListRef for WaitListLight {
    fn remove(&self, ctx: &Arc<TaskContext>) {
        let mut slot = self.slot.lock().expect("wait slot poisoned");
        if slot.as_ref().is_some_and(|waiter| Arc::ptr_eq(waiter, ctx)) {
            *slot = None;
        }
    }
}
