//! Unbounded wait list for semaphores and similar primitives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::WaitListRef;
use crate::task::context::{TaskContext, WakeupSource};

/// A mutex-guarded list of suspended tasks.
///
/// Waiters are woken in FIFO order. Waking a task removes it from the list;
/// a task woken by some other source removes itself via [`WaitListRef`].
#[derive(Debug, Default)]
pub(crate) struct WaitList {
    waiters: Mutex<VecDeque<Arc<TaskContext>>>,
}

impl WaitList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a task to the back of the list.
    pub(crate) fn append(&self, ctx: Arc<TaskContext>) {
        self.waiters.lock().expect("wait list poisoned").push_back(ctx);
    }

    /// Wakes the first waiter. Returns false if the list was empty.
    pub(crate) fn wake_one(&self) -> bool {
        let ctx = self
            .waiters
            .lock()
            .expect("wait list poisoned")
            .pop_front();
        match ctx {
            Some(ctx) => {
                ctx.wakeup(WakeupSource::WaitList);
                true
            }
            None => false,
        }
    }

    /// Wakes every waiter.
    pub(crate) fn wake_all(&self) {
        let drained: Vec<_> = {
            let mut waiters = self.waiters.lock().expect("wait list poisoned");
            waiters.drain(..).collect()
        };
        for ctx in drained {
            ctx.wakeup(WakeupSource::WaitList);
        }
    }
}

impl WaitListRef for WaitList {
    fn remove(&self, ctx: &Arc<TaskContext>) {
        self.waiters
            .lock()
            .expect("wait list poisoned")
            .retain(|waiter| !Arc::ptr_eq(waiter, ctx));
    }
}
