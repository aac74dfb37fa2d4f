//! The wait protocol: how a running task parks on a synchronization
//! primitive.
//!
//! A blocking operation builds a [`WaitStrategy`] describing its deadline,
//! the wait list to register against, and two hooks, then hands it to
//! `TaskContext::sleep`. The worker thread calls [`WaitStrategy::after_asleep`]
//! once the task has switched out (register in the wait list there, and wake
//! yourself if the awaited condition already holds — that closes the window
//! between the failed fast-path check and registration). The resuming task
//! calls [`WaitStrategy::before_awake`] before returning to user code.

mod light;
mod list;

pub(crate) use light::WaitListLight;
pub(crate) use list::WaitList;

use std::sync::Arc;

use crate::task::context::TaskContext;
use crate::time::Deadline;

/// A wait list a suspended task can be removed from.
pub(crate) trait WaitListRef: Send + Sync {
    /// Removes the task from the list if it is still registered.
    fn remove(&self, ctx: &Arc<TaskContext>);
}

/// The protocol object passed to `TaskContext::sleep`.
///
/// Strategies are shared between the sleeping task's thread and the worker
/// thread that parks it, so they are held behind `Arc` and all hooks take
/// `&self`.
pub(crate) trait WaitStrategy: Send + Sync {
    /// The deadline bounding this wait.
    fn deadline(&self) -> Deadline;

    /// The wait list this strategy registered in, if any.
    ///
    /// Consulted on wakeup: a task woken by anything other than the wait
    /// list must deregister itself.
    fn wait_list(&self) -> Option<&dyn WaitListRef> {
        None
    }

    /// Called on the worker thread immediately after the task has switched
    /// out, before it is parked.
    fn after_asleep(&self) {}

    /// Called after the task has been chosen to resume, before control
    /// returns to user code. May itself suspend.
    fn before_awake(&self) {}
}
