//! Accessors for the task running on the current thread.
//!
//! The current-task pointer is a thread local installed for exactly the span
//! of one payload execution on a coroutine thread; it is asserted empty
//! outside of it. The public accessors here consult it and fail loudly when
//! called off-task — that is a programming error, not a recoverable
//! condition.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::task::context::{TaskContext, WakeupSource};
use crate::task::local::LocalStorage;
use crate::time::Deadline;
use crate::types::{CancelReason, TaskId};
use crate::wait::WaitStrategy;

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<TaskContext>>> = const { RefCell::new(None) };
}

/// Installs the current-task pointer for the duration of a payload run.
pub(crate) struct CurrentTaskScope;

impl CurrentTaskScope {
    pub(crate) fn new(ctx: &Arc<TaskContext>) -> Self {
        CURRENT_TASK.with(|current| {
            let mut current = current.borrow_mut();
            assert!(
                current.is_none(),
                "current task installed twice on one thread"
            );
            *current = Some(Arc::clone(ctx));
        });
        Self
    }
}

impl Drop for CurrentTaskScope {
    fn drop(&mut self) {
        CURRENT_TASK.with(|current| {
            *current.borrow_mut() = None;
        });
    }
}

/// Returns the current task context, if this thread is running one.
pub(crate) fn try_context() -> Option<Arc<TaskContext>> {
    CURRENT_TASK.with(|current| current.borrow().clone())
}

/// Returns the current task context; panics off-task.
pub(crate) fn context() -> Arc<TaskContext> {
    try_context().unwrap_or_else(|| {
        panic!("current task API used outside of a task");
    })
}

/// True if this thread is currently executing a task payload.
#[must_use]
pub fn is_inside_task() -> bool {
    try_context().is_some()
}

/// The id of the current task. Panics off-task.
#[must_use]
pub fn task_id() -> TaskId {
    context().id()
}

/// True if the current task has a deliverable cancellation pending.
/// Panics off-task.
#[must_use]
pub fn should_cancel() -> bool {
    context().should_cancel()
}

/// The current task's cancellation reason, if cancellation was requested.
/// Panics off-task.
#[must_use]
pub fn cancellation_reason() -> Option<CancelReason> {
    context().cancellation_reason()
}

fn interrupted_error(ctx: &TaskContext) -> Error {
    Error::interrupted(
        ctx.cancellation_reason()
            .unwrap_or(CancelReason::UserRequest),
    )
}

/// Wait strategy that reschedules the task immediately, yielding the rest
/// of its time slice.
struct YieldStrategy {
    ctx: Arc<TaskContext>,
}

impl WaitStrategy for YieldStrategy {
    fn deadline(&self) -> Deadline {
        Deadline::Unreachable
    }

    fn after_asleep(&self) {
        self.ctx.wakeup(WakeupSource::Bootstrap);
    }
}

/// Yields the current task back to the run queue.
///
/// Returns `Err(Interrupted)` if a deliverable cancellation is pending,
/// before or after the yield. Panics off-task.
pub fn yield_now() -> crate::Result<()> {
    let ctx = context();
    if ctx.should_cancel() {
        return Err(interrupted_error(&ctx));
    }
    ctx.sleep(Arc::new(YieldStrategy {
        ctx: Arc::clone(&ctx),
    }));
    if ctx.should_cancel() {
        return Err(interrupted_error(&ctx));
    }
    Ok(())
}

/// Wait strategy with a deadline and no wait list: only the timer or a
/// cancellation can end it.
struct DeadlineWaitStrategy {
    deadline: Deadline,
}

impl WaitStrategy for DeadlineWaitStrategy {
    fn deadline(&self) -> Deadline {
        self.deadline
    }
}

/// Suspends the current task until `deadline`.
///
/// Returns `Ok` once the deadline is reached and `Err(Interrupted)` if a
/// deliverable cancellation arrives first. With an unreachable deadline the
/// task sleeps until cancelled. Panics off-task.
pub fn sleep_until(deadline: Deadline) -> crate::Result<()> {
    let ctx = context();
    loop {
        if ctx.should_cancel() {
            return Err(interrupted_error(&ctx));
        }
        if deadline.is_reached() {
            return Ok(());
        }
        ctx.sleep(Arc::new(DeadlineWaitStrategy { deadline }));
    }
}

/// Suspends the current task for `duration`. See [`sleep_until`].
pub fn sleep_for(duration: Duration) -> crate::Result<()> {
    sleep_until(Deadline::from_duration(duration))
}

/// Runs `f` with the current task's local storage. Panics off-task or
/// outside payload execution.
pub fn with_local_storage<R>(f: impl FnOnce(&mut LocalStorage) -> R) -> R {
    context().with_local_storage(f)
}

/// Scoped guard making the current task non-cancellable.
///
/// While the guard lives, cancellation cannot wake the task and
/// [`should_cancel`] reports false. Dropping the guard restores the previous
/// cancellability; a cancellation that arrived meanwhile is delivered at the
/// next suspension point.
#[must_use = "cancellation is re-armed as soon as the guard is dropped"]
pub struct NonCancellableGuard {
    ctx: Arc<TaskContext>,
    was_cancellable: bool,
}

impl NonCancellableGuard {
    /// Enters a non-cancellable scope on the current task. Panics off-task.
    pub fn new() -> Self {
        let ctx = context();
        let was_cancellable = ctx.set_cancellable(false);
        Self {
            ctx,
            was_cancellable,
        }
    }
}

impl Default for NonCancellableGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NonCancellableGuard {
    fn drop(&mut self) {
        self.ctx.set_cancellable(self.was_cancellable);
    }
}
