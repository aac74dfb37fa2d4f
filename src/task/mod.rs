//! Tasks: lifecycle states, handles, and current-task accessors.

pub(crate) mod context;
pub mod current;
pub mod local;

use std::fmt;
use std::sync::Arc;

use crate::time::Deadline;
use crate::types::{CancelReason, TaskId};
use self::context::TaskContext;

/// The lifecycle state of a task.
///
/// `New → Queued → Running → {Suspended → Queued → Running}* →
/// {Completed | Cancelled}`. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but not yet scheduled.
    New,
    /// On a processor's run queue.
    Queued,
    /// Executing on a worker.
    Running,
    /// Parked, waiting for a wakeup.
    Suspended,
    /// Finished normally.
    Completed,
    /// Finished by cancellation.
    Cancelled,
    /// Reserved for detectably corrupt contexts.
    Invalid,
}

impl TaskState {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Queued => 1,
            Self::Running => 2,
            Self::Suspended => 3,
            Self::Completed => 4,
            Self::Cancelled => 5,
            Self::Invalid => 6,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::New,
            1 => Self::Queued,
            2 => Self::Running,
            3 => Self::Suspended,
            4 => Self::Completed,
            5 => Self::Cancelled,
            _ => Self::Invalid,
        }
    }

    /// Returns true for the absorbing terminal states.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// A short human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The result of waiting for a task to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The target task finished (completed or cancelled).
    Ok,
    /// The deadline expired before the target finished.
    TimedOut,
    /// The waiting task was itself cancelled.
    Cancelled,
}

/// An owned handle to a spawned task.
///
/// Dropping an unfinished, non-detached handle cancels the task
/// (`CancelReason::Abandoned`) and waits for it to finish, so a task never
/// outlives its owner silently. Call [`TaskHandle::detach`] to opt out.
pub struct TaskHandle {
    ctx: Arc<TaskContext>,
}

impl TaskHandle {
    pub(crate) fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    /// The task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.ctx.id()
    }

    /// The task's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.ctx.state()
    }

    /// True once the task reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.ctx.is_finished()
    }

    /// The task's cancellation reason, if cancellation was requested.
    #[must_use]
    pub fn cancellation_reason(&self) -> Option<CancelReason> {
        self.ctx.cancellation_reason()
    }

    /// Requests cancellation with the given reason. Returns true if this
    /// call triggered the (one-shot) cancellation.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.ctx.request_cancel(reason)
    }

    /// Waits for the task to finish.
    pub fn wait(&self) -> WaitOutcome {
        self.wait_until(Deadline::Unreachable)
    }

    /// Waits for the task to finish, bounded by `deadline`.
    ///
    /// Usable both from inside a task (suspends through the wait protocol)
    /// and from a plain thread (blocks on a condvar).
    pub fn wait_until(&self, deadline: Deadline) -> WaitOutcome {
        if self.ctx.is_finished() {
            return WaitOutcome::Ok;
        }
        if let Some(waiter) = current::try_context() {
            if waiter.should_cancel() {
                return WaitOutcome::Cancelled;
            }
            if self.ctx.wait_finished_until(deadline) {
                WaitOutcome::Ok
            } else if waiter.should_cancel() {
                WaitOutcome::Cancelled
            } else {
                WaitOutcome::TimedOut
            }
        } else if self.ctx.wait_finished_until(deadline) {
            WaitOutcome::Ok
        } else {
            WaitOutcome::TimedOut
        }
    }

    /// Detaches the task: the handle's drop will no longer cancel or join
    /// it. The task keeps running to completion on its own.
    pub fn detach(self) {
        self.ctx.set_detached();
        // Drop runs next and sees the detached flag.
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if self.ctx.is_detached() || self.ctx.is_finished() {
            return;
        }
        self.ctx.request_cancel(CancelReason::Abandoned);
        self.ctx.wait_finished_until(Deadline::Unreachable);
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.ctx.id())
            .field("state", &self.ctx.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips() {
        for state in [
            TaskState::New,
            TaskState::Queued,
            TaskState::Running,
            TaskState::Suspended,
            TaskState::Completed,
            TaskState::Cancelled,
        ] {
            assert_eq!(TaskState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn terminal_states_are_finished() {
        assert!(TaskState::Completed.is_finished());
        assert!(TaskState::Cancelled.is_finished());
        assert!(!TaskState::Suspended.is_finished());
        assert!(!TaskState::Running.is_finished());
    }
}
