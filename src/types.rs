//! Core identifier and classification types for the runtime.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// A stable, monotonically increasing task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocates the next task id.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// The scheduling importance of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Importance {
    /// A regular task; may be rejected under processor overload and is
    /// terminated before entering its payload when cancelled early.
    #[default]
    Normal,
    /// A critical task; immune to overload rejection and guaranteed to enter
    /// its payload even if cancellation was requested before its first run.
    Critical,
}

/// Why a task was cancelled.
///
/// A task's cancellation reason transitions from "untriggered" to one of
/// these values exactly once; later requests are ignored. The untriggered
/// state is modelled as `Option<CancelReason>::None` at the API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// Explicit cancellation requested through a task handle.
    UserRequest,
    /// Cancellation driven by a deadline.
    Deadline,
    /// The task was rejected by a saturated processor.
    Overload,
    /// The processor is shutting down.
    Shutdown,
    /// The owning handle was dropped without detaching.
    Abandoned,
}

impl CancelReason {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::UserRequest => 1,
            Self::Deadline => 2,
            Self::Overload => 3,
            Self::Shutdown => 4,
            Self::Abandoned => 5,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::UserRequest),
            2 => Some(Self::Deadline),
            3 => Some(Self::Overload),
            4 => Some(Self::Shutdown),
            5 => Some(Self::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRequest => write!(f, "user request"),
            Self::Deadline => write!(f, "deadline"),
            Self::Overload => write!(f, "overload"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Abandoned => write!(f, "task abandoned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_monotonic() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
    }

    #[test]
    fn cancel_reason_round_trips() {
        for reason in [
            CancelReason::UserRequest,
            CancelReason::Deadline,
            CancelReason::Overload,
            CancelReason::Shutdown,
            CancelReason::Abandoned,
        ] {
            assert_eq!(CancelReason::from_u8(reason.as_u8()), Some(reason));
        }
        assert_eq!(CancelReason::from_u8(0), None);
    }
}
