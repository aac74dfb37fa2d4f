//! Deadlines for blocking operations.
//!
//! Every blocking call in the runtime accepts a [`Deadline`]. A deadline is
//! either unreachable (wait forever), a monotonic time point, or already
//! expired; the three cases are represented explicitly rather than through a
//! sentinel time value.

use std::time::{Duration, Instant};

/// An absolute deadline for a blocking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    /// No deadline; the operation may wait indefinitely.
    #[default]
    Unreachable,
    /// The operation must finish by this time point.
    At(Instant),
    /// The deadline has already expired; the operation must not block.
    Passed,
}

impl Deadline {
    /// Creates a deadline `duration` from now.
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        match Instant::now().checked_add(duration) {
            Some(when) => Self::At(when),
            None => Self::Unreachable,
        }
    }

    /// Creates a deadline at the given time point.
    #[must_use]
    pub const fn at(when: Instant) -> Self {
        Self::At(when)
    }

    /// Creates an already-expired deadline.
    #[must_use]
    pub const fn passed() -> Self {
        Self::Passed
    }

    /// Returns true unless the deadline is [`Deadline::Unreachable`].
    #[must_use]
    pub const fn is_reachable(self) -> bool {
        !matches!(self, Self::Unreachable)
    }

    /// Returns true if the deadline has expired.
    #[must_use]
    pub fn is_reached(self) -> bool {
        match self {
            Self::Unreachable => false,
            Self::At(when) => when <= Instant::now(),
            Self::Passed => true,
        }
    }

    /// Returns the time left until the deadline.
    ///
    /// `None` for an unreachable deadline, zero for an expired one.
    #[must_use]
    pub fn time_left(self) -> Option<Duration> {
        match self {
            Self::Unreachable => None,
            Self::At(when) => Some(when.saturating_duration_since(Instant::now())),
            Self::Passed => Some(Duration::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_never_expires() {
        let deadline = Deadline::Unreachable;
        assert!(!deadline.is_reachable());
        assert!(!deadline.is_reached());
        assert_eq!(deadline.time_left(), None);
    }

    #[test]
    fn passed_is_always_reached() {
        let deadline = Deadline::passed();
        assert!(deadline.is_reachable());
        assert!(deadline.is_reached());
        assert_eq!(deadline.time_left(), Some(Duration::ZERO));
    }

    #[test]
    fn future_deadline_is_not_reached() {
        let deadline = Deadline::from_duration(Duration::from_secs(60));
        assert!(deadline.is_reachable());
        assert!(!deadline.is_reached());
        assert!(deadline.time_left().expect("reachable") > Duration::from_secs(59));
    }

    #[test]
    fn elapsed_time_point_is_reached() {
        let deadline = Deadline::at(Instant::now());
        // `Instant::now()` has advanced past the captured point by now.
        assert!(deadline.is_reached());
        assert_eq!(deadline.time_left(), Some(Duration::ZERO));
    }

    #[test]
    fn default_is_unreachable() {
        assert_eq!(Deadline::default(), Deadline::Unreachable);
    }
}
