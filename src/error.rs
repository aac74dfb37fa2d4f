//! Error types for the runtime.
//!
//! Recoverable conditions (timeouts, interrupted waits, closed queues,
//! overload) surface to the caller as values. Programming errors (use of a
//! task-only API outside a task, state-machine invariant violations) are
//! fatal and panic with a diagnostic message instead of returning a value.

use std::fmt;

use crate::types::CancelReason;

/// The kind of a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A deadline expired during a blocking call. Non-exceptional.
    TimedOut,
    /// Cancellation was delivered while the task was suspended.
    Interrupted,
    /// The opposite side of a handoff queue dropped all of its handles.
    QueueClosed,
    /// A non-critical task was rejected by a saturated processor.
    Overloaded,
}

/// The error type for runtime operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<CancelReason>,
    context: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            reason: None,
            context: None,
        }
    }

    /// Creates a timed-out error.
    #[must_use]
    pub const fn timed_out() -> Self {
        Self::new(ErrorKind::TimedOut)
    }

    /// Creates an interrupted-wait error carrying the cancellation reason.
    #[must_use]
    pub const fn interrupted(reason: CancelReason) -> Self {
        Self {
            kind: ErrorKind::Interrupted,
            reason: Some(reason),
            context: None,
        }
    }

    /// Creates a queue-closed error.
    #[must_use]
    pub const fn queue_closed() -> Self {
        Self::new(ErrorKind::QueueClosed)
    }

    /// Creates an overloaded error.
    #[must_use]
    pub const fn overloaded() -> Self {
        Self::new(ErrorKind::Overloaded)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the cancellation reason, if this error carries one.
    #[must_use]
    pub const fn cancellation_reason(&self) -> Option<CancelReason> {
        self.reason
    }

    /// Returns true if this error is a deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::TimedOut)
    }

    /// Returns true if this error is an interrupted wait.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::Interrupted)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::TimedOut => write!(f, "deadline expired")?,
            ErrorKind::Interrupted => write!(f, "wait interrupted")?,
            ErrorKind::QueueClosed => write!(f, "queue closed")?,
            ErrorKind::Overloaded => write!(f, "processor overloaded")?,
        }
        if let Some(reason) = self.reason {
            write!(f, " ({reason})")?;
        }
        if let Some(context) = &self.context {
            write!(f, ": {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// A specialized `Result` for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
