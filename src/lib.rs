//! Strand: a cooperative task runtime.
//!
//! # Overview
//!
//! Strand multiplexes a bounded pool of OS worker threads across an
//! unbounded number of user-space tasks. A task's payload is ordinary
//! blocking code running on a pooled coroutine thread; it suspends only at
//! explicit suspension points (sleeps, semaphore acquires, queue pushes and
//! pops, joins), each of which accepts a deadline and observes cancellation.
//!
//! # Core pieces
//!
//! - [`runtime::TaskProcessor`]: the scheduler — worker threads, a run
//!   queue, a coroutine pool, and a deadline timer thread.
//! - [`task::TaskHandle`] and the [`current`] module: spawning, joining,
//!   cancelling, yielding, per-task storage, and non-cancellable scopes.
//! - [`sync`]: a counting semaphore and a single-consumer event that park
//!   tasks through the generic wait protocol.
//! - [`queue::HandoffQueue`]: a bounded SPSC/SPMC/MPSC/MPMC handoff queue
//!   whose capacity and side-liveness are expressed as gates over those
//!   primitives.
//!
//! # Cancellation
//!
//! Cancellation is deferred: requesting it wakes the task, and the
//! cancellation manifests as an `Interrupted` error returned from the next
//! suspension point. A task may shield a critical section with
//! [`current::NonCancellableGuard`].
//!
//! # Example
//!
//! ```no_run
//! use strand::runtime::TaskProcessor;
//! use strand::queue::SpscQueue;
//! use strand::time::Deadline;
//!
//! let processor = TaskProcessor::builder().worker_threads(2).build();
//! let queue = SpscQueue::create(16);
//! let producer = queue.producer();
//! let consumer = queue.consumer();
//!
//! let worker = processor.spawn(move || {
//!     while let Ok(value) = consumer.pop(Deadline::Unreachable) {
//!         println!("got {value}");
//!     }
//!     Ok(())
//! });
//!
//! producer.push(1, Deadline::Unreachable).ok();
//! drop(producer);
//! worker.wait();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
mod flags;
pub mod queue;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod test_utils;
pub mod time;
pub mod types;
pub(crate) mod wait;

pub use error::{Error, ErrorKind, Result};
pub use runtime::{ProcessorBuilder, ProcessorConfig, TaskCounter, TaskProcessor};
pub use task::current;
pub use task::{TaskHandle, TaskState, WaitOutcome};
pub use time::Deadline;
pub use types::{CancelReason, Importance, TaskId};
