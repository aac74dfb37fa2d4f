//! Synchronization primitives built on the task wait protocol.

mod event;
mod semaphore;

pub use event::SingleConsumerEvent;
pub use semaphore::Semaphore;
