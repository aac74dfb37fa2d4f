//! The scheduler: processor, workers, coroutine pool, and task accounting.

mod config;
pub(crate) mod coro;
pub(crate) mod counter;
pub(crate) mod processor;

pub use config::{ProcessorBuilder, ProcessorConfig};
pub use counter::TaskCounter;
pub use processor::TaskProcessor;
