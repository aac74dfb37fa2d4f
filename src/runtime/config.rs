//! Processor configuration.
//!
//! Prefer [`TaskProcessor::builder`](super::TaskProcessor::builder) over
//! constructing a [`ProcessorConfig`] by hand.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `worker_thread_count` | available CPU parallelism |
//! | `coroutine_stack_bytes` | 256 KiB |
//! | `coroutine_pool_capacity` | 64 |
//! | `overload_queue_size` | 0 (admission control disabled) |
//! | `profiler_threshold` | `None` (disabled) |
//! | `trace_csw_per_task` | 0 (disabled) |
//! | `thread_name_prefix` | `"strand"` |

use std::time::Duration;

use super::TaskProcessor;

/// Configuration for a [`TaskProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Number of worker threads servicing the run queue.
    pub worker_thread_count: usize,
    /// Stack size of coroutine threads (0 = platform default).
    pub coroutine_stack_bytes: usize,
    /// Maximum number of idle coroutines retained by the pool.
    pub coroutine_pool_capacity: usize,
    /// Run-queue length beyond which non-critical tasks are cancelled with
    /// `CancelReason::Overload` (0 disables admission control).
    pub overload_queue_size: usize,
    /// Warn when a task runs longer than this without a context switch.
    pub profiler_threshold: Option<Duration>,
    /// Number of state transitions traced per task (0 disables tracing).
    pub trace_csw_per_task: u32,
    /// Name prefix for worker, coroutine and timer threads.
    pub thread_name_prefix: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            worker_thread_count: default_worker_threads(),
            coroutine_stack_bytes: 256 * 1024,
            coroutine_pool_capacity: 64,
            overload_queue_size: 0,
            profiler_threshold: None,
            trace_csw_per_task: 0,
            thread_name_prefix: "strand".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Normalizes configuration values to safe minimums.
    pub fn normalize(&mut self) {
        if self.worker_thread_count == 0 {
            self.worker_thread_count = 1;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = "strand".to_string();
        }
    }
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .max(1)
}

/// Builder for a [`TaskProcessor`].
#[derive(Debug, Default)]
pub struct ProcessorBuilder {
    config: ProcessorConfig,
}

impl ProcessorBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_thread_count = count;
        self
    }

    /// Sets the coroutine thread stack size in bytes.
    #[must_use]
    pub fn coroutine_stack_bytes(mut self, bytes: usize) -> Self {
        self.config.coroutine_stack_bytes = bytes;
        self
    }

    /// Sets the maximum number of idle coroutines retained.
    #[must_use]
    pub fn coroutine_pool_capacity(mut self, capacity: usize) -> Self {
        self.config.coroutine_pool_capacity = capacity;
        self
    }

    /// Enables overload admission control at the given queue length.
    #[must_use]
    pub fn overload_queue_size(mut self, size: usize) -> Self {
        self.config.overload_queue_size = size;
        self
    }

    /// Warns when a task runs longer than `threshold` without switching.
    #[must_use]
    pub fn profiler_threshold(mut self, threshold: Duration) -> Self {
        self.config.profiler_threshold = Some(threshold);
        self
    }

    /// Traces up to `count` state transitions per task.
    #[must_use]
    pub fn trace_csw_per_task(mut self, count: u32) -> Self {
        self.config.trace_csw_per_task = count;
        self
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Builds and starts the processor.
    #[must_use]
    pub fn build(self) -> TaskProcessor {
        TaskProcessor::new(self.config)
    }
}
