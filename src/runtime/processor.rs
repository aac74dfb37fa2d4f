//! The task processor: worker threads servicing a shared run queue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_queue::SegQueue;

use super::config::{ProcessorBuilder, ProcessorConfig};
use super::coro::CoroutinePool;
use super::counter::TaskCounter;
use crate::task::context::{TaskContext, WakeupSource};
use crate::task::TaskHandle;
use crate::time::timer::TimerThread;
use crate::types::{CancelReason, Importance};

/// State shared between the processor handle, its workers, and every task
/// context it owns.
pub(crate) struct ProcessorShared {
    config: ProcessorConfig,
    run_queue: SegQueue<Arc<TaskContext>>,
    idle_mutex: Mutex<()>,
    idle_cond: Condvar,
    shutdown: AtomicBool,
    active_workers: AtomicUsize,
    coro_pool: CoroutinePool,
    timer: TimerThread,
    counters: Arc<TaskCounter>,
}

impl ProcessorShared {
    pub(crate) fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub(crate) fn coro_pool(&self) -> &CoroutinePool {
        &self.coro_pool
    }

    pub(crate) fn timer(&self) -> &TimerThread {
        &self.timer
    }

    pub(crate) fn counters(&self) -> &Arc<TaskCounter> {
        &self.counters
    }

    /// Admits a context to the run queue.
    ///
    /// Admission control happens here: when the queue is saturated,
    /// non-critical tasks are cancelled with `Overload` (but still queued,
    /// so they terminate promptly and wake their waiters). A processor that
    /// is shutting down cancels every incoming task with `Shutdown`.
    pub(crate) fn schedule(&self, ctx: Arc<TaskContext>) {
        if self.shutdown.load(Ordering::Acquire) {
            ctx.request_cancel(CancelReason::Shutdown);
        } else if self.config.overload_queue_size > 0
            && !ctx.is_critical()
            && self.run_queue.len() >= self.config.overload_queue_size
        {
            if ctx.request_cancel(CancelReason::Overload) {
                self.counters.account_overload_cancellation();
            }
        }

        self.run_queue.push(ctx);
        let _guard = self.idle_mutex.lock().expect("idle mutex poisoned");
        self.idle_cond.notify_one();
    }

    fn notify_all_workers(&self) {
        let _guard = self.idle_mutex.lock().expect("idle mutex poisoned");
        self.idle_cond.notify_all();
    }
}

/// A scheduler owning a fixed pool of worker threads, a coroutine pool, a
/// run queue, and a deadline timer thread.
///
/// Tasks are spawned onto a processor and run cooperatively: a worker steps
/// a task until it suspends or finishes, then picks the next context off the
/// run queue.
pub struct TaskProcessor {
    shared: Arc<ProcessorShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskProcessor {
    /// Starts a processor with the given configuration.
    #[must_use]
    pub fn new(mut config: ProcessorConfig) -> Self {
        config.normalize();
        let prefix = config.thread_name_prefix.clone();
        let shared = Arc::new(ProcessorShared {
            coro_pool: CoroutinePool::new(
                config.coroutine_pool_capacity,
                config.coroutine_stack_bytes,
                prefix.clone(),
            ),
            timer: TimerThread::start(format!("{prefix}-timer")),
            config,
            run_queue: SegQueue::new(),
            idle_mutex: Mutex::new(()),
            idle_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            counters: TaskCounter::new(),
        });

        let mut workers = Vec::with_capacity(shared.config.worker_thread_count);
        for index in 0..shared.config.worker_thread_count {
            let worker_shared = Arc::clone(&shared);
            worker_shared.active_workers.fetch_add(1, Ordering::Relaxed);
            let handle = thread::Builder::new()
                .name(format!("{prefix}-worker-{index}"))
                .spawn(move || {
                    worker_loop(&worker_shared);
                    worker_shared.active_workers.fetch_sub(1, Ordering::Release);
                })
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Returns a builder with default configuration.
    #[must_use]
    pub fn builder() -> ProcessorBuilder {
        ProcessorBuilder::new()
    }

    /// Spawns a task with [`Importance::Normal`].
    pub fn spawn<F>(&self, payload: F) -> TaskHandle
    where
        F: FnOnce() -> crate::Result<()> + Send + 'static,
    {
        self.spawn_with(Importance::Normal, payload)
    }

    /// Spawns a task with [`Importance::Critical`]: it is immune to overload
    /// rejection and enters its payload even if cancelled before first run.
    pub fn spawn_critical<F>(&self, payload: F) -> TaskHandle
    where
        F: FnOnce() -> crate::Result<()> + Send + 'static,
    {
        self.spawn_with(Importance::Critical, payload)
    }

    /// Spawns a task with explicit importance.
    pub fn spawn_with<F>(&self, importance: Importance, payload: F) -> TaskHandle
    where
        F: FnOnce() -> crate::Result<()> + Send + 'static,
    {
        let ctx = Arc::new(TaskContext::new(
            Arc::clone(&self.shared),
            importance,
            Box::new(payload),
        ));
        tracing::debug!(task = %ctx.id(), ?importance, "task spawned");
        // The bootstrap wakeup kicks the new context onto the run queue.
        ctx.wakeup(WakeupSource::Bootstrap);
        TaskHandle::new(ctx)
    }

    /// The processor's task counters.
    #[must_use]
    pub fn counters(&self) -> &TaskCounter {
        &self.shared.counters
    }

    /// Approximate run-queue length.
    #[must_use]
    pub fn run_queue_len(&self) -> usize {
        self.shared.run_queue.len()
    }

    /// Initiates shutdown and waits for the worker threads to exit.
    ///
    /// Queued tasks are still stepped before workers exit; tasks that are
    /// suspended and never woken are not waited for. Returns false if the
    /// workers did not exit within `timeout`.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notify_all_workers();

        let deadline = std::time::Instant::now() + timeout;
        while self.shared.active_workers.load(Ordering::Acquire) > 0 {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            self.shared.notify_all_workers();
            thread::sleep(Duration::from_millis(5));
        }

        {
            let mut workers = self.workers.lock().expect("worker handles poisoned");
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
        self.shared.coro_pool.shutdown();
        self.shared.timer.shutdown();
        true
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        let _ = self.shutdown_and_wait(Duration::from_secs(5));
    }
}

impl std::fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("workers", &self.shared.config.worker_thread_count)
            .field("run_queue_len", &self.shared.run_queue.len())
            .field("alive_tasks", &self.shared.counters.alive())
            .finish()
    }
}

fn worker_loop(shared: &Arc<ProcessorShared>) {
    loop {
        if let Some(ctx) = shared.run_queue.pop() {
            ctx.do_step();
            continue;
        }
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let guard = shared.idle_mutex.lock().expect("idle mutex poisoned");
        if !shared.run_queue.is_empty() || shared.shutdown.load(Ordering::Acquire) {
            continue;
        }
        // The timeout is a safety net against a lost notification.
        let _ = shared
            .idle_cond
            .wait_timeout(guard, Duration::from_millis(100))
            .expect("idle mutex poisoned");
    }
}
