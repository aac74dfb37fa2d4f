//! Coroutine pool and the worker/coroutine switch.
//!
//! A "coroutine" is a pooled OS thread dedicated to one task at a time; the
//! context switch between a scheduler worker and a coroutine is a strict
//! ping-pong rendezvous over two condvar cells. The worker hands a context
//! in through [`TaskPipe::run`] and blocks until the coroutine yields; the
//! task side yields through [`TaskPipe::switch_out`], which blocks inside
//! the suspended call until the task is stepped again. At any moment exactly
//! one side of a pipe is running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::task::context::TaskContext;
use crate::task::current::CurrentTaskScope;

/// Why a coroutine returned control to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum YieldReason {
    /// The task suspended inside `sleep`.
    TaskWaiting,
    /// The payload returned normally.
    TaskComplete,
    /// The payload was cancelled (interrupted, pre-cancelled, or panicked).
    TaskCancelled,
}

/// A single-slot rendezvous cell.
#[derive(Debug)]
struct Cell<T> {
    slot: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T> Cell<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    fn put(&self, value: T) {
        let mut slot = self.slot.lock().expect("pipe cell poisoned");
        debug_assert!(slot.is_none(), "pipe cell overwritten before consumption");
        *slot = Some(value);
        self.cond.notify_one();
    }

    fn take(&self) -> T {
        let mut slot = self.slot.lock().expect("pipe cell poisoned");
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            slot = self.cond.wait(slot).expect("pipe cell poisoned");
        }
    }
}

/// Command sent from a worker to a coroutine thread.
#[derive(Debug)]
enum Command {
    /// Step this context (first entry or resume).
    Run(Arc<TaskContext>),
    /// Exit the coroutine main loop.
    Shutdown,
}

/// The bidirectional switch between a worker and one coroutine thread.
#[derive(Debug)]
pub(crate) struct TaskPipe {
    to_coro: Cell<Command>,
    to_worker: Cell<YieldReason>,
}

impl TaskPipe {
    fn new() -> Self {
        Self {
            to_coro: Cell::new(),
            to_worker: Cell::new(),
        }
    }

    /// Worker side: steps the context and blocks until the coroutine
    /// yields. Returns the yield reason.
    pub(crate) fn run(&self, ctx: Arc<TaskContext>) -> YieldReason {
        self.to_coro.put(Command::Run(ctx));
        self.to_worker.take()
    }

    /// Task side: yields to the worker and blocks until this context is
    /// stepped again. Returns the context of the resume command.
    pub(crate) fn switch_out(&self, reason: YieldReason) -> Arc<TaskContext> {
        self.to_worker.put(reason);
        match self.to_coro.take() {
            Command::Run(ctx) => ctx,
            Command::Shutdown => {
                unreachable!("shutdown delivered to a coroutine with a live task")
            }
        }
    }
}

/// A pooled coroutine: a dedicated thread plus its pipe.
#[derive(Debug)]
pub(crate) struct CoroutineHandle {
    pipe: Arc<TaskPipe>,
    thread: Option<JoinHandle<()>>,
}

impl CoroutineHandle {
    pub(crate) fn pipe(&self) -> Arc<TaskPipe> {
        Arc::clone(&self.pipe)
    }

    fn shutdown(mut self) {
        self.pipe.to_coro.put(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CoroutineHandle {
    fn drop(&mut self) {
        // A handle dropped while its thread is parked mid-task cannot be
        // joined; the thread is detached and dies with the process.
        if self.thread.is_some() {
            tracing::debug!("coroutine handle dropped with a live thread");
        }
    }
}

/// A pool of reusable coroutine threads.
///
/// `capacity` bounds only the number of *idle* coroutines retained; the
/// number of coroutines held by live tasks is unbounded.
#[derive(Debug)]
pub(crate) struct CoroutinePool {
    idle: Mutex<Vec<CoroutineHandle>>,
    capacity: usize,
    stack_bytes: usize,
    thread_name_prefix: String,
    spawned: AtomicU64,
}

impl CoroutinePool {
    pub(crate) fn new(capacity: usize, stack_bytes: usize, thread_name_prefix: String) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            capacity,
            stack_bytes,
            thread_name_prefix,
            spawned: AtomicU64::new(0),
        }
    }

    /// Takes an idle coroutine or spawns a fresh one.
    pub(crate) fn acquire(&self) -> CoroutineHandle {
        if let Some(handle) = self.idle.lock().expect("coroutine pool poisoned").pop() {
            return handle;
        }
        self.spawn_coroutine()
    }

    /// Returns a coroutine to the pool, or retires it when the pool is at
    /// capacity.
    pub(crate) fn release(&self, handle: CoroutineHandle) {
        {
            let mut idle = self.idle.lock().expect("coroutine pool poisoned");
            if idle.len() < self.capacity {
                idle.push(handle);
                return;
            }
        }
        handle.shutdown();
    }

    /// Shuts down every idle coroutine.
    pub(crate) fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut idle = self.idle.lock().expect("coroutine pool poisoned");
            idle.drain(..).collect()
        };
        for handle in drained {
            handle.shutdown();
        }
    }

    fn spawn_coroutine(&self) -> CoroutineHandle {
        let pipe = Arc::new(TaskPipe::new());
        let coro_pipe = Arc::clone(&pipe);
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder =
            thread::Builder::new().name(format!("{}-coro-{index}", self.thread_name_prefix));
        if self.stack_bytes > 0 {
            builder = builder.stack_size(self.stack_bytes);
        }
        let thread = builder
            .spawn(move || coroutine_main(&coro_pipe))
            .expect("failed to spawn coroutine thread");
        CoroutineHandle {
            pipe,
            thread: Some(thread),
        }
    }
}

impl Drop for CoroutinePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The coroutine main loop: serves one task per handoff until shut down.
fn coroutine_main(pipe: &Arc<TaskPipe>) {
    loop {
        let ctx = match pipe.to_coro.take() {
            Command::Run(ctx) => ctx,
            Command::Shutdown => break,
        };
        let reason = serve(&ctx);
        pipe.to_worker.put(reason);
    }
}

/// Runs (or pre-terminates) one task's payload to its terminal yield.
fn serve(ctx: &Arc<TaskContext>) -> YieldReason {
    let _scope = CurrentTaskScope::new(ctx);

    // Only critical tasks get to enter their payload after an early
    // cancellation; others are terminated before it runs.
    if ctx.is_cancel_requested() && !ctx.started_as_critical() {
        ctx.set_cancellable(false);
        ctx.install_local_storage();
        // The payload may synchronize in its destructor, so it is dropped
        // here with local storage and the task scope in place.
        drop(ctx.take_payload());
        ctx.remove_local_storage();
        return YieldReason::TaskCancelled;
    }

    let payload = ctx.take_payload().expect("task payload already consumed");
    ctx.install_local_storage();
    let result = catch_unwind(AssertUnwindSafe(payload));
    ctx.remove_local_storage();

    match result {
        Ok(Ok(())) => YieldReason::TaskComplete,
        Ok(Err(error)) if error.is_interrupted() => YieldReason::TaskCancelled,
        Ok(Err(error)) => {
            tracing::debug!(task = %ctx.id(), %error, "task payload finished with an error");
            YieldReason::TaskComplete
        }
        Err(_panic) => {
            tracing::error!(task = %ctx.id(), "task payload panicked");
            YieldReason::TaskCancelled
        }
    }
}
