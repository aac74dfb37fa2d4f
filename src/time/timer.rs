//! The deadline timer thread.
//!
//! Each processor owns one event thread hosting one-shot deadline timers: a
//! min-heap of `(when, generation)` entries drained by a condvar loop.
//! Firing a timer only calls `wakeup(DeadlineTimer)` on the task — timer
//! callbacks run off the worker threads and must interact with tasks through
//! the atomic wakeup path alone. Entries hold a strong reference to the
//! context; cancelling a timer tombstones the entry, which is discarded when
//! it surfaces in the heap.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::task::context::{TaskContext, WakeupSource};

struct TimerEntry {
    when: Instant,
    generation: u64,
    ctx: Arc<TaskContext>,
    cancelled: Arc<AtomicBool>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse ordering for a min-heap (earliest deadline first), with
        // the generation as a FIFO tiebreak.
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct TimerShared {
    heap: Mutex<BinaryHeap<TimerEntry>>,
    cond: Condvar,
    shutdown: AtomicBool,
    next_generation: AtomicU64,
}

/// Cancels its one-shot timer when no longer needed.
///
/// Cancellation is advisory: a timer that already fired set a wakeup flag,
/// which the sleep path clears as a stale race.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// The per-processor timer thread.
pub(crate) struct TimerThread {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerThread {
    pub(crate) fn start(thread_name: String) -> Self {
        let shared = Arc::new(TimerShared::default());
        let loop_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || timer_loop(&loop_shared))
            .expect("failed to spawn timer thread");
        Self {
            shared,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Arms a one-shot timer waking `ctx` at `when`.
    pub(crate) fn schedule(&self, ctx: Arc<TaskContext>, when: Instant) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut heap = self.shared.heap.lock().expect("timer heap poisoned");
            heap.push(TimerEntry {
                when,
                generation,
                ctx,
                cancelled: Arc::clone(&cancelled),
            });
        }
        self.shared.cond.notify_one();
        TimerHandle { cancelled }
    }

    pub(crate) fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.cond.notify_all();
        let thread = self.thread.lock().expect("timer thread poisoned").take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for TimerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self
            .shared
            .heap
            .lock()
            .map(|heap| heap.len())
            .unwrap_or(0);
        f.debug_struct("TimerThread")
            .field("pending", &pending)
            .finish()
    }
}

fn timer_loop(shared: &Arc<TimerShared>) {
    let mut heap = shared.heap.lock().expect("timer heap poisoned");
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        let mut fired = Vec::new();
        while let Some(entry) = heap.peek() {
            if entry.when > now {
                break;
            }
            let entry = heap.pop().expect("peeked entry vanished");
            if !entry.cancelled.load(Ordering::Acquire) {
                fired.push(entry.ctx);
            }
        }

        if !fired.is_empty() {
            // Wakeups may schedule tasks and take other locks; never hold
            // the heap across them.
            drop(heap);
            for ctx in fired {
                ctx.wakeup(WakeupSource::DeadlineTimer);
            }
            heap = shared.heap.lock().expect("timer heap poisoned");
            continue;
        }

        let next_deadline = heap.peek().map(|entry| entry.when);
        heap = match next_deadline {
            Some(when) => {
                let timeout = when.saturating_duration_since(now);
                shared
                    .cond
                    .wait_timeout(heap, timeout)
                    .expect("timer heap poisoned")
                    .0
            }
            None => shared.cond.wait(heap).expect("timer heap poisoned"),
        };
    }
}
