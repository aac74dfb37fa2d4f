//! The per-task control block.
//!
//! `TaskContext` owns everything one task needs: the lifecycle state machine,
//! the `sleep_state` flag word coordinating sleep/wake across threads, the
//! cancellation reason, the coroutine handle, and the finish notification.
//!
//! # Sleep/wake protocol
//!
//! The central invariant is **at-most-one reschedule per suspension**: among
//! all concurrent wakers, exactly one observes the first transition out of
//! sleep and enqueues the task. The decision is made by `should_schedule`
//! over the previous value of the `sleep_state` fetch-or; both the parking
//! fetch-or (in `do_step`) and every wake fetch-or (in `wakeup`) are
//! sequentially consistent, which makes the decision linearisable.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use crate::flags::{AtomicFlagSet, FlagBits, FlagSet};
use crate::runtime::coro::{CoroutineHandle, YieldReason};
use crate::runtime::counter::CounterToken;
use crate::runtime::processor::ProcessorShared;
use crate::task::current;
use crate::task::local::LocalStorage;
use crate::task::TaskState;
use crate::time::timer::TimerHandle;
use crate::time::Deadline;
use crate::types::{CancelReason, Importance, TaskId};
use crate::wait::WaitStrategy;

/// Magic word for debug detection of use-after-free and stray pointers.
const TASK_MAGIC: u64 = 0x7374_726e_6474_736b;

/// Bits of the `sleep_state` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SleepFlag {
    /// The task is parked (or about to be).
    Sleeping,
    /// Cancellation must not wake the task for this suspension.
    NonCancellable,
    /// Woken by its wait list.
    WakeupByWaitList,
    /// Woken by the deadline timer.
    WakeupByDeadlineTimer,
    /// Woken by a cancellation request.
    WakeupByCancelRequest,
    /// The initial pseudo-wakeup that kicks a new task into its first run.
    WakeupByBootstrap,
}

impl FlagBits for SleepFlag {
    fn bit(self) -> usize {
        match self {
            Self::Sleeping => 1 << 0,
            Self::NonCancellable => 1 << 1,
            Self::WakeupByWaitList => 1 << 2,
            Self::WakeupByDeadlineTimer => 1 << 3,
            Self::WakeupByCancelRequest => 1 << 4,
            Self::WakeupByBootstrap => 1 << 5,
        }
    }
}

/// What ended a suspension, by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeupSource {
    /// The wait list woke the task.
    WaitList,
    /// The deadline timer fired.
    DeadlineTimer,
    /// A cancellation request woke the task.
    CancelRequest,
    /// Bootstrap (initial kick or explicit yield).
    Bootstrap,
}

impl WakeupSource {
    fn flag(self) -> SleepFlag {
        match self {
            Self::WaitList => SleepFlag::WakeupByWaitList,
            Self::DeadlineTimer => SleepFlag::WakeupByDeadlineTimer,
            Self::CancelRequest => SleepFlag::WakeupByCancelRequest,
            Self::Bootstrap => SleepFlag::WakeupByBootstrap,
        }
    }
}

/// The task payload: runs on a coroutine thread; blocking calls inside it
/// return `Err(interrupted)` when cancellation is delivered.
pub(crate) type Payload = Box<dyn FnOnce() -> crate::Result<()> + Send + 'static>;

/// Condvar-based finish notification for off-task waiters.
#[derive(Debug, Default)]
struct FinishSignal {
    done: Mutex<bool>,
    cond: Condvar,
}

impl FinishSignal {
    fn notify(&self) {
        let mut done = self.done.lock().expect("finish signal poisoned");
        *done = true;
        self.cond.notify_all();
    }

    fn wait_until(&self, deadline: Deadline) -> bool {
        let mut done = self.done.lock().expect("finish signal poisoned");
        loop {
            if *done {
                return true;
            }
            match deadline.time_left() {
                None => {
                    done = self.cond.wait(done).expect("finish signal poisoned");
                }
                Some(left) if left.is_zero() => return false,
                Some(left) => {
                    done = self
                        .cond
                        .wait_timeout(done, left)
                        .expect("finish signal poisoned")
                        .0;
                }
            }
        }
    }
}

/// The control block of one task.
pub(crate) struct TaskContext {
    magic: u64,
    id: TaskId,
    processor: Arc<ProcessorShared>,
    _counter_token: CounterToken,
    is_critical: bool,
    payload: Mutex<Option<Payload>>,
    state: AtomicU8,
    is_detached: AtomicBool,
    is_cancellable: AtomicBool,
    cancellation_reason: AtomicU8,
    finish_waiters: crate::wait::WaitListLight,
    finish_signal: FinishSignal,
    trace_csw_left: AtomicU32,
    wait_manager: Mutex<Option<Arc<dyn WaitStrategy>>>,
    sleep_state: AtomicFlagSet<SleepFlag>,
    wakeup_source: AtomicU8,
    coro: Mutex<Option<CoroutineHandle>>,
    local_storage: Mutex<Option<LocalStorage>>,
}

impl TaskContext {
    pub(crate) fn new(
        processor: Arc<ProcessorShared>,
        importance: Importance,
        payload: Payload,
    ) -> Self {
        let counter_token = processor.counters().token();
        let trace_csw = processor.config().trace_csw_per_task;
        Self {
            magic: TASK_MAGIC,
            id: TaskId::next(),
            processor,
            _counter_token: counter_token,
            is_critical: importance == Importance::Critical,
            payload: Mutex::new(Some(payload)),
            state: AtomicU8::new(TaskState::New.as_u8()),
            is_detached: AtomicBool::new(false),
            is_cancellable: AtomicBool::new(true),
            cancellation_reason: AtomicU8::new(0),
            finish_waiters: crate::wait::WaitListLight::new(),
            finish_signal: FinishSignal::default(),
            trace_csw_left: AtomicU32::new(trace_csw),
            wait_manager: Mutex::new(None),
            // Starts as sleeping so the bootstrap wakeup can schedule it.
            sleep_state: AtomicFlagSet::new(FlagSet::from(SleepFlag::Sleeping)),
            wakeup_source: AtomicU8::new(0),
            coro: Mutex::new(None),
            local_storage: Mutex::new(None),
        }
    }

    fn assert_magic(&self) {
        assert_eq!(
            self.magic, TASK_MAGIC,
            "task context magic mismatch: corrupt or freed context"
        );
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn started_as_critical(&self) -> bool {
        self.is_critical
    }

    /// Running tasks must not be susceptible to overload: a task that holds
    /// a coroutine may need to run again just to be cancelled.
    pub(crate) fn is_critical(&self) -> bool {
        self.started_as_critical() || self.coro.lock().expect("coro slot poisoned").is_some()
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    pub(crate) fn set_detached(&self) {
        let was_detached = self.is_detached.swap(true, Ordering::AcqRel);
        assert!(!was_detached, "task detached twice");
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.is_detached.load(Ordering::Acquire)
    }

    // === Cancellation ===

    /// Requests cancellation. The reason transitions from untriggered
    /// exactly once; returns true if this call won the transition.
    pub(crate) fn request_cancel(self: &Arc<Self>, reason: CancelReason) -> bool {
        self.assert_magic();
        if self
            .cancellation_reason
            .compare_exchange(0, reason.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(task = %self.id, %reason, "task cancellation requested");
            self.processor.counters().account_cancel_requested();
            self.wakeup(WakeupSource::CancelRequest);
            true
        } else {
            false
        }
    }

    pub(crate) fn cancellation_reason(&self) -> Option<CancelReason> {
        CancelReason::from_u8(self.cancellation_reason.load(Ordering::Acquire))
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancellation_reason.load(Ordering::Acquire) != 0
    }

    pub(crate) fn is_cancellable(&self) -> bool {
        self.is_cancellable.load(Ordering::Relaxed)
    }

    /// Sets cancellability, returning the previous value.
    pub(crate) fn set_cancellable(&self, value: bool) -> bool {
        self.is_cancellable.swap(value, Ordering::Relaxed)
    }

    /// True if cancellation was requested and is currently deliverable.
    pub(crate) fn should_cancel(&self) -> bool {
        self.is_cancel_requested() && self.is_cancellable()
    }

    // === Payload and local storage ===

    pub(crate) fn take_payload(&self) -> Option<Payload> {
        self.payload.lock().expect("payload slot poisoned").take()
    }

    pub(crate) fn install_local_storage(&self) {
        let mut slot = self.local_storage.lock().expect("local storage poisoned");
        debug_assert!(slot.is_none());
        *slot = Some(LocalStorage::new());
    }

    pub(crate) fn remove_local_storage(&self) -> Option<LocalStorage> {
        self.local_storage
            .lock()
            .expect("local storage poisoned")
            .take()
    }

    pub(crate) fn with_local_storage<R>(&self, f: impl FnOnce(&mut LocalStorage) -> R) -> R {
        let mut slot = self.local_storage.lock().expect("local storage poisoned");
        let storage = slot
            .as_mut()
            .expect("task local storage accessed outside of payload execution");
        f(storage)
    }

    // === State machine ===

    /// Transitions the lifecycle state.
    ///
    /// Worker-local transitions (`Running`, `Suspended`, `Queued`) use
    /// relaxed stores; they are serialised by a preceding sequentially
    /// consistent `sleep_state` operation or by the run-queue handoff.
    /// Terminal transitions use a strong CAS so a finished state is never
    /// lost, and terminal states are absorbing.
    pub(crate) fn set_state(&self, new_state: TaskState) {
        use TaskState::{Cancelled, Completed, Queued, Running, Suspended};

        match new_state {
            Running | Suspended | Queued => {
                self.state.store(new_state.as_u8(), Ordering::Relaxed);
            }
            Completed | Cancelled => {
                let mut current = Running.as_u8();
                loop {
                    match self.state.compare_exchange(
                        current,
                        new_state.as_u8(),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => break,
                        Err(observed) => {
                            if observed == new_state.as_u8()
                                || TaskState::from_u8(observed).is_finished()
                            {
                                // Someone else finished the task; leave it.
                                return;
                            }
                            current = observed;
                        }
                    }
                }
                self.finish_waiters.wake_all();
                self.finish_signal.notify();
            }
            TaskState::New | TaskState::Invalid => {
                unreachable!("invalid target task state {new_state:?}")
            }
        }
    }

    // === Scheduling ===

    /// Puts the context on its processor's run queue.
    pub(crate) fn schedule(self: &Arc<Self>) {
        debug_assert!(self.state() != TaskState::Queued);
        self.set_state(TaskState::Queued);
        self.trace_state_transition(TaskState::Queued);
        self.processor.schedule(Arc::clone(self));
    }

    /// The pure at-most-once-reschedule decision.
    ///
    /// Returns true only for the first wakeup of a parked task; all callers
    /// are serialised by the seq-cst fetch-or that produced `prev`.
    pub(crate) fn should_schedule(prev: FlagSet<SleepFlag>, source: WakeupSource) -> bool {
        if !prev.contains(SleepFlag::Sleeping) {
            return false;
        }

        match source {
            // A cancellation wake loses to any other pending wake and to a
            // non-cancellable sleeper.
            WakeupSource::CancelRequest => prev == FlagSet::from(SleepFlag::Sleeping),
            WakeupSource::Bootstrap => true,
            _ => {
                let mut prev = prev;
                if prev.contains(SleepFlag::NonCancellable) {
                    // A blocked cancellation request does not count as a
                    // pending wake; we may still be first.
                    prev = prev.cleared(
                        FlagSet::from(SleepFlag::NonCancellable) | SleepFlag::WakeupByCancelRequest,
                    );
                }
                prev == FlagSet::from(SleepFlag::Sleeping)
            }
        }
    }

    /// Marks a wakeup from `source` and schedules the task if this call is
    /// the first to observe it sleeping.
    ///
    /// The flag is set even when the task is not parked: the task may be
    /// between switching out and setting `Sleeping` (the parking fetch-or
    /// will observe the flag), or already awake with its pre-awake work
    /// unfinished (the second `sleep_state` clear drops the stale flag).
    pub(crate) fn wakeup(self: &Arc<Self>, source: WakeupSource) {
        self.assert_magic();
        if self.is_finished() {
            return;
        }
        if source == WakeupSource::CancelRequest
            && self
                .sleep_state
                .load(Ordering::SeqCst)
                .contains(SleepFlag::NonCancellable)
        {
            return;
        }

        let prev = self
            .sleep_state
            .fetch_or(FlagSet::from(source.flag()), Ordering::SeqCst);
        if Self::should_schedule(prev, source) {
            self.schedule();
        }
    }

    fn primary_wakeup_source(flags: FlagSet<SleepFlag>) -> WakeupSource {
        const ORDERED: [(SleepFlag, WakeupSource); 3] = [
            (SleepFlag::WakeupByWaitList, WakeupSource::WaitList),
            (SleepFlag::WakeupByDeadlineTimer, WakeupSource::DeadlineTimer),
            (SleepFlag::WakeupByBootstrap, WakeupSource::Bootstrap),
        ];
        for (flag, source) in ORDERED {
            if flags.contains(flag) {
                return source;
            }
        }
        if flags.contains(SleepFlag::WakeupByCancelRequest)
            && !flags.contains(SleepFlag::NonCancellable)
        {
            return WakeupSource::CancelRequest;
        }
        panic!("no valid wakeup source in sleep state {flags:?}");
    }

    /// The primary source of the task's most recent wakeup.
    fn wakeup_source(&self) -> Option<WakeupSource> {
        match self.wakeup_source.load(Ordering::Relaxed) {
            1 => Some(WakeupSource::WaitList),
            2 => Some(WakeupSource::DeadlineTimer),
            3 => Some(WakeupSource::CancelRequest),
            4 => Some(WakeupSource::Bootstrap),
            _ => None,
        }
    }

    fn store_wakeup_source(&self, source: WakeupSource) {
        let value = match source {
            WakeupSource::WaitList => 1,
            WakeupSource::DeadlineTimer => 2,
            WakeupSource::CancelRequest => 3,
            WakeupSource::Bootstrap => 4,
        };
        self.wakeup_source.store(value, Ordering::Relaxed);
    }

    // === Suspension ===

    /// Suspends the current task until a wakeup arrives.
    ///
    /// Must be called on the task's own coroutine thread. Returns the
    /// primary wakeup source, by priority `WaitList > DeadlineTimer >
    /// Bootstrap > CancelRequest` (a blocked cancellation is ignored).
    pub(crate) fn sleep(self: &Arc<Self>, strategy: Arc<dyn WaitStrategy>) -> WakeupSource {
        debug_assert!(
            current::try_context().is_some_and(|ctx| Arc::ptr_eq(&ctx, self)),
            "sleep called off the task's own thread"
        );
        debug_assert!(self.state() == TaskState::Running);

        // A hook may re-enter sleep (e.g. a condvar-style primitive locking
        // in before_awake), so the previous strategy is kept on this stack.
        let old_manager = self
            .wait_manager
            .lock()
            .expect("wait manager poisoned")
            .replace(Arc::clone(&strategy));

        let mut deadline_timer: Option<TimerHandle> = None;
        match strategy.deadline() {
            Deadline::At(when) => {
                if when > Instant::now() {
                    deadline_timer =
                        Some(self.processor.timer().schedule(Arc::clone(self), when));
                } else {
                    self.wakeup(WakeupSource::DeadlineTimer);
                }
            }
            Deadline::Passed => self.wakeup(WakeupSource::DeadlineTimer),
            Deadline::Unreachable => {}
        }

        self.trace_state_transition(TaskState::Suspended);
        let pipe = self
            .coro
            .lock()
            .expect("coro slot poisoned")
            .as_ref()
            .expect("sleeping task has no coroutine")
            .pipe();
        // The switch: control moves to the worker's do_step and comes back
        // here once this context is stepped again.
        let resumed = pipe.switch_out(YieldReason::TaskWaiting);
        debug_assert!(Arc::ptr_eq(&resumed, self));
        self.trace_state_transition(TaskState::Running);

        if let Some(timer) = deadline_timer {
            timer.cancel();
        }

        if !self
            .sleep_state
            .load(Ordering::Acquire)
            .contains(SleepFlag::WakeupByWaitList)
        {
            if let Some(wait_list) = strategy.wait_list() {
                wait_list.remove(self);
            }
        }

        // Clear sleep_state now: before_awake below may sleep again. A plain
        // load + store is enough here; seq-cst RMW is reserved for the
        // parking and wake paths.
        let old_sleep_state = self.sleep_state.load(Ordering::Acquire);
        self.sleep_state.store(FlagSet::empty(), Ordering::Relaxed);

        let source = Self::primary_wakeup_source(old_sleep_state);
        self.store_wakeup_source(source);

        strategy.before_awake();
        *self.wait_manager.lock().expect("wait manager poisoned") = old_manager;

        // Clear again: a timer firing during the wake path may have set a
        // stale flag; those racy wakers never scheduled us (no Sleeping bit)
        // and must not leak into the next suspension.
        self.sleep_state.store(FlagSet::empty(), Ordering::Relaxed);

        source
    }

    // === Stepping ===

    /// Runs one step of the task on a worker thread: acquires a coroutine
    /// if needed, switches into the task, and dispatches on the yield
    /// reason, either finishing the task or parking it.
    pub(crate) fn do_step(self: &Arc<Self>) {
        self.assert_magic();
        if self.is_finished() {
            return;
        }

        let mut clear_flags = FlagSet::from(SleepFlag::Sleeping);
        {
            let mut coro = self.coro.lock().expect("coro slot poisoned");
            if coro.is_none() {
                *coro = Some(self.processor.coro_pool().acquire());
                clear_flags |= SleepFlag::WakeupByBootstrap;
                self.processor.counters().account_started();
            }
        }
        // Non-atomic load + store: losing a spurious wakeup flag here is
        // harmless, the task is about to run anyway.
        let new_sleep_state = self.sleep_state.load(Ordering::Relaxed).cleared(clear_flags);
        self.sleep_state.store(new_sleep_state, Ordering::Relaxed);

        self.set_state(TaskState::Running);
        self.trace_state_transition(TaskState::Running);

        let pipe = self
            .coro
            .lock()
            .expect("coro slot poisoned")
            .as_ref()
            .expect("coroutine missing after acquire")
            .pipe();
        let step_started = Instant::now();
        let yield_reason = pipe.run(Arc::clone(self));
        self.profiler_check(step_started);

        if yield_reason == YieldReason::TaskWaiting {
            let strategy = self
                .wait_manager
                .lock()
                .expect("wait manager poisoned")
                .clone();
            if let Some(strategy) = strategy {
                strategy.after_asleep();
            }
        }

        match yield_reason {
            YieldReason::TaskComplete | YieldReason::TaskCancelled => {
                let coro = self
                    .coro
                    .lock()
                    .expect("coro slot poisoned")
                    .take()
                    .expect("coroutine missing at completion");
                self.processor.coro_pool().release(coro);

                let new_state = if yield_reason == YieldReason::TaskComplete {
                    self.processor.counters().account_completed();
                    TaskState::Completed
                } else {
                    self.processor.counters().account_cancelled();
                    TaskState::Cancelled
                };
                self.set_state(new_state);
                self.trace_state_transition(new_state);
            }
            YieldReason::TaskWaiting => {
                self.set_state(TaskState::Suspended);

                let mut new_flags = FlagSet::from(SleepFlag::Sleeping);
                if !self.is_cancellable() {
                    new_flags |= SleepFlag::NonCancellable;
                }
                // Synchronization point for the relaxed state stores above.
                let mut prev = self.sleep_state.fetch_or(new_flags, Ordering::SeqCst);
                debug_assert!(!prev.contains(SleepFlag::Sleeping));
                if new_flags.contains(SleepFlag::NonCancellable) {
                    prev = prev.cleared(
                        FlagSet::from(SleepFlag::WakeupByCancelRequest) | SleepFlag::NonCancellable,
                    );
                }
                if !prev.is_empty() {
                    // A waker beat the parking fetch-or; the wake is ours.
                    self.schedule();
                }
            }
        }
    }

    fn profiler_check(&self, step_started: Instant) {
        if let Some(threshold) = self.processor.config().profiler_threshold {
            let elapsed = step_started.elapsed();
            if elapsed >= threshold {
                tracing::warn!(
                    task = %self.id,
                    elapsed_us = elapsed.as_micros() as u64,
                    threshold_us = threshold.as_micros() as u64,
                    "task ran too long without a context switch"
                );
            }
        }
    }

    fn trace_state_transition(&self, state: TaskState) {
        let budget_left = self
            .trace_csw_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| {
                (left > 0).then(|| left - 1)
            });
        if budget_left.is_ok() {
            tracing::trace!(task = %self.id, state = state.name(), "task changed state");
        }
    }

    // === Finish waiting ===

    pub(crate) fn finish_waiters(&self) -> &crate::wait::WaitListLight {
        &self.finish_waiters
    }

    /// Blocks until the task finishes or the deadline expires. Works both
    /// from inside a task (wait protocol) and from a plain thread (condvar).
    pub(crate) fn wait_finished_until(self: &Arc<Self>, deadline: Deadline) -> bool {
        if self.is_finished() {
            return true;
        }
        match current::try_context() {
            Some(waiter) => {
                assert!(
                    !Arc::ptr_eq(&waiter, self),
                    "a task cannot wait for itself to finish"
                );
                loop {
                    if self.is_finished() {
                        return true;
                    }
                    if deadline.is_reached() || waiter.should_cancel() {
                        return false;
                    }
                    let strategy = Arc::new(FinishWaitStrategy {
                        deadline,
                        target: Arc::clone(self),
                        waiter: Arc::clone(&waiter),
                    });
                    waiter.sleep(strategy);
                }
            }
            None => self.finish_signal.wait_until(deadline),
        }
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        tracing::trace!(task = %self.id, "task context dropped");
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("critical", &self.is_critical)
            .field("cancel_requested", &self.is_cancel_requested())
            .field("wakeup_source", &self.wakeup_source())
            .finish_non_exhaustive()
    }
}

/// Wait strategy for joining another task, registered in the target's
/// single-slot finish list.
struct FinishWaitStrategy {
    deadline: Deadline,
    target: Arc<TaskContext>,
    waiter: Arc<TaskContext>,
}

impl WaitStrategy for FinishWaitStrategy {
    fn deadline(&self) -> Deadline {
        self.deadline
    }

    fn wait_list(&self) -> Option<&dyn crate::wait::WaitListRef> {
        Some(self.target.finish_waiters())
    }

    fn after_asleep(&self) {
        self.target.finish_waiters().set(Arc::clone(&self.waiter));
        if self.target.is_finished() {
            self.target.finish_waiters().wake_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(items: &[SleepFlag]) -> FlagSet<SleepFlag> {
        let mut set = FlagSet::empty();
        for &item in items {
            set |= item;
        }
        set
    }

    #[test]
    fn should_schedule_requires_sleeping() {
        assert!(!TaskContext::should_schedule(
            FlagSet::empty(),
            WakeupSource::WaitList
        ));
        assert!(!TaskContext::should_schedule(
            flags(&[SleepFlag::WakeupByDeadlineTimer]),
            WakeupSource::WaitList
        ));
    }

    #[test]
    fn first_waker_wins_second_loses() {
        let parked = flags(&[SleepFlag::Sleeping]);
        assert!(TaskContext::should_schedule(parked, WakeupSource::WaitList));

        // After the first wake the flag word carries the winner's bit.
        let after_first = flags(&[SleepFlag::Sleeping, SleepFlag::WakeupByWaitList]);
        assert!(!TaskContext::should_schedule(
            after_first,
            WakeupSource::DeadlineTimer
        ));
        assert!(!TaskContext::should_schedule(
            after_first,
            WakeupSource::CancelRequest
        ));
    }

    #[test]
    fn cancel_wake_loses_to_any_pending_wake() {
        let with_timer = flags(&[SleepFlag::Sleeping, SleepFlag::WakeupByDeadlineTimer]);
        assert!(!TaskContext::should_schedule(
            with_timer,
            WakeupSource::CancelRequest
        ));

        let only_sleeping = flags(&[SleepFlag::Sleeping]);
        assert!(TaskContext::should_schedule(
            only_sleeping,
            WakeupSource::CancelRequest
        ));
    }

    #[test]
    fn bootstrap_always_schedules_a_sleeper() {
        let parked = flags(&[SleepFlag::Sleeping, SleepFlag::WakeupByCancelRequest]);
        assert!(TaskContext::should_schedule(parked, WakeupSource::Bootstrap));
    }

    #[test]
    fn blocked_cancel_does_not_count_as_pending_wake() {
        // Non-cancellable sleeper with a blocked cancel request: a real
        // waker is still "first".
        let parked = flags(&[
            SleepFlag::Sleeping,
            SleepFlag::NonCancellable,
            SleepFlag::WakeupByCancelRequest,
        ]);
        assert!(TaskContext::should_schedule(parked, WakeupSource::WaitList));
    }

    #[test]
    fn primary_source_priority() {
        let all = flags(&[
            SleepFlag::WakeupByWaitList,
            SleepFlag::WakeupByDeadlineTimer,
            SleepFlag::WakeupByBootstrap,
            SleepFlag::WakeupByCancelRequest,
        ]);
        assert_eq!(
            TaskContext::primary_wakeup_source(all),
            WakeupSource::WaitList
        );

        let timer_and_cancel = flags(&[
            SleepFlag::WakeupByDeadlineTimer,
            SleepFlag::WakeupByCancelRequest,
        ]);
        assert_eq!(
            TaskContext::primary_wakeup_source(timer_and_cancel),
            WakeupSource::DeadlineTimer
        );

        let cancel_only = flags(&[SleepFlag::WakeupByCancelRequest]);
        assert_eq!(
            TaskContext::primary_wakeup_source(cancel_only),
            WakeupSource::CancelRequest
        );
    }

    #[test]
    fn blocked_cancel_is_never_the_primary_source() {
        let blocked = flags(&[
            SleepFlag::WakeupByCancelRequest,
            SleepFlag::NonCancellable,
            SleepFlag::WakeupByDeadlineTimer,
        ]);
        assert_eq!(
            TaskContext::primary_wakeup_source(blocked),
            WakeupSource::DeadlineTimer
        );
    }
}
