//! Cancellation: delivery, pre-run termination, non-cancellable scopes,
//! overload admission control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use strand::test_utils::init_test_logging;
use strand::{current, CancelReason, Deadline, TaskProcessor, TaskState, WaitOutcome};

/// A processor with one worker, plus a task keeping that worker busy until
/// the returned barrier is released. Lets tests act on queued-but-unstarted
/// tasks deterministically.
fn blocked_single_worker(name: &str) -> (TaskProcessor, Arc<Barrier>, strand::TaskHandle) {
    let processor = TaskProcessor::builder()
        .worker_threads(1)
        .thread_name_prefix(name)
        .build();
    let barrier = Arc::new(Barrier::new(2));
    let blocker_barrier = Arc::clone(&barrier);
    let blocker = processor.spawn(move || {
        blocker_barrier.wait();
        Ok(())
    });
    // Make sure the blocker occupies the worker before the caller spawns.
    let deadline = Instant::now() + Duration::from_secs(2);
    while processor.counters().started() == 0 {
        assert!(Instant::now() < deadline, "blocker never started");
        thread::sleep(Duration::from_millis(2));
    }
    (processor, barrier, blocker)
}

#[test]
fn pre_run_cancel_skips_the_payload() {
    init_test_logging();
    let (processor, barrier, blocker) = blocked_single_worker("cancel-prerun");
    let entered = Arc::new(AtomicBool::new(false));

    let entered_clone = Arc::clone(&entered);
    let handle = processor.spawn(move || {
        entered_clone.store(true, Ordering::Release);
        Ok(())
    });
    assert!(handle.cancel(CancelReason::UserRequest));

    barrier.wait();
    assert_eq!(blocker.wait(), WaitOutcome::Ok);
    assert_eq!(handle.wait(), WaitOutcome::Ok);

    assert_eq!(handle.state(), TaskState::Cancelled);
    assert!(!entered.load(Ordering::Acquire), "payload must not run");
    assert_eq!(handle.cancellation_reason(), Some(CancelReason::UserRequest));
}

#[test]
fn pre_run_cancel_still_enters_a_critical_payload() {
    init_test_logging();
    let (processor, barrier, blocker) = blocked_single_worker("cancel-critical");
    let observed = Arc::new(Mutex::new(None));

    let observed_clone = Arc::clone(&observed);
    let handle = processor.spawn_critical(move || {
        *observed_clone.lock().unwrap() = Some(current::should_cancel());
        Ok(())
    });
    assert!(handle.cancel(CancelReason::UserRequest));

    barrier.wait();
    assert_eq!(blocker.wait(), WaitOutcome::Ok);
    assert_eq!(handle.wait(), WaitOutcome::Ok);

    assert_eq!(*observed.lock().unwrap(), Some(true));
}

#[test]
fn cancellation_reason_is_monotonic() {
    init_test_logging();
    let (processor, barrier, blocker) = blocked_single_worker("cancel-monotonic");

    let handle = processor.spawn(|| Ok(()));
    assert!(handle.cancel(CancelReason::UserRequest));
    assert!(!handle.cancel(CancelReason::Shutdown));
    assert_eq!(handle.cancellation_reason(), Some(CancelReason::UserRequest));

    barrier.wait();
    assert_eq!(blocker.wait(), WaitOutcome::Ok);
    assert_eq!(handle.wait(), WaitOutcome::Ok);
    assert_eq!(handle.cancellation_reason(), Some(CancelReason::UserRequest));
}

#[test]
fn cancel_interrupts_a_sleeping_task() {
    init_test_logging();
    let processor = TaskProcessor::builder()
        .worker_threads(2)
        .thread_name_prefix("cancel-sleep")
        .build();
    let outcome = Arc::new(Mutex::new(None));

    let outcome_clone = Arc::clone(&outcome);
    let started = Instant::now();
    let handle = processor.spawn(move || {
        let result = current::sleep_for(Duration::from_secs(30));
        *outcome_clone.lock().unwrap() =
            Some(result.clone().err().and_then(|err| err.cancellation_reason()));
        result
    });

    thread::sleep(Duration::from_millis(50));
    assert!(handle.cancel(CancelReason::UserRequest));
    assert_eq!(handle.wait(), WaitOutcome::Ok);

    assert!(started.elapsed() < Duration::from_secs(5), "cancel was lost");
    assert_eq!(handle.state(), TaskState::Cancelled);
    assert_eq!(*outcome.lock().unwrap(), Some(Some(CancelReason::UserRequest)));
}

#[test]
fn non_cancellable_scope_defers_delivery() {
    init_test_logging();
    let processor = TaskProcessor::builder()
        .worker_threads(2)
        .thread_name_prefix("cancel-scope")
        .build();

    let entered = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(Mutex::new(None));

    let entered_clone = Arc::clone(&entered);
    let observed_clone = Arc::clone(&observed);
    let handle = processor.spawn(move || {
        let slept;
        {
            let _guard = current::NonCancellableGuard::new();
            entered_clone.store(true, Ordering::Release);
            let started = Instant::now();
            let sleep_result = current::sleep_for(Duration::from_millis(200));
            slept = (sleep_result.is_ok(), started.elapsed());
        }
        // The pending cancellation is delivered at the next suspension.
        let yield_result = current::yield_now();
        let yield_reason = yield_result
            .as_ref()
            .err()
            .and_then(|err| err.cancellation_reason());
        *observed_clone.lock().unwrap() = Some((slept, yield_reason));
        yield_result
    });

    let deadline = Instant::now() + Duration::from_secs(2);
    while !entered.load(Ordering::Acquire) {
        assert!(Instant::now() < deadline, "task never entered the scope");
        thread::sleep(Duration::from_millis(2));
    }
    thread::sleep(Duration::from_millis(50));
    assert!(handle.cancel(CancelReason::UserRequest));

    assert_eq!(handle.wait(), WaitOutcome::Ok);
    assert_eq!(handle.state(), TaskState::Cancelled);

    let ((sleep_ok, slept_for), yield_reason) =
        observed.lock().unwrap().expect("task reported its run");
    assert!(sleep_ok, "sleep inside the scope must finish normally");
    assert!(
        slept_for >= Duration::from_millis(200),
        "sleep was cut short: {slept_for:?}"
    );
    assert_eq!(yield_reason, Some(CancelReason::UserRequest));
}

#[test]
fn overload_rejects_non_critical_tasks() {
    init_test_logging();
    let processor = TaskProcessor::builder()
        .worker_threads(1)
        .overload_queue_size(1)
        .thread_name_prefix("cancel-overload")
        .build();

    let barrier = Arc::new(Barrier::new(2));
    let blocker_barrier = Arc::clone(&barrier);
    let blocker = processor.spawn(move || {
        blocker_barrier.wait();
        Ok(())
    });
    let deadline = Instant::now() + Duration::from_secs(2);
    while processor.counters().started() == 0 {
        assert!(Instant::now() < deadline, "blocker never started");
        thread::sleep(Duration::from_millis(2));
    }

    // Queue: admitted fills slot 0, the rest exceed the limit.
    let admitted = processor.spawn(|| Ok(()));
    let rejected_a = processor.spawn(|| Ok(()));
    let rejected_b = processor.spawn(|| Ok(()));
    // Critical tasks are immune to overload rejection.
    let critical = processor.spawn_critical(|| Ok(()));

    barrier.wait();
    assert_eq!(blocker.wait(), WaitOutcome::Ok);
    for handle in [&admitted, &rejected_a, &rejected_b, &critical] {
        assert_eq!(handle.wait(), WaitOutcome::Ok);
    }

    assert_eq!(admitted.state(), TaskState::Completed);
    assert_eq!(rejected_a.state(), TaskState::Cancelled);
    assert_eq!(rejected_a.cancellation_reason(), Some(CancelReason::Overload));
    assert_eq!(rejected_b.state(), TaskState::Cancelled);
    assert_eq!(critical.state(), TaskState::Completed);
    assert!(processor.counters().overload_cancellations() >= 2);
}

#[test]
fn dropping_a_handle_cancels_and_joins() {
    init_test_logging();
    let processor = TaskProcessor::builder()
        .worker_threads(2)
        .thread_name_prefix("cancel-abandon")
        .build();

    let handle = processor.spawn(|| current::sleep_until(Deadline::Unreachable));
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    drop(handle);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "abandoned task was not cancelled promptly"
    );
    assert_eq!(processor.counters().cancelled(), 1);
}
