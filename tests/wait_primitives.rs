//! Semaphore and event primitives under the task wait protocol.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use strand::sync::{Semaphore, SingleConsumerEvent};
use strand::test_utils::init_test_logging;
use strand::{current, Deadline, TaskProcessor, WaitOutcome};

fn processor(name: &str) -> TaskProcessor {
    TaskProcessor::builder()
        .worker_threads(2)
        .thread_name_prefix(name)
        .build()
}

#[test]
fn semaphore_acquire_times_out_close_to_the_deadline() {
    init_test_logging();
    let processor = processor("sem-timeout");
    let semaphore = Semaphore::new(1);
    assert!(semaphore.try_lock_shared());

    let observed = Arc::new(Mutex::new(None));
    let observed_clone = Arc::clone(&observed);
    let sem_clone = semaphore.clone();
    let handle = processor.spawn(move || {
        let started = Instant::now();
        let acquired =
            sem_clone.try_lock_shared_until(Deadline::from_duration(Duration::from_millis(200)));
        *observed_clone.lock().unwrap() = Some((acquired, started.elapsed()));
        Ok(())
    });

    assert_eq!(handle.wait(), WaitOutcome::Ok);
    let (acquired, elapsed) = observed.lock().unwrap().take().expect("acquire ran");
    assert!(!acquired);
    assert!(elapsed >= Duration::from_millis(200), "early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "late: {elapsed:?}");
    semaphore.unlock_shared();
}

#[test]
fn released_token_wakes_a_blocked_acquirer() {
    init_test_logging();
    let processor = processor("sem-handoff");
    let semaphore = Semaphore::new(1);

    let holder_sem = semaphore.clone();
    let holder = processor.spawn(move || {
        assert!(holder_sem.try_lock_shared());
        current::sleep_for(Duration::from_millis(50))?;
        holder_sem.unlock_shared();
        Ok(())
    });

    // Give the holder time to take the token.
    thread::sleep(Duration::from_millis(20));

    let observed = Arc::new(Mutex::new(None));
    let observed_clone = Arc::clone(&observed);
    let waiter_sem = semaphore.clone();
    let waiter = processor.spawn(move || {
        let acquired =
            waiter_sem.try_lock_shared_until(Deadline::from_duration(Duration::from_secs(2)));
        if acquired {
            waiter_sem.unlock_shared();
        }
        *observed_clone.lock().unwrap() = Some(acquired);
        Ok(())
    });

    assert_eq!(holder.wait(), WaitOutcome::Ok);
    assert_eq!(waiter.wait(), WaitOutcome::Ok);
    assert_eq!(*observed.lock().unwrap(), Some(true));
    assert_eq!(semaphore.available_approx(), 1);
}

#[test]
fn bulk_release_wakes_a_bulk_acquirer() {
    init_test_logging();
    let processor = processor("sem-bulk");
    let semaphore = Semaphore::new(4);
    assert!(semaphore.try_lock_shared_count(4));

    let observed = Arc::new(Mutex::new(None));
    let observed_clone = Arc::clone(&observed);
    let sem_clone = semaphore.clone();
    let waiter = processor.spawn(move || {
        let acquired = sem_clone
            .try_lock_shared_until_count(Deadline::from_duration(Duration::from_secs(2)), 3);
        *observed_clone.lock().unwrap() = Some(acquired);
        Ok(())
    });

    thread::sleep(Duration::from_millis(50));
    semaphore.unlock_shared_count(4);

    assert_eq!(waiter.wait(), WaitOutcome::Ok);
    assert_eq!(*observed.lock().unwrap(), Some(true));
    assert_eq!(semaphore.available_approx(), 1);
}

#[test]
fn event_send_wakes_the_waiting_task() {
    init_test_logging();
    let processor = processor("event-wake");
    let event = SingleConsumerEvent::new();

    let observed = Arc::new(Mutex::new(None));
    let observed_clone = Arc::clone(&observed);
    let event_clone = event.clone();
    let handle = processor.spawn(move || {
        let woken = event_clone.wait_until(Deadline::from_duration(Duration::from_secs(2)));
        *observed_clone.lock().unwrap() = Some(woken);
        Ok(())
    });

    thread::sleep(Duration::from_millis(50));
    event.send();

    assert_eq!(handle.wait(), WaitOutcome::Ok);
    assert_eq!(*observed.lock().unwrap(), Some(true));
}

#[test]
fn event_wait_times_out_without_a_signal() {
    init_test_logging();
    let processor = processor("event-timeout");
    let event = SingleConsumerEvent::new();

    let observed = Arc::new(Mutex::new(None));
    let observed_clone = Arc::clone(&observed);
    let event_clone = event.clone();
    let handle = processor.spawn(move || {
        let started = Instant::now();
        let woken = event_clone.wait_until(Deadline::from_duration(Duration::from_millis(80)));
        *observed_clone.lock().unwrap() = Some((woken, started.elapsed()));
        Ok(())
    });

    assert_eq!(handle.wait(), WaitOutcome::Ok);
    let (woken, elapsed) = observed.lock().unwrap().take().expect("wait ran");
    assert!(!woken);
    assert!(elapsed >= Duration::from_millis(80), "early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "late: {elapsed:?}");

    // A signal sent after the timeout is picked up by the next wait.
    event.send();
    assert!(event.try_wait());
}
