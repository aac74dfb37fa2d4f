//! Bounded multi-role handoff queue.
//!
//! [`HandoffQueue`] is a bounded producer/consumer queue parameterised by
//! `MULTI_PRODUCER` and `MULTI_CONSUMER`. Capacity and the liveness of each
//! side are expressed as gates that interoperate with the task runtime's
//! sleep facility: a push consumes a capacity token and releases an element
//! token, a pop does the reverse, so producers block when the queue is full
//! and consumers when it is empty.
//!
//! On a single-producer or single-consumer side the gate degenerates to a
//! [`SingleConsumerEvent`] plus an integral counter; on a multi side it is a
//! counting [`Semaphore`] backed by the task wait list.
//!
//! A single producer's values are observed in push order (the inner queue is
//! FIFO per producer); across producers no order is guaranteed, hence the
//! `NonFifo` aliases for the multi-consumer variants.

use std::fmt;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::sync::{Semaphore, SingleConsumerEvent};
use crate::task::current;
use crate::time::Deadline;

/// Side counter value meaning "handles of this side existed and all have
/// been dropped".
const CREATED_AND_DEAD: usize = usize::MAX;

/// Internal capacity clamp; "unbounded" is this value internally and `None`
/// at the API surface.
const MAX_CAPACITY: usize = usize::MAX / 2;

/// Error returned by a blocking push; carries the unsent value.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    /// The consumer side dropped all of its handles.
    Closed(T),
    /// The deadline expired while the queue stayed full.
    TimedOut(T),
    /// The pushing task was cancelled.
    Interrupted(T),
}

impl<T> PushError<T> {
    /// Returns the value that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value) | Self::TimedOut(value) | Self::Interrupted(value) => value,
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => write!(f, "pushing to a queue with no consumers"),
            Self::TimedOut(_) => write!(f, "deadline expired while the queue was full"),
            Self::Interrupted(_) => write!(f, "push interrupted by task cancellation"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for PushError<T> {}

/// Error returned by a non-blocking push; carries the unsent value.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError<T> {
    /// The consumer side dropped all of its handles.
    Closed(T),
    /// The queue is at capacity.
    Full(T),
}

impl<T> TryPushError<T> {
    /// Returns the value that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value) | Self::Full(value) => value,
        }
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => write!(f, "pushing to a queue with no consumers"),
            Self::Full(_) => write!(f, "queue is full"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryPushError<T> {}

/// Error returned by a blocking pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PopError {
    /// The producer side dropped all of its handles and the queue is drained.
    #[error("popping from a queue with no producers")]
    Closed,
    /// The deadline expired while the queue stayed empty.
    #[error("deadline expired while the queue was empty")]
    TimedOut,
    /// The popping task was cancelled.
    #[error("pop interrupted by task cancellation")]
    Interrupted,
}

/// Error returned by a non-blocking pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryPopError {
    /// The producer side dropped all of its handles and the queue is drained.
    #[error("popping from a queue with no producers")]
    Closed,
    /// The queue is empty.
    #[error("queue is empty")]
    Empty,
}

fn interrupted_by_current_task() -> crate::Error {
    let reason = current::try_context().and_then(|ctx| ctx.cancellation_reason());
    match reason {
        Some(reason) => crate::Error::interrupted(reason),
        None => crate::Error::new(crate::ErrorKind::Interrupted),
    }
}

impl<T> From<PushError<T>> for crate::Error {
    fn from(error: PushError<T>) -> Self {
        match error {
            PushError::Closed(_) => Self::queue_closed(),
            PushError::TimedOut(_) => Self::timed_out(),
            PushError::Interrupted(_) => interrupted_by_current_task(),
        }
    }
}

impl<T> From<TryPushError<T>> for crate::Error {
    fn from(error: TryPushError<T>) -> Self {
        match error {
            TryPushError::Closed(_) => Self::queue_closed(),
            TryPushError::Full(_) => Self::timed_out(),
        }
    }
}

impl From<PopError> for crate::Error {
    fn from(error: PopError) -> Self {
        match error {
            PopError::Closed => Self::queue_closed(),
            PopError::TimedOut => Self::timed_out(),
            PopError::Interrupted => interrupted_by_current_task(),
        }
    }
}

impl From<TryPopError> for crate::Error {
    fn from(error: TryPopError) -> Self {
        match error {
            TryPopError::Closed => Self::queue_closed(),
            TryPopError::Empty => Self::timed_out(),
        }
    }
}

/// A single-side gate: an integral token counter plus a wakeup event.
///
/// The counter is signed so that a capacity shrink below the current queue
/// size drives it negative, blocking pushes until the queue drains below the
/// new bound.
#[derive(Debug)]
struct SingleGate {
    tokens: AtomicIsize,
    event: SingleConsumerEvent,
}

impl SingleGate {
    fn new(tokens: usize) -> Self {
        Self {
            tokens: AtomicIsize::new(isize::try_from(tokens).unwrap_or(isize::MAX)),
            event: SingleConsumerEvent::new(),
        }
    }

    fn try_take_token(&self) -> bool {
        let mut tokens = self.tokens.load(Ordering::Acquire);
        loop {
            if tokens <= 0 {
                return false;
            }
            match self.tokens.compare_exchange_weak(
                tokens,
                tokens - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => tokens = observed,
            }
        }
    }

    fn give_tokens(&self, count: usize) {
        self.tokens
            .fetch_add(isize::try_from(count).unwrap_or(isize::MAX), Ordering::AcqRel);
        self.event.send();
    }

    fn remove_tokens(&self, count: usize) {
        self.tokens
            .fetch_sub(isize::try_from(count).unwrap_or(isize::MAX), Ordering::AcqRel);
    }

    fn approx(&self) -> usize {
        usize::try_from(self.tokens.load(Ordering::Relaxed)).unwrap_or(0)
    }
}

/// A capacity or element gate, single-waiter or semaphore-backed.
#[derive(Debug)]
enum Gate {
    Single(SingleGate),
    Multi(Semaphore),
}

impl Gate {
    fn new(multi: bool, tokens: usize) -> Self {
        if multi {
            Self::Multi(Semaphore::new(tokens))
        } else {
            Self::Single(SingleGate::new(tokens))
        }
    }

    /// One token arrives (element pushed / element popped on the opposite
    /// side).
    fn release_one(&self) {
        match self {
            Self::Single(gate) => gate.give_tokens(1),
            Self::Multi(semaphore) => semaphore.unlock_shared(),
        }
    }

    fn add_tokens(&self, count: usize) {
        match self {
            Self::Single(gate) => gate.give_tokens(count),
            Self::Multi(semaphore) => semaphore.unlock_shared_count(count),
        }
    }

    /// Removes tokens; on the multi side this blocks until the tokens can
    /// actually be reclaimed.
    fn reclaim_tokens(&self, count: usize) {
        match self {
            Self::Single(gate) => gate.remove_tokens(count),
            Self::Multi(semaphore) => {
                let _ = semaphore.try_lock_shared_until_count(Deadline::Unreachable, count);
            }
        }
    }

    /// Unblocks this side after the opposite side died: waiters must fail
    /// out instead of sleeping until their deadline.
    fn open_after_peer_death(&self) {
        match self {
            // The single waiter re-checks liveness after the wakeup; no
            // token flood is needed (and the counter stays accurate).
            Self::Single(gate) => gate.event.send(),
            Self::Multi(semaphore) => semaphore.force_open(),
        }
    }

    /// Undoes [`Self::open_after_peer_death`] when the dead side is revived
    /// by a new handle.
    fn close_after_peer_revival(&self) {
        match self {
            // A stale event signal is consumed harmlessly by the next wait.
            Self::Single(_) => {}
            Self::Multi(semaphore) => semaphore.undo_force_open(),
        }
    }

    fn approx(&self) -> usize {
        match self {
            Self::Single(gate) => gate.approx(),
            Self::Multi(semaphore) => semaphore.available_approx(),
        }
    }
}

/// A bounded queue with single/multi producer and consumer roles.
///
/// Obtain handles with [`HandoffQueue::producer`] and
/// [`HandoffQueue::consumer`]; all pushing and popping goes through them so
/// the queue can track the liveness of each side. See the type aliases
/// [`NonFifoMpmcQueue`], [`NonFifoSpmcQueue`], [`MpscQueue`] and
/// [`SpscQueue`].
pub struct HandoffQueue<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> {
    inner: SegQueue<T>,
    producers_count: AtomicUsize,
    consumers_count: AtomicUsize,
    capacity: AtomicUsize,
    producer_gate: Gate,
    consumer_gate: Gate,
}

/// Multi-producer multi-consumer queue; no cross-producer ordering.
pub type NonFifoMpmcQueue<T> = HandoffQueue<T, true, true>;
/// Single-producer multi-consumer queue; no ordering across consumers.
pub type NonFifoSpmcQueue<T> = HandoffQueue<T, false, true>;
/// Multi-producer single-consumer queue; FIFO per producer.
pub type MpscQueue<T> = HandoffQueue<T, true, false>;
/// Single-producer single-consumer queue; FIFO.
pub type SpscQueue<T> = HandoffQueue<T, false, false>;

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool>
    HandoffQueue<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    /// Creates a queue with the given soft capacity limit.
    #[must_use]
    pub fn create(max_size: usize) -> Arc<Self> {
        let max_size = max_size.min(MAX_CAPACITY);
        Arc::new(Self {
            inner: SegQueue::new(),
            producers_count: AtomicUsize::new(0),
            consumers_count: AtomicUsize::new(0),
            capacity: AtomicUsize::new(max_size),
            producer_gate: Gate::new(MULTI_PRODUCER, max_size),
            consumer_gate: Gate::new(MULTI_CONSUMER, 0),
        })
    }

    /// Creates a queue without a capacity limit.
    #[must_use]
    pub fn create_unbounded() -> Arc<Self> {
        Self::create(MAX_CAPACITY)
    }

    /// Acquires a producer handle.
    ///
    /// Panics if the queue is single-producer and a live producer already
    /// exists. A new producer may revive a side that was created and died.
    #[must_use]
    pub fn producer(self: &Arc<Self>) -> Producer<T, MULTI_PRODUCER, MULTI_CONSUMER> {
        self.register_producer();
        Producer {
            queue: Arc::clone(self),
        }
    }

    /// Acquires a consumer handle.
    ///
    /// Panics if the queue is single-consumer and a live consumer already
    /// exists.
    #[must_use]
    pub fn consumer(self: &Arc<Self>) -> Consumer<T, MULTI_PRODUCER, MULTI_CONSUMER> {
        self.register_consumer();
        Consumer {
            queue: Arc::clone(self),
        }
    }

    /// Sets the soft capacity limit.
    ///
    /// Growing releases capacity immediately. Shrinking reclaims capacity
    /// tokens and may block (on the multi-producer side) until the queue
    /// drains below the new bound; elements already queued are not evicted.
    pub fn set_soft_max_size(&self, max_size: usize) {
        let max_size = max_size.min(MAX_CAPACITY);
        let old_capacity = self.capacity.swap(max_size, Ordering::AcqRel);
        if max_size > old_capacity {
            self.producer_gate.add_tokens(max_size - old_capacity);
        } else if max_size < old_capacity {
            self.producer_gate.reclaim_tokens(old_capacity - max_size);
        }
    }

    /// The soft capacity limit; `None` when unbounded.
    #[must_use]
    pub fn soft_max_size(&self) -> Option<usize> {
        let capacity = self.capacity.load(Ordering::Acquire);
        (capacity < MAX_CAPACITY).then_some(capacity)
    }

    /// The approximate number of queued elements.
    #[must_use]
    pub fn size_approx(&self) -> usize {
        self.consumer_gate.approx()
    }

    /// The approximate remaining capacity.
    #[must_use]
    pub fn remaining_capacity_approx(&self) -> usize {
        self.producer_gate.approx()
    }

    fn no_more_producers(&self) -> bool {
        self.producers_count.load(Ordering::SeqCst) == CREATED_AND_DEAD
    }

    fn no_more_consumers(&self) -> bool {
        self.consumers_count.load(Ordering::SeqCst) == CREATED_AND_DEAD
    }

    fn register_producer(&self) {
        let old = self
            .producers_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(if count == CREATED_AND_DEAD { 1 } else { count + 1 })
            })
            .expect("producer count update failed");
        if old == CREATED_AND_DEAD {
            self.consumer_gate.close_after_peer_revival();
        } else {
            assert!(
                MULTI_PRODUCER || old == 0,
                "single-producer queue already has a live producer handle"
            );
        }
    }

    fn register_consumer(&self) {
        let old = self
            .consumers_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(if count == CREATED_AND_DEAD { 1 } else { count + 1 })
            })
            .expect("consumer count update failed");
        if old == CREATED_AND_DEAD {
            self.producer_gate.close_after_peer_revival();
        } else {
            assert!(
                MULTI_CONSUMER || old == 0,
                "single-consumer queue already has a live consumer handle"
            );
        }
    }

    fn mark_producer_dead(&self) {
        let old = self
            .producers_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(if count == 1 { CREATED_AND_DEAD } else { count - 1 })
            })
            .expect("producer count update failed");
        if old == 1 {
            self.consumer_gate.open_after_peer_death();
        }
    }

    fn mark_consumer_dead(&self) {
        let old = self
            .consumers_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(if count == 1 { CREATED_AND_DEAD } else { count - 1 })
            })
            .expect("consumer count update failed");
        if old == 1 {
            self.producer_gate.open_after_peer_death();
        }
    }

    fn commit_push(&self, value: T) {
        self.inner.push(value);
        self.consumer_gate.release_one();
    }

    fn on_element_popped(&self) {
        self.producer_gate.release_one();
    }

    fn waiting_task_cancelled() -> bool {
        current::try_context().is_some_and(|ctx| ctx.should_cancel())
    }

    fn classify_push_failure(&self, value: T) -> PushError<T> {
        if self.no_more_consumers() {
            PushError::Closed(value)
        } else if Self::waiting_task_cancelled() {
            PushError::Interrupted(value)
        } else {
            PushError::TimedOut(value)
        }
    }

    // === Push ===

    fn push_impl(&self, value: T, deadline: Deadline) -> Result<(), PushError<T>> {
        match &self.producer_gate {
            Gate::Single(gate) => self.push_single(gate, value, deadline),
            Gate::Multi(semaphore) => self.push_multi(semaphore, value, deadline),
        }
    }

    fn push_single(
        &self,
        gate: &SingleGate,
        mut value: T,
        deadline: Deadline,
    ) -> Result<(), PushError<T>> {
        loop {
            value = match self.try_push_single(gate, value) {
                Ok(()) => return Ok(()),
                Err(value) => value,
            };
            if self.no_more_consumers() {
                return Err(PushError::Closed(value));
            }
            if deadline.is_reached() {
                return Err(PushError::TimedOut(value));
            }
            if !gate.event.wait_until(deadline) {
                return Err(self.classify_push_failure(value));
            }
        }
    }

    fn try_push_single(&self, gate: &SingleGate, value: T) -> Result<(), T> {
        // Liveness first: a dead consumer side fails the push even with
        // spare capacity, in the no-block path too.
        if self.no_more_consumers() {
            return Err(value);
        }
        if !gate.try_take_token() {
            return Err(value);
        }
        gate.event.reset();
        self.commit_push(value);
        Ok(())
    }

    fn push_multi(
        &self,
        semaphore: &Semaphore,
        value: T,
        deadline: Deadline,
    ) -> Result<(), PushError<T>> {
        // Only the multi-producer side polls cancellation; the single side
        // does not, by design.
        if Self::waiting_task_cancelled() {
            return Err(PushError::Interrupted(value));
        }
        if !semaphore.try_lock_shared_until(deadline) {
            return Err(self.classify_push_failure(value));
        }
        if self.no_more_consumers() {
            semaphore.unlock_shared();
            return Err(PushError::Closed(value));
        }
        self.commit_push(value);
        Ok(())
    }

    fn push_nowait_impl(&self, value: T) -> Result<(), TryPushError<T>> {
        match &self.producer_gate {
            Gate::Single(gate) => self.try_push_single(gate, value).map_err(|value| {
                if self.no_more_consumers() {
                    TryPushError::Closed(value)
                } else {
                    TryPushError::Full(value)
                }
            }),
            Gate::Multi(semaphore) => {
                if !semaphore.try_lock_shared() {
                    return Err(TryPushError::Full(value));
                }
                if self.no_more_consumers() {
                    semaphore.unlock_shared();
                    return Err(TryPushError::Closed(value));
                }
                self.commit_push(value);
                Ok(())
            }
        }
    }

    // === Pop ===

    fn pop_impl(&self, deadline: Deadline) -> Result<T, PopError> {
        match &self.consumer_gate {
            Gate::Single(gate) => self.pop_single(gate, deadline),
            Gate::Multi(semaphore) => self.pop_multi(semaphore, deadline),
        }
    }

    fn pop_single(&self, gate: &SingleGate, deadline: Deadline) -> Result<T, PopError> {
        loop {
            if let Some(value) = self.try_pop_single(gate) {
                return Ok(value);
            }
            if self.no_more_producers() {
                // A producer may have pushed between the failed pop and its
                // death; drain before reporting closure.
                return self.try_pop_single(gate).ok_or(PopError::Closed);
            }
            if deadline.is_reached() {
                return Err(PopError::TimedOut);
            }
            if !gate.event.wait_until(deadline) {
                return Err(if Self::waiting_task_cancelled() {
                    PopError::Interrupted
                } else {
                    PopError::TimedOut
                });
            }
        }
    }

    fn try_pop_single(&self, gate: &SingleGate) -> Option<T> {
        let value = self.inner.pop()?;
        gate.tokens.fetch_sub(1, Ordering::AcqRel);
        gate.event.reset();
        self.on_element_popped();
        Some(value)
    }

    fn pop_multi(&self, semaphore: &Semaphore, deadline: Deadline) -> Result<T, PopError> {
        if !semaphore.try_lock_shared_until(deadline) {
            return Err(if Self::waiting_task_cancelled() {
                PopError::Interrupted
            } else {
                PopError::TimedOut
            });
        }
        match self.inner.pop() {
            Some(value) => {
                self.on_element_popped();
                Ok(value)
            }
            None => {
                // An element token without an element: the producer side
                // died and flooded the gate.
                semaphore.unlock_shared();
                Err(PopError::Closed)
            }
        }
    }

    fn pop_nowait_impl(&self) -> Result<T, TryPopError> {
        match &self.consumer_gate {
            Gate::Single(gate) => self.try_pop_single(gate).ok_or(if self.no_more_producers() {
                TryPopError::Closed
            } else {
                TryPopError::Empty
            }),
            Gate::Multi(semaphore) => {
                if !semaphore.try_lock_shared() {
                    return Err(if self.no_more_producers() {
                        TryPopError::Closed
                    } else {
                        TryPopError::Empty
                    });
                }
                match self.inner.pop() {
                    Some(value) => {
                        self.on_element_popped();
                        Ok(value)
                    }
                    None => {
                        semaphore.unlock_shared();
                        Err(TryPopError::Closed)
                    }
                }
            }
        }
    }
}

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> Drop
    for HandoffQueue<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    fn drop(&mut self) {
        // Remaining elements are dropped; the queue offers no delivery
        // guarantee once the receiving side is gone.
        while self.inner.pop().is_some() {}
    }
}

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> fmt::Debug
    for HandoffQueue<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffQueue")
            .field("multi_producer", &MULTI_PRODUCER)
            .field("multi_consumer", &MULTI_CONSUMER)
            .field("size_approx", &self.size_approx())
            .field("soft_max_size", &self.soft_max_size())
            .finish()
    }
}

/// The producing side of a [`HandoffQueue`].
///
/// Cloneable only on multi-producer queues. Dropping the last producer marks
/// the side dead, failing pending and future pops once the queue drains.
pub struct Producer<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> {
    queue: Arc<HandoffQueue<T, MULTI_PRODUCER, MULTI_CONSUMER>>,
}

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool>
    Producer<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    /// Pushes a value, waiting for capacity until `deadline`.
    pub fn push(&self, value: T, deadline: Deadline) -> Result<(), PushError<T>> {
        self.queue.push_impl(value, deadline)
    }

    /// Pushes a value only if capacity is immediately available.
    pub fn push_nowait(&self, value: T) -> Result<(), TryPushError<T>> {
        self.queue.push_nowait_impl(value)
    }

    /// The queue this handle produces into.
    #[must_use]
    pub fn queue(&self) -> &Arc<HandoffQueue<T, MULTI_PRODUCER, MULTI_CONSUMER>> {
        &self.queue
    }
}

impl<T, const MULTI_CONSUMER: bool> Clone for Producer<T, true, MULTI_CONSUMER> {
    fn clone(&self) -> Self {
        self.queue.register_producer();
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> Drop
    for Producer<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    fn drop(&mut self) {
        self.queue.mark_producer_dead();
    }
}

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> fmt::Debug
    for Producer<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("queue", &self.queue).finish()
    }
}

/// The consuming side of a [`HandoffQueue`].
///
/// Cloneable only on multi-consumer queues. Dropping the last consumer marks
/// the side dead, failing pending and future pushes.
pub struct Consumer<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> {
    queue: Arc<HandoffQueue<T, MULTI_PRODUCER, MULTI_CONSUMER>>,
}

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool>
    Consumer<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    /// Pops a value, waiting for one until `deadline`.
    pub fn pop(&self, deadline: Deadline) -> Result<T, PopError> {
        self.queue.pop_impl(deadline)
    }

    /// Pops a value only if one is immediately available.
    pub fn pop_nowait(&self) -> Result<T, TryPopError> {
        self.queue.pop_nowait_impl()
    }

    /// The queue this handle consumes from.
    #[must_use]
    pub fn queue(&self) -> &Arc<HandoffQueue<T, MULTI_PRODUCER, MULTI_CONSUMER>> {
        &self.queue
    }
}

impl<T, const MULTI_PRODUCER: bool> Clone for Consumer<T, MULTI_PRODUCER, true> {
    fn clone(&self) -> Self {
        self.queue.register_consumer();
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> Drop
    for Consumer<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    fn drop(&mut self) {
        self.queue.mark_consumer_dead();
    }
}

impl<T, const MULTI_PRODUCER: bool, const MULTI_CONSUMER: bool> fmt::Debug
    for Consumer<T, MULTI_PRODUCER, MULTI_CONSUMER>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("queue", &self.queue).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nowait_round_trip() {
        let queue = SpscQueue::create(2);
        let producer = queue.producer();
        let consumer = queue.consumer();

        producer.push_nowait(1).expect("push 1");
        producer.push_nowait(2).expect("push 2");
        assert!(matches!(producer.push_nowait(3), Err(TryPushError::Full(3))));

        assert_eq!(consumer.pop_nowait(), Ok(1));
        assert_eq!(consumer.pop_nowait(), Ok(2));
        assert_eq!(consumer.pop_nowait(), Err(TryPopError::Empty));
    }

    #[test]
    fn size_tracks_pushes_and_pops() {
        let queue = SpscQueue::create(4);
        let producer = queue.producer();
        let consumer = queue.consumer();

        producer.push_nowait("a").expect("push");
        producer.push_nowait("b").expect("push");
        assert_eq!(queue.size_approx(), 2);
        assert_eq!(queue.remaining_capacity_approx(), 2);

        consumer.pop_nowait().expect("pop");
        assert_eq!(queue.size_approx(), 1);
        assert_eq!(queue.remaining_capacity_approx(), 3);
    }

    #[test]
    fn dead_consumer_fails_nowait_push_even_with_capacity() {
        let queue = SpscQueue::create(4);
        let producer = queue.producer();
        drop(queue.consumer());

        assert!(matches!(
            producer.push_nowait(7),
            Err(TryPushError::Closed(7))
        ));
    }

    #[test]
    fn dead_producer_drains_then_closes() {
        let queue = SpscQueue::create(4);
        let producer = queue.producer();
        let consumer = queue.consumer();

        producer.push_nowait(10).expect("push");
        drop(producer);

        assert_eq!(consumer.pop_nowait(), Ok(10));
        assert_eq!(consumer.pop_nowait(), Err(TryPopError::Closed));
    }

    #[test]
    fn mpmc_nowait_fails_closed_after_producers_die() {
        let queue = NonFifoMpmcQueue::create(2);
        let producer = queue.producer();
        let consumer = queue.consumer();

        producer.push_nowait(1).expect("push");
        drop(producer);

        assert_eq!(consumer.pop_nowait(), Ok(1));
        assert_eq!(consumer.pop_nowait(), Err(TryPopError::Closed));
    }

    #[test]
    fn revived_producer_reopens_the_queue() {
        let queue = NonFifoMpmcQueue::create(2);
        let consumer = queue.consumer();
        drop(queue.producer());

        assert_eq!(consumer.pop_nowait(), Err(TryPopError::Closed));

        let producer = queue.producer();
        producer.push_nowait(5).expect("push after revival");
        assert_eq!(consumer.pop_nowait(), Ok(5));
        assert_eq!(consumer.pop_nowait(), Err(TryPopError::Empty));
    }

    #[test]
    fn unbounded_reports_none() {
        let queue = MpscQueue::<u32>::create_unbounded();
        assert_eq!(queue.soft_max_size(), None);
        let bounded = MpscQueue::<u32>::create(8);
        assert_eq!(bounded.soft_max_size(), Some(8));
    }

    #[test]
    fn grow_makes_room_immediately() {
        let queue = SpscQueue::create(1);
        let producer = queue.producer();
        let _consumer = queue.consumer();

        producer.push_nowait(1).expect("push");
        assert!(matches!(producer.push_nowait(2), Err(TryPushError::Full(2))));

        queue.set_soft_max_size(3);
        producer.push_nowait(2).expect("push after grow");
        producer.push_nowait(3).expect("push after grow");
        assert_eq!(queue.soft_max_size(), Some(3));
    }

    #[test]
    fn shrink_blocks_pushes_until_drained() {
        let queue = SpscQueue::create(3);
        let producer = queue.producer();
        let consumer = queue.consumer();

        for i in 0..3 {
            producer.push_nowait(i).expect("fill");
        }
        queue.set_soft_max_size(1);

        // Queue holds 3 elements over a capacity of 1: pushes must fail
        // until 2 elements have drained.
        assert!(matches!(producer.push_nowait(9), Err(TryPushError::Full(9))));
        consumer.pop_nowait().expect("pop");
        assert!(matches!(producer.push_nowait(9), Err(TryPushError::Full(9))));
        consumer.pop_nowait().expect("pop");
        assert!(matches!(producer.push_nowait(9), Err(TryPushError::Full(9))));
        consumer.pop_nowait().expect("pop");
        producer.push_nowait(9).expect("push after drain");
    }

    #[test]
    #[should_panic(expected = "single-producer queue already has a live producer handle")]
    fn second_single_producer_panics() {
        let queue = SpscQueue::<u32>::create(1);
        let _first = queue.producer();
        let _second = queue.producer();
    }

    #[test]
    fn push_error_returns_the_value() {
        let error = PushError::TimedOut(String::from("payload"));
        assert_eq!(error.into_inner(), "payload");
    }
}
