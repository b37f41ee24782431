//! A thread-safe min-heap of work items keyed by due time.
//!
//! One mutex guards the heap and the closed flag, which doubles as the owning
//! loop's stop state; one condition variable is signalled on every push and on
//! close. The consumer never holds the lock
//! while a dispatched item runs: `pop_due_or_wait` only removes and returns.

use crate::common::Seq;
use crate::components::item::WorkItem;
use crate::error::PostError;
use crate::time::MonotonicClock;
use parking_lot::{Condvar, Mutex};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};
use tracing::trace;

struct QueueState {
    heap: BinaryHeap<WorkItem>,
    next_seq: Seq,
    closed: bool,
    /// Items dropped by `close` since the last `take_discarded`.
    discarded: usize,
}

/// The delay queue a `MessageLoop` consumes from.
pub struct DelayQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    clock: MonotonicClock,
}

impl DelayQueue {
    /// Creates an open, empty queue measured against the global clock.
    pub fn new() -> Self {
        Self::with_clock(*MonotonicClock::global())
    }

    pub fn with_clock(clock: MonotonicClock) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: Seq(0),
                closed: false,
                discarded: 0,
            }),
            ready: Condvar::new(),
            clock,
        }
    }

    pub fn clock(&self) -> &MonotonicClock {
        &self.clock
    }

    /// Inserts `item` and wakes the consumer.
    ///
    /// A closed queue rejects the item with `PostError::Closed`; the item is
    /// dropped after the lock is released.
    pub fn push(&self, mut item: WorkItem) -> Result<Seq, PostError> {
        let seq = {
            let mut state = self.state.lock();
            if state.closed {
                None
            } else {
                let seq = state.next_seq;
                state.next_seq = seq.next();
                item.seq = seq;
                trace!(due_ms = item.due_ms(), seq = seq.0, kind = %item.kind(), "queued");
                state.heap.push(item);
                Some(seq)
            }
        };
        match seq {
            Some(seq) => {
                self.ready.notify_one();
                Ok(seq)
            }
            None => Err(PostError::Closed),
        }
    }

    /// Waits until the earliest item is due and removes it, or gives up after
    /// `poll_interval` and returns `None`.
    ///
    /// While the earliest item is still in the future the wait is bounded by
    /// its remaining time, so the caller never spins. Returns `None` right away
    /// once the queue is closed.
    pub fn pop_due_or_wait(&self, poll_interval: Duration) -> Option<WorkItem> {
        let deadline = Instant::now() + poll_interval;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            let now_ms = self.clock.now_ms();
            let mut timeout = deadline.saturating_duration_since(Instant::now());
            if let Some(head) = state.heap.peek() {
                if head.is_due(now_ms) {
                    return state.heap.pop();
                }
                timeout = timeout.min(Duration::from_millis(head.due_ms() - now_ms));
            }
            if timeout.is_zero() {
                return None;
            }
            // Spurious and early wakes fall through to the re-check above.
            self.ready.wait_for(&mut state, timeout);
        }
    }

    /// Removes the earliest item if it is already due, without waiting.
    pub fn try_pop_due(&self) -> Option<WorkItem> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let now_ms = self.clock.now_ms();
        match state.heap.peek() {
            Some(head) if head.is_due(now_ms) => state.heap.pop(),
            _ => None,
        }
    }

    /// Marks the queue closed and discards everything pending.
    ///
    /// Further pushes are rejected until `reopen`. Returns how many items were
    /// discarded; closing an already closed queue discards nothing.
    pub fn close(&self) -> usize {
        let drained = {
            let mut state = self.state.lock();
            state.closed = true;
            let drained = std::mem::take(&mut state.heap);
            state.discarded += drained.len();
            drained
        };
        self.ready.notify_all();
        // Item destructors run here, outside the lock.
        drained.len()
    }

    /// Returns and resets the number of items discarded by `close`.
    pub fn take_discarded(&self) -> usize {
        std::mem::take(&mut self.state.lock().discarded)
    }

    /// Accepts pushes again after a `close` and forgets the discard count.
    pub fn reopen(&self) {
        let mut state = self.state.lock();
        state.closed = false;
        state.discarded = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of items waiting, due or not.
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Due time of the earliest pending item.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.state.lock().heap.peek().map(WorkItem::due_ms)
    }
}

impl Default for DelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::item::Work;
    use crate::components::payload::Message;
    use std::sync::Arc;
    use std::thread;

    fn message_at(queue: &DelayQueue, delay_ms: u64, what: i32) {
        let due = queue.clock().deadline_after(delay_ms);
        queue.push(WorkItem::message(due, Message::new(what))).unwrap();
    }

    fn what_of(item: WorkItem) -> i32 {
        match item.into_work() {
            Work::Message(msg) => msg.what,
            Work::Task(_) => panic!("expected a message"),
        }
    }

    #[test]
    fn pops_in_due_order() {
        let queue = DelayQueue::new();
        message_at(&queue, 40, 40);
        message_at(&queue, 0, 0);
        message_at(&queue, 20, 20);

        let mut seen = Vec::new();
        while seen.len() < 3 {
            if let Some(item) = queue.pop_due_or_wait(Duration::from_millis(100)) {
                seen.push(what_of(item));
            }
        }
        assert_eq!(seen, vec![0, 20, 40]);
    }

    #[test]
    fn equal_due_times_pop_in_insertion_order() {
        let queue = DelayQueue::new();
        let due = queue.clock().now_ms();
        for what in 0..50 {
            queue.push(WorkItem::message(due, Message::new(what))).unwrap();
        }
        let seen: Vec<i32> = std::iter::from_fn(|| queue.try_pop_due()).map(what_of).collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn does_not_return_items_early() {
        let queue = DelayQueue::new();
        let due = queue.clock().deadline_after(30);
        queue.push(WorkItem::task(due, || {})).unwrap();

        let item = queue.pop_due_or_wait(Duration::from_secs(5)).unwrap();
        assert!(queue.clock().now_ms() >= item.due_ms());
    }

    #[test]
    fn future_head_waits_only_until_due() {
        let queue = DelayQueue::new();
        message_at(&queue, 30, 1);

        let started = Instant::now();
        let item = queue.pop_due_or_wait(Duration::from_secs(5));
        let waited = started.elapsed();
        assert!(item.is_some());
        assert!(waited < Duration::from_secs(1), "waited {waited:?}");
    }

    #[test]
    fn waits_for_a_future_head_instead_of_polling_repeatedly() {
        let queue = DelayQueue::new();
        message_at(&queue, 200, 1);

        let mut idle_returns = 0;
        let item = loop {
            match queue.pop_due_or_wait(Duration::from_millis(10)) {
                Some(item) => break item,
                None => idle_returns += 1,
            }
            assert!(idle_returns <= 40, "returned idle {idle_returns} times");
        };
        assert_eq!(what_of(item), 1);
        // Roughly one return per poll interval across the 200 ms wait.
        assert!(idle_returns >= 5, "returned idle only {idle_returns} times");
    }

    #[test]
    fn one_call_sleeps_until_a_head_due_within_the_poll_interval() {
        let queue = DelayQueue::new();
        message_at(&queue, 50, 1);

        let started = Instant::now();
        let item = queue.pop_due_or_wait(Duration::from_secs(5)).unwrap();
        assert_eq!(what_of(item), 1);
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn gives_up_after_poll_interval() {
        let queue = DelayQueue::new();
        let started = Instant::now();
        assert!(queue.pop_due_or_wait(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));

        message_at(&queue, 10_000, 1);
        assert!(queue.pop_due_or_wait(Duration::from_millis(20)).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn push_from_another_thread_wakes_waiting_consumer() {
        let queue = Arc::new(DelayQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                message_at(&queue, 0, 9);
            })
        };

        let started = Instant::now();
        let item = queue.pop_due_or_wait(Duration::from_secs(5)).unwrap();
        assert_eq!(what_of(item), 9);
        assert!(started.elapsed() < Duration::from_secs(1));
        producer.join().unwrap();
    }

    #[test]
    fn close_discards_pending_and_rejects_pushes() {
        let queue = DelayQueue::new();
        message_at(&queue, 0, 1);
        message_at(&queue, 1_000, 2);

        assert_eq!(queue.close(), 2);
        assert!(queue.is_closed());
        assert!(queue.is_empty());
        assert_eq!(
            queue.push(WorkItem::task(0, || {})),
            Err(PostError::Closed)
        );
        assert!(queue.pop_due_or_wait(Duration::from_millis(50)).is_none());
        assert_eq!(queue.close(), 0);
        assert_eq!(queue.take_discarded(), 2);
        assert_eq!(queue.take_discarded(), 0);
    }

    #[test]
    fn close_wakes_waiting_consumer() {
        let queue = Arc::new(DelayQueue::new());
        let closer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.close();
            })
        };

        let started = Instant::now();
        assert!(queue.pop_due_or_wait(Duration::from_secs(5)).is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        closer.join().unwrap();
    }

    #[test]
    fn reopen_accepts_work_again() {
        let queue = DelayQueue::new();
        message_at(&queue, 1_000, 1);
        queue.close();
        queue.reopen();
        assert!(!queue.is_closed());
        assert_eq!(queue.take_discarded(), 0);
        message_at(&queue, 0, 3);
        assert!(queue.next_due_ms().is_some());
        assert_eq!(what_of(queue.try_pop_due().unwrap()), 3);
    }
}
