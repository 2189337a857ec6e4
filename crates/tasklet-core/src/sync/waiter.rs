//! FIFO queue of suspended tasklets
//!
//! Every blocking primitive keeps one of these inside its own state lock.
//! The protocol is always the same:
//!
//! 1. under the lock, check the fast path, otherwise `enqueue()`
//! 2. drop the lock, `park()` the returned handle with the wait deadline
//! 3. on `TimedOut`, retake the lock and `remove()` the handle's entry
//!
//! Because the check and the enqueue happen under one lock, a signal sent
//! between steps 1 and 2 is not lost: it lands in the waiter's token and the
//! park returns immediately.

use crate::scheduler::{suspend, ResumeToken, TaskId, Tasklet, WakeOutcome};
use crate::time::Deadline;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

struct Waiter<T> {
    id: u64,
    task: TaskId,
    token: Arc<ResumeToken<T>>,
    enqueued_at: Instant,
}

/// Suspended tasklets in strict enqueue order
pub struct WaiterQueue<T = ()> {
    waiters: VecDeque<Waiter<T>>,
    next_id: u64,
}

/// A waiter's side of its queue entry
#[must_use = "an enqueued waiter must be parked"]
pub struct WaiterHandle<T = ()> {
    id: u64,
    token: Arc<ResumeToken<T>>,
}

impl<T> WaiterQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Append the current tasklet to the tail
    pub fn enqueue(&mut self) -> WaiterHandle<T> {
        let id = self.next_id;
        self.next_id += 1;

        let token = Arc::new(ResumeToken::new());
        self.waiters.push_back(Waiter {
            id,
            task: Tasklet::current_id(),
            token: token.clone(),
            enqueued_at: Instant::now(),
        });
        WaiterHandle { id, token }
    }

    /// Hand `value` to the oldest live waiter
    ///
    /// Entries whose tokens were already resolved (their deadline won the
    /// race) are discarded on the way. Returns the value if nobody took it.
    pub fn wake_one_with(&mut self, value: T) -> Result<TaskId, T> {
        let mut value = value;
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.token.signal(value) {
                Ok(()) => {
                    trace!(
                        task = %waiter.task,
                        waited_us = waiter.enqueued_at.elapsed().as_micros() as u64,
                        "waiter signaled"
                    );
                    return Ok(waiter.task);
                }
                Err(returned) => value = returned,
            }
        }
        Err(value)
    }

    /// Signal every live waiter with a value produced by `make`
    pub fn wake_all_with(&mut self, mut make: impl FnMut() -> T) -> usize {
        let mut woken = 0;
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.token.signal(make()).is_ok() {
                woken += 1;
            }
        }
        woken
    }

    /// Drop the entry for `id` (after its park timed out)
    pub fn remove(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|waiter| waiter.id == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether nobody is queued
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Queued tasklets, oldest first
    pub fn tasks(&self) -> Vec<TaskId> {
        self.waiters.iter().map(|waiter| waiter.task).collect()
    }

    /// How long the head of the queue has been waiting
    pub fn oldest_wait(&self) -> Option<Duration> {
        self.waiters.front().map(|waiter| waiter.enqueued_at.elapsed())
    }
}

impl WaiterQueue<()> {
    /// Resume the oldest live waiter; false if there was none
    pub fn wake_one(&mut self) -> bool {
        self.wake_one_with(()).is_ok()
    }

    /// Resume every live waiter
    pub fn wake_all(&mut self) -> usize {
        self.wake_all_with(|| ())
    }
}

impl<T> Default for WaiterQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WaiterHandle<T> {
    /// Queue entry ID, for `WaiterQueue::remove`
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Suspend the current tasklet until signaled or `deadline` passes
    ///
    /// The deadline is read by the caller once, before parking; it is not
    /// re-read while parked.
    pub fn park(&self, deadline: Deadline) -> WakeOutcome<T> {
        suspend(&self.token, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_one_fifo() {
        let mut queue = WaiterQueue::<u32>::new();
        let first = queue.enqueue();
        let second = queue.enqueue();
        assert_eq!(queue.len(), 2);

        assert!(queue.wake_one_with(1).is_ok());
        assert!(queue.wake_one_with(2).is_ok());
        assert!(queue.is_empty());

        assert_eq!(first.park(Deadline::Never), WakeOutcome::Signaled(1));
        assert_eq!(second.park(Deadline::Never), WakeOutcome::Signaled(2));
    }

    #[test]
    fn test_wake_one_empty() {
        let mut queue = WaiterQueue::new();
        assert!(!queue.wake_one());
        assert_eq!(WaiterQueue::<i32>::new().wake_one_with(4), Err(4));
    }

    #[test]
    fn test_timed_out_waiter_is_skipped() {
        let mut queue = WaiterQueue::<&str>::new();
        let stale = queue.enqueue();
        let live = queue.enqueue();

        // Deadline already passed: the park resolves the token as timed out
        assert_eq!(stale.park(Deadline::At(Instant::now())), WakeOutcome::TimedOut);

        // The stale entry loses the race and the value moves on to the next waiter
        assert!(queue.wake_one_with("item").is_ok());
        assert_eq!(live.park(Deadline::Never), WakeOutcome::Signaled("item"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut queue = WaiterQueue::<()>::new();
        let a = queue.enqueue();
        let b = queue.enqueue();

        assert!(queue.remove(a.id()));
        assert!(!queue.remove(a.id()));
        assert_eq!(queue.len(), 1);

        assert!(queue.wake_one());
        assert_eq!(b.park(Deadline::Never), WakeOutcome::Signaled(()));
    }

    #[test]
    fn test_wake_all() {
        let mut queue = WaiterQueue::<()>::new();
        let handles: Vec<_> = (0..3).map(|_| queue.enqueue()).collect();

        assert_eq!(queue.wake_all(), 3);
        for handle in handles {
            assert!(handle.park(Deadline::Never).is_signaled());
        }
    }

    #[test]
    fn test_bookkeeping() {
        let mut queue = WaiterQueue::<()>::new();
        assert_eq!(queue.oldest_wait(), None);

        let _waiter = queue.enqueue();
        assert_eq!(queue.tasks(), vec![Tasklet::current_id()]);
        assert!(queue.oldest_wait().is_some());
    }
}
