//! Blocking double-ended queue

use crate::scheduler::{Tasklet, WakeOutcome};
use crate::sync::WaiterQueue;
use crate::time::Timeout;
use crate::{TaskletError, TaskletResult};
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
enum End {
    Front,
    Back,
}

struct DequeState<T> {
    items: VecDeque<T>,
    /// Poppers at either end, served oldest first
    poppers: WaiterQueue<T>,
}

/// Unbounded double-ended queue whose pops can block
///
/// Poppers only wait while the deque is empty, so an arriving item is
/// handed directly to the longest-waiting popper whichever end either side
/// used.
pub struct Deque<T> {
    state: Mutex<DequeState<T>>,
}

impl<T> Deque<T> {
    /// Create an empty deque
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty deque with room for `capacity` items
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(DequeState {
                items: VecDeque::with_capacity(capacity),
                poppers: WaiterQueue::new(),
            }),
        }
    }

    /// Push to the back
    pub fn append(&self, value: T) {
        self.push(End::Back, value);
    }

    /// Push to the front
    pub fn appendleft(&self, value: T) {
        self.push(End::Front, value);
    }

    /// Append every item, in order
    pub fn extend(&self, values: impl IntoIterator<Item = T>) {
        for value in values {
            self.append(value);
        }
    }

    /// Remove from the back
    ///
    /// Fails with `Empty` when non-blocking and empty, `Timeout` when the
    /// wait deadline expires first.
    pub fn pop(&self, blocking: bool, timeout: Timeout) -> TaskletResult<T> {
        self.take(End::Back, blocking, timeout)
    }

    /// Remove from the front (same contract as `pop`)
    pub fn popleft(&self, blocking: bool, timeout: Timeout) -> TaskletResult<T> {
        self.take(End::Front, blocking, timeout)
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether no items are queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Drop every queued item
    pub fn clear(&self) {
        self.state.lock().items.clear();
    }

    /// Number of tasklets blocked in a pop
    pub fn waiting(&self) -> usize {
        self.state.lock().poppers.len()
    }

    fn push(&self, end: End, value: T) {
        let mut state = self.state.lock();
        if let Err(value) = state.poppers.wake_one_with(value) {
            match end {
                End::Back => state.items.push_back(value),
                End::Front => state.items.push_front(value),
            }
        }
    }

    fn take(&self, end: End, blocking: bool, timeout: Timeout) -> TaskletResult<T> {
        let deadline = timeout.resolve(Tasklet::current().deadline());

        let waiter = {
            let mut state = self.state.lock();
            let item = match end {
                End::Back => state.items.pop_back(),
                End::Front => state.items.pop_front(),
            };
            if let Some(item) = item {
                return Ok(item);
            }
            if !blocking {
                return Err(TaskletError::Empty);
            }
            state.poppers.enqueue()
        };

        match waiter.park(deadline) {
            WakeOutcome::Signaled(item) => Ok(item),
            WakeOutcome::TimedOut => {
                self.state.lock().poppers.remove(waiter.id());
                Err(TaskletError::Timeout)
            }
        }
    }
}

impl<T> Default for Deque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for Deque<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let deque = Deque::new();
        deque.extend(iter);
        deque
    }
}
