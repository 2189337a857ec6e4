//! Mailbox channel between tasklets

use crate::scheduler::{Tasklet, WakeOutcome};
use crate::sync::WaiterQueue;
use crate::time::Timeout;
use crate::{TaskletError, TaskletResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// What a parked receiver is woken with
enum Delivery<T> {
    Value(T),
    Closed,
}

struct ChannelState<T> {
    queue: VecDeque<T>,
    /// None = unbounded
    capacity: Option<usize>,
    closed: bool,
    /// Slots freed by a receive and promised to a woken sender
    reserved: usize,
    receivers: WaiterQueue<Delivery<T>>,
    senders: WaiterQueue,
}

impl<T> ChannelState<T> {
    fn has_room(&self) -> bool {
        self.capacity
            .map_or(true, |cap| self.queue.len() + self.reserved < cap)
    }

    /// A slot was freed: promise it to the oldest parked sender, if any
    fn release_slot(&mut self) {
        if self.senders.wake_one() {
            self.reserved += 1;
        }
    }

    /// Hand `value` to the oldest parked receiver, or give it back
    fn offer(&mut self, value: T) -> Result<(), T> {
        match self.receivers.wake_one_with(Delivery::Value(value)) {
            Ok(_) => Ok(()),
            Err(Delivery::Value(value)) => Err(value),
            Err(Delivery::Closed) => unreachable!("receivers are only offered values"),
        }
    }
}

/// Error returned by `Channel::try_send`, carrying the unsent value
#[derive(Debug, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// Bounded channel is at capacity
    Full(T),
    /// Channel was closed
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Recover the value that was not sent
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(value) | TrySendError::Closed(value) => value,
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => write!(f, "Channel is full"),
            TrySendError::Closed(_) => write!(f, "Channel closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

/// Point-to-point mailbox
///
/// Cloning yields another handle to the same mailbox. Values go straight to
/// the longest-waiting receiver when there is one; otherwise they queue. A
/// bounded channel parks senders while it is full.
pub struct Channel<T> {
    shared: Arc<Mutex<ChannelState<T>>>,
}

impl<T> Channel<T> {
    /// Unbounded mailbox
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Mailbox holding at most `capacity` undelivered values
    ///
    /// `bounded(1)` is a single-slot mailbox.
    pub fn bounded(capacity: usize) -> TaskletResult<Self> {
        if capacity == 0 {
            return Err(TaskletError::InvalidArgument(
                "channel capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self::with_capacity(Some(capacity)))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(ChannelState {
                queue: VecDeque::new(),
                capacity,
                closed: false,
                reserved: 0,
                receivers: WaiterQueue::new(),
                senders: WaiterQueue::new(),
            })),
        }
    }

    /// Deliver `value`, waiting for room on a full bounded channel
    ///
    /// Parked senders are served in arrival order: the slot a receive frees
    /// is held for the oldest of them, so a later sender cannot take it.
    pub fn send(&self, value: T, timeout: Timeout) -> TaskletResult<()> {
        let deadline = timeout.resolve(Tasklet::current().deadline());

        let (waiter, value) = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(TaskletError::Closed);
            }
            let value = match state.offer(value) {
                Ok(()) => return Ok(()),
                Err(returned) => returned,
            };
            if state.has_room() {
                state.queue.push_back(value);
                return Ok(());
            }
            (state.senders.enqueue(), value)
        };

        match waiter.park(deadline) {
            WakeOutcome::Signaled(()) => {
                let mut state = self.shared.lock();
                if state.closed {
                    return Err(TaskletError::Closed);
                }
                state.reserved -= 1;
                match state.offer(value) {
                    // Delivered without using the slot: pass it on
                    Ok(()) => state.release_slot(),
                    Err(value) => state.queue.push_back(value),
                }
                Ok(())
            }
            WakeOutcome::TimedOut => {
                self.shared.lock().senders.remove(waiter.id());
                Err(TaskletError::Timeout)
            }
        }
    }

    /// Deliver `value` without waiting
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(TrySendError::Closed(value));
        }
        let value = match state.offer(value) {
            Ok(()) => return Ok(()),
            Err(returned) => returned,
        };
        if !state.has_room() {
            return Err(TrySendError::Full(value));
        }
        state.queue.push_back(value);
        Ok(())
    }

    /// Take the oldest value, waiting while the mailbox is empty
    ///
    /// Queued values stay receivable after `close`; once drained, receive
    /// fails with `Closed`.
    pub fn receive(&self, timeout: Timeout) -> TaskletResult<T> {
        let deadline = timeout.resolve(Tasklet::current().deadline());

        let waiter = {
            let mut state = self.shared.lock();
            if let Some(value) = state.queue.pop_front() {
                state.release_slot();
                return Ok(value);
            }
            if state.closed {
                return Err(TaskletError::Closed);
            }
            state.receivers.enqueue()
        };

        match waiter.park(deadline) {
            WakeOutcome::Signaled(Delivery::Value(value)) => Ok(value),
            WakeOutcome::Signaled(Delivery::Closed) => Err(TaskletError::Closed),
            WakeOutcome::TimedOut => {
                self.shared.lock().receivers.remove(waiter.id());
                Err(TaskletError::Timeout)
            }
        }
    }

    /// Take the oldest value if one is queued
    pub fn try_receive(&self) -> Option<T> {
        let mut state = self.shared.lock();
        let value = state.queue.pop_front();
        if value.is_some() {
            state.release_slot();
        }
        value
    }

    /// Close the mailbox and wake every parked sender and receiver
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.receivers.wake_all_with(|| Delivery::Closed);
        state.senders.wake_all();
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of queued, undelivered values
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Whether no values are queued
    pub fn is_empty(&self) -> bool {
        self.shared.lock().queue.is_empty()
    }

    /// Capacity of a bounded channel
    pub fn capacity(&self) -> Option<usize> {
        self.shared.lock().capacity
    }

    /// Number of tasklets blocked in `receive`
    pub fn receivers_waiting(&self) -> usize {
        self.shared.lock().receivers.len()
    }

    /// Number of tasklets blocked in `send`
    pub fn senders_waiting(&self) -> usize {
        self.shared.lock().senders.len()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}
