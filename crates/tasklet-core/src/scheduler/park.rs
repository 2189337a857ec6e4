//! Single-use resume tokens
//!
//! Suspending a tasklet hands a token to whoever may wake it (a waiter queue,
//! a completing child). Waking is writing an outcome into the token exactly
//! once. The parked tasklet acts as its own timer: when its deadline passes
//! it tries to write `TimedOut` itself. Whichever write lands first wins and
//! the loser gets its payload back, so a waiter reached by both its timer and
//! a late signal is never resumed twice.

use crate::time::Deadline;
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// How a suspended tasklet was resumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome<T = ()> {
    /// Woken by a signal carrying a payload
    Signaled(T),
    /// The wait deadline expired first
    TimedOut,
}

impl<T> WakeOutcome<T> {
    /// Whether the wake was a signal
    pub fn is_signaled(&self) -> bool {
        matches!(self, WakeOutcome::Signaled(_))
    }

    /// Signal payload, if any
    pub fn into_signal(self) -> Option<T> {
        match self {
            WakeOutcome::Signaled(value) => Some(value),
            WakeOutcome::TimedOut => None,
        }
    }
}

enum Slot<T> {
    Pending,
    Ready(WakeOutcome<T>),
    Taken,
}

/// Single-use, first-writer-wins resumption slot
pub struct ResumeToken<T = ()> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

impl<T> ResumeToken<T> {
    /// Create an unresolved token
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            cond: Condvar::new(),
        }
    }

    /// Resolve with a signal
    ///
    /// Returns the value back if the token was already resolved.
    pub fn signal(&self, value: T) -> Result<(), T> {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Pending) {
            return Err(value);
        }
        *slot = Slot::Ready(WakeOutcome::Signaled(value));
        drop(slot);
        self.cond.notify_one();
        Ok(())
    }

    /// Resolve as timed out; false if the token was already resolved
    pub fn expire(&self) -> bool {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Pending) {
            return false;
        }
        *slot = Slot::Ready(WakeOutcome::TimedOut);
        drop(slot);
        self.cond.notify_one();
        true
    }

    /// Whether an outcome has been written
    pub fn is_resolved(&self) -> bool {
        !matches!(*self.slot.lock(), Slot::Pending)
    }

    /// Block the calling thread until the token is resolved or `deadline` passes
    pub fn park(&self, deadline: Deadline) -> WakeOutcome<T> {
        let mut slot = self.slot.lock();
        loop {
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Ready(outcome) => return outcome,
                // Already consumed by an earlier park
                Slot::Taken => return WakeOutcome::TimedOut,
                Slot::Pending => *slot = Slot::Pending,
            }

            match deadline.instant() {
                None => self.cond.wait(&mut slot),
                Some(at) => {
                    if Instant::now() >= at {
                        *slot = Slot::Taken;
                        return WakeOutcome::TimedOut;
                    }
                    // Spurious and timed wakeups both loop back to re-check
                    let _ = self.cond.wait_until(&mut slot, at);
                }
            }
        }
    }
}

impl<T> Default for ResumeToken<T> {
    fn default() -> Self {
        Self::new()
    }
}
