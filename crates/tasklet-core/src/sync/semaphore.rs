//! Task-aware Semaphore implementation

use crate::scheduler::{Tasklet, WakeOutcome};
use crate::sync::WaiterQueue;
use crate::time::Timeout;
use crate::{TaskletError, TaskletResult};
use parking_lot::Mutex;

struct SemaphoreState {
    /// Available permits
    count: usize,
    /// Tasklets blocked in `acquire`
    waiters: WaiterQueue,
}

/// Counting semaphore that suspends tasklets instead of threads
///
/// A release while tasklets are waiting hands the permit straight to the
/// oldest waiter, so a late arrival on the fast path can never overtake the
/// queue. Releasing more than was acquired is accepted and raises `count`
/// past its initial value.
pub struct Semaphore {
    state: Mutex<SemaphoreState>,
}

impl Semaphore {
    /// Create a semaphore with `count` permits
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                count,
                waiters: WaiterQueue::new(),
            }),
        }
    }

    /// Currently available permits
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Number of tasklets waiting for a permit
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Take a permit
    ///
    /// Returns:
    /// - Ok(true) once a permit is held
    /// - Ok(false) if `blocking` is false and no permit was free
    /// - Err(Timeout) if the wait deadline expired first; the waiter is
    ///   removed and no permit is consumed
    pub fn acquire(&self, blocking: bool, timeout: Timeout) -> TaskletResult<bool> {
        let deadline = timeout.resolve(Tasklet::current().deadline());

        let waiter = {
            let mut state = self.state.lock();
            if state.count > 0 {
                state.count -= 1;
                return Ok(true);
            }
            if !blocking {
                return Ok(false);
            }
            state.waiters.enqueue()
        };

        match waiter.park(deadline) {
            WakeOutcome::Signaled(()) => Ok(true),
            WakeOutcome::TimedOut => {
                self.state.lock().waiters.remove(waiter.id());
                Err(TaskletError::Timeout)
            }
        }
    }

    /// Take a permit without blocking
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Return a permit, waking the oldest waiter if any
    pub fn release(&self) {
        let mut state = self.state.lock();
        if !state.waiters.wake_one() {
            state.count += 1;
        }
    }

    /// Scoped acquisition bounded by the current deadline
    pub fn access(&self) -> TaskletResult<SemaphoreGuard<'_>> {
        self.access_with(Timeout::Current)
    }

    /// Scoped acquisition with an explicit timeout
    pub fn access_with(&self, timeout: Timeout) -> TaskletResult<SemaphoreGuard<'_>> {
        self.acquire(true, timeout)?;
        Ok(SemaphoreGuard {
            semaphore: self,
            released: false,
        })
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(1)
    }
}

/// RAII guard for a Semaphore permit (released on drop)
#[must_use = "the permit is released as soon as the guard is dropped"]
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
    released: bool,
}

impl SemaphoreGuard<'_> {
    /// Release the permit before the guard goes out of scope
    pub fn release(mut self) {
        self.released = true;
        self.semaphore.release();
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.semaphore.release();
        }
    }
}
