//! Task-aware Lock (binary semaphore)

use crate::scheduler::{TaskId, Tasklet};
use crate::sync::Semaphore;
use crate::time::Timeout;
use crate::TaskletResult;
use crossbeam::atomic::AtomicCell;

/// Non-reentrant lock built on a one-permit Semaphore
///
/// The holder marker is informational only: any tasklet may release the
/// lock, including one that never acquired it.
pub struct Lock {
    semaphore: Semaphore,
    holder: AtomicCell<Option<TaskId>>,
}

impl Lock {
    /// Create an unlocked lock
    pub fn new() -> Self {
        Self {
            semaphore: Semaphore::new(1),
            holder: AtomicCell::new(None),
        }
    }

    /// Take the lock (same contract as `Semaphore::acquire`)
    pub fn acquire(&self, blocking: bool, timeout: Timeout) -> TaskletResult<bool> {
        let acquired = self.semaphore.acquire(blocking, timeout)?;
        if acquired {
            self.holder.store(Some(Tasklet::current_id()));
        }
        Ok(acquired)
    }

    /// Take the lock without blocking
    pub fn try_acquire(&self) -> bool {
        let acquired = self.semaphore.try_acquire();
        if acquired {
            self.holder.store(Some(Tasklet::current_id()));
        }
        acquired
    }

    /// Release the lock, waking the oldest waiter if any
    pub fn release(&self) {
        self.holder.store(None);
        self.semaphore.release();
    }

    /// Whether the lock is currently held (no free permit)
    pub fn is_locked(&self) -> bool {
        self.semaphore.count() == 0
    }

    /// Tasklet that last acquired the lock, while it is held
    pub fn holder(&self) -> Option<TaskId> {
        self.holder.load()
    }

    /// Number of tasklets waiting for the lock
    pub fn waiting(&self) -> usize {
        self.semaphore.waiting()
    }

    /// Scoped acquisition bounded by the current deadline
    pub fn access(&self) -> TaskletResult<LockGuard<'_>> {
        self.access_with(Timeout::Current)
    }

    /// Scoped acquisition with an explicit timeout
    pub fn access_with(&self, timeout: Timeout) -> TaskletResult<LockGuard<'_>> {
        self.acquire(true, timeout)?;
        Ok(LockGuard {
            lock: self,
            released: false,
        })
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for Lock (auto-releases on drop)
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
    released: bool,
}

impl LockGuard<'_> {
    /// Release the lock before the guard goes out of scope
    pub fn release(mut self) {
        self.released = true;
        self.lock.release();
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.lock.release();
        }
    }
}
