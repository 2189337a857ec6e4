//! Synchronization primitives for Tasklet coordination
//!
//! These primitives block at the tasklet level: a tasklet that cannot
//! proceed parks on a `WaiterQueue` entry, bounded by the deadline resolved
//! from its timeout stack, and is resumed in strict FIFO order.

mod channel;
mod deque;
mod lock;
mod pool;
mod semaphore;
mod waiter;

pub use channel::{Channel, TrySendError};
pub use deque::Deque;
pub use lock::{Lock, LockGuard};
pub use pool::TaskletPool;
pub use semaphore::{Semaphore, SemaphoreGuard};
pub use waiter::{WaiterHandle, WaiterQueue};
