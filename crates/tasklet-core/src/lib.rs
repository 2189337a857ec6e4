//! Tasklet Core Runtime
//!
//! Lightweight tasks ("tasklets") that suspend only at explicit points, plus
//! everything they need to cooperate under deadlines:
//! - Per-task timeout stack (`timeout::push` / `timeout::pop`) whose nested
//!   deadlines compose by taking the tighter one
//! - Blocking primitives that honor the active deadline (Semaphore, Lock,
//!   Deque, Channel)
//! - A fixed-size worker pool for deferred calls (TaskletPool)
//! - Fan-in over spawned children (`Tasklet::join_children`)
//!
//! Tasklets are backed by dedicated threads; a suspended tasklet parks on a
//! single-use resume token and never spins.
//!
//! # Cost model
//!
//! Every tasklet is its own OS thread, with a 2 MB stack unless
//! `RuntimeConfig::stack_size` (or `TASKLET_STACK_SIZE`) says otherwise.
//! Suspending a tasklet blocks that thread until it is resumed or its
//! deadline passes. Tasklets are therefore not multiplexed onto a few
//! execution contexts: spawning tens of thousands of them costs as many
//! threads. Bound fan-out with a `TaskletPool` when the work allows it.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod join;
pub mod scheduler;
pub mod sync;
pub mod time;
pub mod timeout;

pub use config::RuntimeConfig;
pub use join::{join_all, JoinError, JoinResults};
pub use scheduler::{
    Builder, ResumeToken, TaskHandle, TaskId, TaskLocals, TaskState, Tasklet, WakeOutcome,
};
pub use sync::{
    Channel, Deque, Lock, LockGuard, Semaphore, SemaphoreGuard, TaskletPool, TrySendError,
    WaiterHandle, WaiterQueue,
};
pub use time::{Deadline, Timeout};
pub use timeout::TimeoutGuard;

/// Tasklet runtime errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskletError {
    /// A blocking operation's deadline expired before it could complete
    #[error("Timed out")]
    Timeout,

    /// Caller broke a usage contract (unmatched pop, invalid stack state)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Non-blocking pop on an empty deque
    #[error("Deque is empty")]
    Empty,

    /// Channel was closed
    #[error("Channel closed")]
    Closed,

    /// A joined tasklet did not produce a value
    #[error("Join failed: {0}")]
    Join(#[from] JoinError),

    /// Invalid argument or configuration value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing thread for a tasklet could not be started
    #[error("Failed to spawn tasklet: {0}")]
    Spawn(String),
}

/// Tasklet runtime result
pub type TaskletResult<T> = Result<T, TaskletError>;
