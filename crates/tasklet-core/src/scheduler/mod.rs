//! Scheduler adapter: thread-backed tasklets
//!
//! Provides what the blocking primitives consume from a scheduler: the
//! current task's identity and deadline, suspension bounded by a deadline,
//! resumption through single-use tokens, spawning with parent/child
//! tracking, and sleep.

mod locals;
mod park;
#[allow(clippy::module_inception)]
mod scheduler;
mod task;

pub use locals::TaskLocals;
pub use park::{ResumeToken, WakeOutcome};
pub use scheduler::{suspend, Builder};
pub use task::{TaskHandle, TaskId, TaskState, Tasklet};

pub(crate) use scheduler::panic_message;
