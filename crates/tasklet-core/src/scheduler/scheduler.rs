//! Thread-backed tasklet scheduling
//!
//! Every spawned tasklet runs on its own named thread; a thread that touches
//! the runtime without being spawned (e.g. `main` or a test thread) is
//! adopted as a root tasklet. Suspension never spins: the calling thread
//! parks on a `ResumeToken` until signaled or until its deadline passes.

use crate::config::RuntimeConfig;
use crate::join::JoinError;
use crate::scheduler::{
    ResumeToken, TaskHandle, TaskId, TaskLocals, TaskState, Tasklet, WakeOutcome,
};
use crate::time::Deadline;
use crate::{TaskletError, TaskletResult};
use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

thread_local! {
    static CURRENT: RefCell<Option<Arc<Tasklet>>> = const { RefCell::new(None) };
}

impl Tasklet {
    /// The calling tasklet
    ///
    /// A thread that was not spawned as a tasklet is adopted as a root
    /// tasklet the first time it asks.
    pub fn current() -> Arc<Tasklet> {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(|| {
                    let name = thread::current().name().map(str::to_string);
                    let root = Arc::new(Tasklet::new(None, name, TaskState::Running));
                    debug!(task = %root.id(), "adopted thread as root tasklet");
                    root
                })
                .clone()
        })
    }

    /// ID of the calling tasklet
    pub fn current_id() -> TaskId {
        Tasklet::current().id()
    }

    /// Run `f` against the calling tasklet's local registry
    ///
    /// Other tasklets' registries are not reachable.
    pub fn with_current_locals<R>(f: impl FnOnce(&mut TaskLocals) -> R) -> R {
        Tasklet::current().with_locals(f)
    }

    /// Spawn a child of the current tasklet
    ///
    /// An `Err` returned by `f`, or a panic inside it, is recorded as the
    /// child's outcome and surfaces through join.
    ///
    /// The parent keeps each child, outcome included, until it is joined.
    /// Fire-and-forget work should go through `Tasklet::builder().detached()`
    /// instead, or a long-lived parent accumulates every child it spawns.
    pub fn spawn<F, T>(f: F) -> TaskletResult<TaskHandle<T>>
    where
        F: FnOnce() -> TaskletResult<T> + Send + 'static,
        T: Send + 'static,
    {
        Builder::new().spawn(f)
    }

    /// Builder for named or detached tasklets
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Suspend the current tasklet for `duration`
    ///
    /// Fails with `Timeout` if the tasklet's active deadline expires first.
    pub fn sleep(duration: Duration) -> TaskletResult<()> {
        let task = Tasklet::current();
        let wake_at = Deadline::after(duration);
        let bound = wake_at.tighter(task.deadline());

        // Nobody signals this token; it always resolves by expiry
        let token = ResumeToken::<()>::new();
        suspend(&token, bound);

        if bound == wake_at {
            Ok(())
        } else {
            Err(TaskletError::Timeout)
        }
    }

    /// Give other tasklets a chance to run
    pub fn yield_now() {
        thread::yield_now();
    }
}

/// Park the current tasklet on `token` until it is resolved or `deadline` passes
pub fn suspend<T>(token: &ResumeToken<T>, deadline: Deadline) -> WakeOutcome<T> {
    let task = Tasklet::current();
    task.set_state(TaskState::Suspended);
    trace!(task = %task.id(), ?deadline, "tasklet suspended");

    let outcome = token.park(deadline);

    task.set_state(TaskState::Running);
    trace!(task = %task.id(), signaled = outcome.is_signaled(), "tasklet resumed");
    outcome
}

/// Tasklet factory, used to set a name or detach from the spawning tasklet
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<String>,
    detached: bool,
}

impl Builder {
    /// Builder with default settings (unnamed, child of the current tasklet)
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the tasklet (also used for the backing thread name)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Do not register the tasklet as a child of the current one
    ///
    /// Detached tasklets are invisible to `join_children` and the parent
    /// keeps no record of them. Use this for fire-and-forget work.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Start the tasklet
    pub fn spawn<F, T>(self, f: F) -> TaskletResult<TaskHandle<T>>
    where
        F: FnOnce() -> TaskletResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let config = RuntimeConfig::global();
        let parent = Tasklet::current();
        let task = Arc::new(Tasklet::new(Some(parent.id()), self.name, TaskState::Created));

        if !self.detached {
            parent.add_child(task.clone());
        }

        let thread_name = match task.name() {
            Some(name) => format!("{}-{}", config.thread_name_prefix, name),
            None => format!("{}-{}", config.thread_name_prefix, task.id().as_u64()),
        };

        let child = task.clone();
        let spawned = thread::Builder::new()
            .name(thread_name)
            .stack_size(config.stack_size)
            .spawn(move || run_tasklet(child, f));

        if let Err(err) = spawned {
            parent.remove_child(task.id());
            return Err(TaskletError::Spawn(err.to_string()));
        }

        debug!(task = %task.id(), parent = %parent.id(), detached = self.detached, "tasklet spawned");
        Ok(TaskHandle::new(task))
    }
}

fn run_tasklet<F, T>(task: Arc<Tasklet>, f: F)
where
    F: FnOnce() -> TaskletResult<T>,
    T: Send + 'static,
{
    CURRENT.with(|current| *current.borrow_mut() = Some(task.clone()));
    task.set_state(TaskState::Running);

    let outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(Box::new(value) as Box<dyn Any + Send>),
        Ok(Err(err)) => {
            debug!(task = %task.id(), error = %err, "tasklet failed");
            Err(JoinError::Failed(Box::new(err)))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            debug!(task = %task.id(), panic = %message, "tasklet panicked");
            Err(JoinError::Panicked(message))
        }
    };

    task.complete(outcome);
    debug!(task = %task.id(), state = ?task.state(), "tasklet finished");
    CURRENT.with(|current| current.borrow_mut().take());
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
