//! Per-tasklet timeout stack
//!
//! `push` opens a deadline scope for the calling tasklet and `pop` closes
//! it. Scopes nest, and a nested scope can only shorten the deadline in
//! effect: pushing 5s inside a 30s scope leaves 5s; pushing 60s inside it
//! still leaves 30s. Every blocking primitive resolves its own timeout
//! against the deadline these scopes install.
//!
//! ```ignore
//! let _scope = timeout::push(Timeout::secs(30.0));
//! semaphore.acquire(true, Timeout::Current)?; // fails after 30s at most
//! ```

mod stack;

pub use stack::{ScopeId, TimeoutStack};

use crate::scheduler::Tasklet;
use crate::time::{Deadline, Timeout};
use crate::{TaskletError, TaskletResult};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Open a deadline scope for the calling tasklet
///
/// The returned guard pops the scope when dropped, including on early
/// return and panic unwinding.
pub fn push(timeout: Timeout) -> TimeoutGuard {
    let task = Tasklet::current();
    let (deadline, scope, depth) = task.with_locals(|locals| {
        let stack = locals.get_or_insert_with(|| TimeoutStack::new(task.deadline()));
        let deadline = stack.push(timeout);
        (deadline, stack.top_scope(), stack.depth())
    });
    task.set_deadline(deadline);
    debug!(task = %task.id(), depth, remaining = ?deadline.remaining(), "timeout pushed");

    TimeoutGuard {
        task,
        scope,
        popped: false,
        _not_send: PhantomData,
    }
}

/// Close the innermost deadline scope of the calling tasklet
///
/// Fails with `Protocol` when nothing was pushed.
pub fn pop() -> TaskletResult<()> {
    pop_for(&Tasklet::current()).map(|_| ())
}

/// Time left before the calling tasklet's active deadline, `None` for never
pub fn current() -> Option<Duration> {
    Tasklet::current().deadline().remaining()
}

/// Deadline scopes currently open on the calling tasklet
pub fn depth() -> usize {
    Tasklet::current()
        .with_locals(|locals| locals.get::<TimeoutStack>().map_or(0, TimeoutStack::depth))
}

/// Run `f` inside a deadline scope
///
/// An error from `f` takes precedence over a failure to close the scope.
pub fn scope<R>(timeout: Timeout, f: impl FnOnce() -> TaskletResult<R>) -> TaskletResult<R> {
    let guard = push(timeout);
    let result = f();
    let popped = guard.pop();
    let value = result?;
    popped?;
    Ok(value)
}

fn pop_for(task: &Tasklet) -> TaskletResult<Deadline> {
    let (restored, depth) = task.with_locals(|locals| {
        let stack = locals.get_mut::<TimeoutStack>().ok_or_else(|| {
            TaskletError::Protocol("no timeout was pushed for the current task".to_string())
        })?;
        let restored = stack.pop()?;
        let depth = stack.depth();
        if depth == 0 {
            locals.remove::<TimeoutStack>();
        }
        Ok::<_, TaskletError>((restored, depth))
    })?;

    task.set_deadline(restored);
    debug!(task = %task.id(), depth, remaining = ?restored.remaining(), "timeout popped");
    Ok(restored)
}

/// Close the scope a guard opened, along with any scope still open inside it
///
/// Inner scopes are closed even when reported as an error.
fn close_for(task: &Tasklet, scope: ScopeId) -> TaskletResult<Deadline> {
    let (restored, depth, inner) = task.with_locals(|locals| {
        let stack = locals.get_mut::<TimeoutStack>().ok_or_else(|| {
            TaskletError::Protocol("timeout scope was already closed".to_string())
        })?;
        let (restored, inner) = stack.close(scope)?;
        let depth = stack.depth();
        if depth == 0 {
            locals.remove::<TimeoutStack>();
        }
        Ok::<_, TaskletError>((restored, depth, inner))
    })?;

    task.set_deadline(restored);
    debug!(task = %task.id(), depth, remaining = ?restored.remaining(), "timeout popped");
    if inner > 0 {
        return Err(TaskletError::Protocol(format!(
            "timeout scope closed with {inner} inner scope(s) still open"
        )));
    }
    Ok(restored)
}

/// Open deadline scope; closes that scope on drop
///
/// Closing a guard also closes any scope pushed after it that is still
/// open. A guard whose scope is already gone does nothing. Tied to the
/// tasklet that pushed it, so it cannot be sent elsewhere.
#[must_use = "the timeout is popped as soon as the guard is dropped"]
pub struct TimeoutGuard {
    task: Arc<Tasklet>,
    scope: ScopeId,
    popped: bool,
    _not_send: PhantomData<*const ()>,
}

impl TimeoutGuard {
    /// Pop now, reporting a broken push/pop pairing instead of logging it
    pub fn pop(mut self) -> TaskletResult<()> {
        self.popped = true;
        close_for(&self.task, self.scope).map(|_| ())
    }

    /// Deadline in effect for the guarded tasklet
    pub fn deadline(&self) -> Deadline {
        self.task.deadline()
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        if self.popped {
            return;
        }
        if let Err(err) = close_for(&self.task, self.scope) {
            warn!(task = %self.task.id(), error = %err, "timeout guard could not pop");
        }
    }
}
