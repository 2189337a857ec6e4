//! Waiting for spawned tasklets and collecting their results
//!
//! Join aggregates: each child's outcome is reported on its own, in spawn
//! order, and a failed or panicked child never fails the join as a whole.
//! The only error a join itself raises is `Timeout`, when its deadline
//! expires before every awaited tasklet has finished. After a timeout the
//! unfinished children stay registered and can be joined again later.

use crate::scheduler::{TaskHandle, TaskId, Tasklet};
use crate::time::{Deadline, Timeout};
use crate::{TaskletError, TaskletResult};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Why a joined tasklet produced no value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// The tasklet returned an error
    #[error("tasklet failed: {0}")]
    Failed(Box<TaskletError>),

    /// The tasklet panicked
    #[error("tasklet panicked: {0}")]
    Panicked(String),

    /// The value is not of the type the joiner asked for
    #[error("tasklet result has a different type")]
    TypeMismatch,

    /// The value was already taken by an earlier join
    #[error("tasklet was already joined")]
    AlreadyJoined,
}

impl JoinError {
    /// The error returned by the tasklet, if it returned one
    pub fn tasklet_error(&self) -> Option<&TaskletError> {
        match self {
            JoinError::Failed(err) => Some(&**err),
            _ => None,
        }
    }

    /// Whether the tasklet panicked
    pub fn is_panic(&self) -> bool {
        matches!(self, JoinError::Panicked(_))
    }
}

/// Per-child outcomes in spawn order
pub type JoinResults<T> = Vec<(TaskId, Result<T, JoinError>)>;

impl<T: Any> TaskHandle<T> {
    /// Wait for the tasklet and take its value
    ///
    /// A failure inside the tasklet comes back as `TaskletError::Join`.
    pub fn join(self, timeout: Timeout) -> TaskletResult<T> {
        let current = Tasklet::current();
        let deadline = timeout.resolve(current.deadline());
        let task = self.tasklet();

        task.wait_done(deadline)?;
        if task.parent() == Some(current.id()) {
            current.remove_child(task.id());
        }
        Ok(task.take_outcome::<T>()?)
    }
}

impl Tasklet {
    /// Wait for every child of the calling tasklet and collect the results
    ///
    /// Children spawned while the join is waiting are not part of it.
    pub fn join_children<T: Any>(timeout: Timeout) -> TaskletResult<JoinResults<T>> {
        let current = Tasklet::current();
        let deadline = timeout.resolve(current.deadline());
        let children = current.child_records();

        wait_all(&children, deadline)?;

        let ids: Vec<TaskId> = children.iter().map(|child| child.id()).collect();
        current.forget_children(&ids);
        debug!(task = %current.id(), joined = ids.len(), "children joined");

        Ok(children
            .iter()
            .map(|child| (child.id(), child.take_outcome::<T>()))
            .collect())
    }
}

/// Join an explicit set of handles, returning their outcomes in order
pub fn join_all<T: Any>(
    handles: impl IntoIterator<Item = TaskHandle<T>>,
    timeout: Timeout,
) -> TaskletResult<Vec<Result<T, JoinError>>> {
    let current = Tasklet::current();
    let deadline = timeout.resolve(current.deadline());
    let tasks: Vec<Arc<Tasklet>> = handles
        .into_iter()
        .map(|handle| handle.tasklet().clone())
        .collect();

    wait_all(&tasks, deadline)?;

    let owned: Vec<TaskId> = tasks
        .iter()
        .filter(|task| task.parent() == Some(current.id()))
        .map(|task| task.id())
        .collect();
    current.forget_children(&owned);

    Ok(tasks.iter().map(|task| task.take_outcome::<T>()).collect())
}

fn wait_all(tasks: &[Arc<Tasklet>], deadline: Deadline) -> TaskletResult<()> {
    for task in tasks {
        task.wait_done(deadline)?;
    }
    Ok(())
}
