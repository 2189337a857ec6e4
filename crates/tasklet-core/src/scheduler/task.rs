//! Tasklet record and handles

use crate::join::JoinError;
use crate::scheduler::TaskLocals;
use crate::sync::WaiterQueue;
use crate::time::Deadline;
use crate::{TaskletError, TaskletResult};
use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a Tasklet
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a TaskId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        TaskId(id)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of a Tasklet
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Created, backing thread not yet running
    Created,
    /// Currently executing
    Running,
    /// Parked on a resume token
    Suspended,
    /// Completed with a value
    Completed,
    /// Returned an error or panicked
    Failed,
}

/// Boxed outcome of a finished tasklet
pub(crate) type TaskOutcome = Result<Box<dyn Any + Send>, JoinError>;

struct Completion {
    done: bool,
    outcome: Option<TaskOutcome>,
    waiters: WaiterQueue,
}

/// A lightweight cooperatively scheduled task
pub struct Tasklet {
    /// Unique identifier
    id: TaskId,

    /// Optional human-readable name
    name: Option<String>,

    /// Spawning tasklet (None for adopted root threads)
    parent: Option<TaskId>,

    /// Current state
    state: AtomicCell<TaskState>,

    /// Active deadline (top of the timeout stack)
    deadline: Mutex<Deadline>,

    /// Children in spawn order, until joined
    children: Mutex<Vec<Arc<Tasklet>>>,

    /// Per-task registry (timeout stack and friends)
    locals: Mutex<TaskLocals>,

    /// Result slot plus tasklets waiting for it
    completion: Mutex<Completion>,
}

impl Tasklet {
    pub(crate) fn new(parent: Option<TaskId>, name: Option<String>, state: TaskState) -> Self {
        Self {
            id: TaskId::new(),
            name,
            parent,
            state: AtomicCell::new(state),
            deadline: Mutex::new(Deadline::Never),
            children: Mutex::new(Vec::new()),
            locals: Mutex::new(TaskLocals::new()),
            completion: Mutex::new(Completion {
                done: false,
                outcome: None,
                waiters: WaiterQueue::new(),
            }),
        }
    }

    /// Get the Tasklet's unique ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the Tasklet's name, if it was given one
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the parent task ID (if any)
    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    /// Get the current state
    pub fn state(&self) -> TaskState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state);
    }

    /// Active deadline of this tasklet
    pub fn deadline(&self) -> Deadline {
        *self.deadline.lock()
    }

    /// Install a new active deadline
    ///
    /// Normally driven by `timeout::push` / `timeout::pop`; setting it
    /// directly bypasses the timeout stack.
    pub(crate) fn set_deadline(&self, deadline: Deadline) {
        *self.deadline.lock() = deadline;
    }

    /// IDs of children not yet joined, in spawn order
    pub fn children(&self) -> Vec<TaskId> {
        self.children.lock().iter().map(|child| child.id).collect()
    }

    /// Whether the tasklet has finished (successfully or not)
    pub fn is_done(&self) -> bool {
        self.completion.lock().done
    }

    /// Run `f` against this tasklet's local registry
    pub(crate) fn with_locals<R>(&self, f: impl FnOnce(&mut TaskLocals) -> R) -> R {
        f(&mut self.locals.lock())
    }

    pub(crate) fn add_child(&self, child: Arc<Tasklet>) {
        self.children.lock().push(child);
    }

    pub(crate) fn remove_child(&self, id: TaskId) {
        self.children.lock().retain(|child| child.id != id);
    }

    pub(crate) fn child_records(&self) -> Vec<Arc<Tasklet>> {
        self.children.lock().clone()
    }

    pub(crate) fn forget_children(&self, ids: &[TaskId]) {
        self.children.lock().retain(|child| !ids.contains(&child.id));
    }

    /// Record the outcome and wake every tasklet waiting on it
    pub(crate) fn complete(&self, outcome: TaskOutcome) {
        self.set_state(if outcome.is_ok() {
            TaskState::Completed
        } else {
            TaskState::Failed
        });
        let mut completion = self.completion.lock();
        completion.done = true;
        completion.outcome = Some(outcome);
        completion.waiters.wake_all();
    }

    /// Wait until the tasklet finishes or `deadline` expires
    pub(crate) fn wait_done(&self, deadline: Deadline) -> TaskletResult<()> {
        let waiter = {
            let mut completion = self.completion.lock();
            if completion.done {
                return Ok(());
            }
            completion.waiters.enqueue()
        };

        if waiter.park(deadline).is_signaled() {
            return Ok(());
        }
        self.completion.lock().waiters.remove(waiter.id());
        Err(TaskletError::Timeout)
    }

    /// Take the finished value out as a `T`
    pub(crate) fn take_outcome<T: Any>(&self) -> Result<T, JoinError> {
        match self.completion.lock().outcome.take() {
            None => Err(JoinError::AlreadyJoined),
            Some(Err(err)) => Err(err),
            Some(Ok(value)) => value
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| JoinError::TypeMismatch),
        }
    }
}

impl fmt::Debug for Tasklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tasklet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("state", &self.state())
            .finish()
    }
}

/// Handle for awaiting a Tasklet's result
pub struct TaskHandle<T> {
    task: Arc<Tasklet>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(task: Arc<Tasklet>) -> Self {
        Self {
            task,
            _phantom: PhantomData,
        }
    }

    /// Get the task ID
    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    /// The underlying tasklet record
    pub fn tasklet(&self) -> &Arc<Tasklet> {
        &self.task
    }

    /// Whether the tasklet has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_done()
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self::new(self.task.clone())
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("task", &self.task).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_task_id_uniqueness() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
        assert_eq!(TaskId::from_u64(id1.as_u64()), id1);
    }

    #[test]
    fn test_task_creation() {
        let parent = TaskId::new();
        let task = Tasklet::new(Some(parent), Some("worker".to_string()), TaskState::Created);

        assert_eq!(task.parent(), Some(parent));
        assert_eq!(task.name(), Some("worker"));
        assert_eq!(task.state(), TaskState::Created);
        assert_eq!(task.deadline(), Deadline::Never);
        assert!(task.children().is_empty());
        assert!(!task.is_done());
    }

    #[test]
    fn test_task_state_transitions() {
        let task = Tasklet::new(None, None, TaskState::Created);

        task.set_state(TaskState::Running);
        assert_eq!(task.state(), TaskState::Running);

        task.set_state(TaskState::Suspended);
        assert_eq!(task.state(), TaskState::Suspended);

        task.complete(Ok(Box::new(1u8)));
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[test]
    fn test_take_outcome_once() {
        let task = Tasklet::new(None, None, TaskState::Running);
        task.complete(Ok(Box::new(42i32)));

        assert!(task.is_done());
        assert_eq!(task.take_outcome::<i32>(), Ok(42));
        assert_eq!(task.take_outcome::<i32>(), Err(JoinError::AlreadyJoined));
    }

    #[test]
    fn test_take_outcome_type_mismatch() {
        let task = Tasklet::new(None, None, TaskState::Running);
        task.complete(Ok(Box::new("text")));

        assert_eq!(task.take_outcome::<u64>(), Err(JoinError::TypeMismatch));
    }

    #[test]
    fn test_failed_outcome() {
        let task = Tasklet::new(None, None, TaskState::Running);
        task.complete(Err(JoinError::Panicked("boom".to_string())));

        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(
            task.take_outcome::<()>(),
            Err(JoinError::Panicked("boom".to_string()))
        );
    }

    #[test]
    fn test_wait_done_times_out_without_leaking_waiter() {
        let task = Tasklet::new(None, None, TaskState::Running);

        let result = task.wait_done(Deadline::after(Duration::from_millis(10)));
        assert_eq!(result, Err(TaskletError::Timeout));
        assert!(task.completion.lock().waiters.is_empty());

        task.complete(Ok(Box::new(())));
        assert_eq!(task.wait_done(Deadline::Never), Ok(()));
    }

    #[test]
    fn test_children_bookkeeping() {
        let parent = Tasklet::new(None, None, TaskState::Running);
        let a = Arc::new(Tasklet::new(Some(parent.id()), None, TaskState::Created));
        let b = Arc::new(Tasklet::new(Some(parent.id()), None, TaskState::Created));

        parent.add_child(a.clone());
        parent.add_child(b.clone());
        assert_eq!(parent.children(), vec![a.id(), b.id()]);

        parent.remove_child(a.id());
        assert_eq!(parent.children(), vec![b.id()]);

        parent.forget_children(&[b.id()]);
        assert!(parent.children().is_empty());
    }
}
