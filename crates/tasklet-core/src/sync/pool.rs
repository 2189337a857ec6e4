//! Fixed-size pool of worker tasklets for deferred calls

use crate::config::RuntimeConfig;
use crate::scheduler::{panic_message, TaskHandle, TaskId, Tasklet};
use crate::sync::Deque;
use crate::time::Timeout;
use crate::{TaskletError, TaskletResult};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() -> TaskletResult<()> + Send + 'static>;

enum PoolMessage {
    Run(Job),
    Stop,
}

/// Pool of `N` worker tasklets draining one shared, unbounded work queue
///
/// Jobs are fire-and-forget: a job's error is logged, a panic is caught and
/// logged, and the worker moves on to the next job. With `N` workers and `M`
/// independent jobs of duration `t`, the queue drains in `ceil(M/N) * t`.
///
/// Workers are detached tasklets, so they never show up in the creating
/// tasklet's `join_children`. Dropping the pool lets queued jobs finish and
/// then stops every worker.
pub struct TaskletPool {
    queue: Arc<Deque<PoolMessage>>,
    workers: Vec<TaskHandle<()>>,
}

impl TaskletPool {
    /// Start a pool with `workers` worker tasklets
    pub fn new(workers: usize) -> TaskletResult<Self> {
        if workers == 0 {
            return Err(TaskletError::InvalidArgument(
                "tasklet pool needs at least one worker".to_string(),
            ));
        }

        let queue = Arc::new(Deque::new());
        let mut pool = Self {
            queue,
            workers: Vec::with_capacity(workers),
        };

        for index in 0..workers {
            let queue = pool.queue.clone();
            // On failure, dropping `pool` stops the workers already started
            let handle = Tasklet::builder()
                .name(format!("pool-{}", index))
                .detached()
                .spawn(move || worker_loop(index, queue))?;
            pool.workers.push(handle);
        }

        debug!(workers, "tasklet pool started");
        Ok(pool)
    }

    /// Start a pool sized by `config.pool_workers`
    pub fn with_config(config: &RuntimeConfig) -> TaskletResult<Self> {
        Self::new(config.effective_pool_workers())
    }

    /// Queue `job` for the next free worker; never blocks
    pub fn defer<F>(&self, job: F)
    where
        F: FnOnce() -> TaskletResult<()> + Send + 'static,
    {
        self.queue.append(PoolMessage::Run(Box::new(job)));
    }

    /// Number of worker tasklets
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// IDs of the worker tasklets
    pub fn worker_ids(&self) -> Vec<TaskId> {
        self.workers.iter().map(TaskHandle::task_id).collect()
    }

    /// Jobs queued but not yet picked up
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for TaskletPool {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            self.queue.append(PoolMessage::Stop);
        }
    }
}

fn worker_loop(index: usize, queue: Arc<Deque<PoolMessage>>) -> TaskletResult<()> {
    loop {
        match queue.popleft(true, Timeout::Never)? {
            PoolMessage::Stop => break,
            PoolMessage::Run(job) => match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(worker = index, error = %err, "deferred job failed");
                }
                Err(payload) => {
                    error!(
                        worker = index,
                        panic = %panic_message(payload.as_ref()),
                        "deferred job panicked"
                    );
                }
            },
        }
    }
    debug!(worker = index, "pool worker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            TaskletPool::new(0),
            Err(TaskletError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_default_config_size() {
        let pool = TaskletPool::with_config(&RuntimeConfig::default()).unwrap();
        assert_eq!(pool.worker_count(), 5);
        assert_eq!(pool.worker_ids().len(), 5);
    }

    #[test]
    fn test_workers_are_detached() {
        let pool = TaskletPool::new(2).unwrap();
        let children = Tasklet::current().children();
        for id in pool.worker_ids() {
            assert!(!children.contains(&id));
        }
    }

    #[test]
    fn test_jobs_run() {
        let pool = TaskletPool::new(2).unwrap();
        let results = Arc::new(Deque::new());

        for i in 0..6 {
            let results = results.clone();
            pool.defer(move || {
                results.append(i * 10);
                Ok(())
            });
        }

        let mut seen: Vec<i32> = (0..6)
            .map(|_| results.popleft(true, Timeout::secs(5.0)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_failures_do_not_kill_workers() {
        let pool = TaskletPool::new(1).unwrap();
        let results = Arc::new(Deque::new());

        pool.defer(|| Err(TaskletError::Protocol("job error".to_string())));
        pool.defer(|| panic!("job panic"));
        let sink = results.clone();
        pool.defer(move || {
            sink.append("still alive");
            Ok(())
        });

        assert_eq!(results.popleft(true, Timeout::secs(5.0)), Ok("still alive"));
    }

    #[test]
    fn test_drop_drains_queue_then_stops() {
        let results = Arc::new(Deque::new());
        let handles = {
            let pool = TaskletPool::new(1).unwrap();
            for i in 0..3 {
                let results = results.clone();
                pool.defer(move || {
                    Tasklet::sleep(Duration::from_millis(5))?;
                    results.append(i);
                    Ok(())
                });
            }
            pool.workers.clone()
        };

        for handle in handles {
            handle.join(Timeout::secs(5.0)).unwrap();
        }
        assert_eq!(results.len(), 3);
    }
}
