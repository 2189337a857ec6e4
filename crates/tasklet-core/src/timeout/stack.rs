//! Stack of nested deadlines for one tasklet

use crate::time::{Deadline, Timeout};
use crate::{TaskletError, TaskletResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one pushed deadline scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Scope of the base entry, never closed
    const BASE: ScopeId = ScopeId(0);

    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ScopeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Deadline,
    scope: ScopeId,
}

/// Nested deadlines of a single tasklet, innermost on top
///
/// The bottom entry is the deadline the tasklet had when the stack was
/// created and is never popped. Every pushed entry is already resolved
/// against the entry below it, so the top is always the tightest deadline
/// in effect.
#[derive(Debug, Clone)]
pub struct TimeoutStack {
    entries: Vec<Entry>,
}

impl TimeoutStack {
    /// Stack whose bottom entry is `base`
    pub fn new(base: Deadline) -> Self {
        Self {
            entries: vec![Entry {
                deadline: base,
                scope: ScopeId::BASE,
            }],
        }
    }

    /// Deadline currently in effect
    pub fn top(&self) -> Deadline {
        match self.entries.last() {
            Some(entry) => entry.deadline,
            None => unreachable!("timeout stack lost its base entry"),
        }
    }

    /// Scope of the innermost entry
    pub fn top_scope(&self) -> ScopeId {
        match self.entries.last() {
            Some(entry) => entry.scope,
            None => unreachable!("timeout stack lost its base entry"),
        }
    }

    /// Compose `timeout` with the current top and push the result
    pub fn push(&mut self, timeout: Timeout) -> Deadline {
        let deadline = timeout.resolve(self.top());
        self.entries.push(Entry {
            deadline,
            scope: ScopeId::next(),
        });
        deadline
    }

    /// Drop the top entry and return the one now in effect
    pub fn pop(&mut self) -> TaskletResult<Deadline> {
        if self.entries.len() <= 1 {
            return Err(TaskletError::Protocol(
                "unmatched timeout pop, did you forget to push?".to_string(),
            ));
        }
        self.entries.pop();
        Ok(self.top())
    }

    /// Close `scope` together with every scope opened inside it
    ///
    /// Returns the deadline now in effect and the number of inner scopes
    /// that were still open. Fails with `Protocol` when `scope` is no
    /// longer on the stack; the stack is then left untouched.
    pub fn close(&mut self, scope: ScopeId) -> TaskletResult<(Deadline, usize)> {
        let position = self
            .entries
            .iter()
            .skip(1)
            .position(|entry| entry.scope == scope)
            .ok_or_else(|| {
                TaskletError::Protocol("timeout scope was already closed".to_string())
            })?
            + 1;
        let inner = self.entries.len() - position - 1;
        self.entries.truncate(position);
        Ok((self.top(), inner))
    }

    /// Pushes not yet popped
    pub fn depth(&self) -> usize {
        self.entries.len() - 1
    }

    /// Whether every push has been popped
    pub fn is_balanced(&self) -> bool {
        self.depth() == 0
    }
}
