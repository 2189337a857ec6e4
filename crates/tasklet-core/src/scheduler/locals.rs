//! Per-task state registry
//!
//! Each tasklet record embeds one `TaskLocals` map keyed by type. Only the
//! owning tasklet reaches it (through `Tasklet::with_current_locals`), so
//! there is never cross-task contention on an entry.

use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};

/// Type-keyed storage owned by a single tasklet
#[derive(Default)]
pub struct TaskLocals {
    values: FxHashMap<TypeId, Box<dyn Any + Send>>,
}

impl TaskLocals {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared reference to the `T` entry
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Mutable reference to the `T` entry
    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Mutable reference to the `T` entry, creating it first if missing
    pub fn get_or_insert_with<T: Any + Send>(&mut self, init: impl FnOnce() -> T) -> &mut T {
        let slot = self
            .values
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(init()));
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("task-local entry stored under a foreign TypeId"),
        }
    }

    /// Store `value`, returning the previous `T` entry
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Remove and return the `T` entry
    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Whether a `T` entry exists
    pub fn contains<T: Any + Send>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    #[test]
    fn test_insert_and_get() {
        let mut locals = TaskLocals::new();
        assert!(locals.is_empty());

        assert_eq!(locals.insert(Counter(1)), None);
        assert_eq!(locals.get::<Counter>(), Some(&Counter(1)));
        assert_eq!(locals.insert(Counter(2)), Some(Counter(1)));
        assert_eq!(locals.len(), 1);
    }

    #[test]
    fn test_get_or_insert_with_is_lazy() {
        let mut locals = TaskLocals::new();

        locals.get_or_insert_with(|| Counter(10)).0 += 1;
        locals.get_or_insert_with(|| Counter(100)).0 += 1;

        assert_eq!(locals.get::<Counter>(), Some(&Counter(12)));
    }

    #[test]
    fn test_entries_are_keyed_by_type() {
        let mut locals = TaskLocals::new();
        locals.insert(Counter(5));
        locals.insert(String::from("name"));

        assert_eq!(locals.len(), 2);
        assert_eq!(locals.get::<String>().map(String::as_str), Some("name"));
        assert!(locals.get::<u64>().is_none());
    }

    #[test]
    fn test_remove() {
        let mut locals = TaskLocals::new();
        locals.insert(Counter(3));

        assert!(locals.contains::<Counter>());
        assert_eq!(locals.remove::<Counter>(), Some(Counter(3)));
        assert!(!locals.contains::<Counter>());
        assert_eq!(locals.remove::<Counter>(), None);
    }
}
