//! Integration tests for nested deadline scopes

mod common;

use common::{assert_units, init_test_logging, timed, UNIT};
use std::time::Duration;
use tasklet_core::{timeout, Deque, Semaphore, TaskletError, Tasklet, Timeout};

const JOIN: Timeout = Timeout::After(Duration::from_secs(10));

fn remaining_secs() -> f64 {
    timeout::current().map_or(f64::INFINITY, |left| left.as_secs_f64())
}

#[test]
fn test_composition_and_restore() {
    init_test_logging();
    let handle = Tasklet::spawn(|| {
        let mut seen = vec![remaining_secs()];

        let outer = timeout::push(Timeout::secs(30.0));
        seen.push(remaining_secs());

        let inner = timeout::push(Timeout::secs(5.0));
        seen.push(remaining_secs());

        inner.pop()?;
        seen.push(remaining_secs());

        outer.pop()?;
        seen.push(remaining_secs());
        Ok(seen)
    })
    .unwrap();

    let seen = handle.join(JOIN).unwrap();
    assert!(seen[0].is_infinite());
    assert!((29.0..=30.0).contains(&seen[1]));
    assert!((4.0..=5.0).contains(&seen[2]));
    assert!((29.0..=30.0).contains(&seen[3]));
    assert!(seen[4].is_infinite());
}

#[test]
fn test_unmatched_pop_is_protocol_error() {
    init_test_logging();
    let result = Tasklet::spawn(|| Ok(timeout::pop())).unwrap().join(JOIN).unwrap();
    assert!(matches!(result, Err(TaskletError::Protocol(_))));
}

#[test]
fn test_child_starts_without_parent_deadline() {
    init_test_logging();
    let _scope = timeout::push(Timeout::secs(1.0));

    let child = Tasklet::spawn(|| Ok(timeout::current())).unwrap();
    assert_eq!(child.join(JOIN), Ok(None));
}

#[test]
fn test_blocking_call_bounded_by_pushed_deadline() {
    init_test_logging();
    let deque = Deque::<u8>::new();

    let (result, elapsed) = timed(|| {
        let _scope = timeout::push(Timeout::After(UNIT));
        // Never cannot outlive the surrounding scope
        deque.popleft(true, Timeout::Never)
    });

    assert_eq!(result, Err(TaskletError::Timeout));
    assert_units(elapsed, 1.0);
    assert_eq!(deque.waiting(), 0);
    assert_eq!(timeout::depth(), 0);
}

#[test]
fn test_explicit_timeout_tighter_than_scope_wins() {
    init_test_logging();
    let sema = Semaphore::new(0);
    let _scope = timeout::push(Timeout::secs(30.0));

    let (result, elapsed) = timed(|| sema.acquire(true, Timeout::After(UNIT)));

    assert_eq!(result, Err(TaskletError::Timeout));
    assert_units(elapsed, 1.0);
}

#[test]
fn test_sleep_interrupted_by_scope() {
    init_test_logging();
    let (result, elapsed) = timed(|| {
        timeout::scope(Timeout::After(UNIT), || Tasklet::sleep(UNIT * 10))
    });

    assert_eq!(result, Err(TaskletError::Timeout));
    assert_units(elapsed, 1.0);
    assert_eq!(timeout::current(), None);
}

#[test]
fn test_guard_pops_while_child_unwinds() {
    init_test_logging();
    let handle = Tasklet::spawn(|| -> Result<(), TaskletError> {
        let _scope = timeout::push(Timeout::secs(5.0));
        panic!("failure inside a deadline scope");
    })
    .unwrap();

    let err = handle.join(JOIN).unwrap_err();
    assert!(matches!(err, TaskletError::Join(ref join) if join.is_panic()));
}

#[test]
fn test_guard_pops_on_error_return() {
    init_test_logging();
    fn fails_inside_scope(deque: &Deque<u8>) -> Result<u8, TaskletError> {
        let _scope = timeout::push(Timeout::secs(5.0));
        deque.pop(false, Timeout::Current)
    }

    let deque = Deque::new();
    assert_eq!(fails_inside_scope(&deque), Err(TaskletError::Empty));
    assert_eq!(timeout::depth(), 0);
    assert_eq!(Tasklet::current().deadline(), tasklet_core::Deadline::Never);
}
