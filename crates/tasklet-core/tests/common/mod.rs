#![allow(dead_code)]
//! Shared integration test helpers.
//!
//! Timing tests count in `UNIT`s: one unit stands in for one second of the
//! documented timing laws, scaled down to keep the suite fast.

use std::sync::Once;
use std::time::{Duration, Instant};
use tasklet_core::{Tasklet, TaskletResult};

static INIT_LOGGING: Once = Once::new();

/// One time unit of the timing laws
pub const UNIT: Duration = Duration::from_millis(200);

/// Initialise tracing output once per test binary
///
/// Honors `RUST_LOG`; defaults to warnings only.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Sleep for `units` time units inside the current tasklet
pub fn work(units: u32) -> TaskletResult<()> {
    Tasklet::sleep(UNIT * units)
}

/// Run `f` and return how long it took, in units
pub fn timed<R>(f: impl FnOnce() -> R) -> (R, f64) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed().as_secs_f64() / UNIT.as_secs_f64())
}

/// Assert `elapsed` (in units) is at least `expected` and not much more
#[track_caller]
pub fn assert_units(elapsed: f64, expected: f64) {
    assert!(
        elapsed >= expected - 0.05,
        "finished after {elapsed:.2} units, expected at least {expected}"
    );
    assert!(
        elapsed < expected + 0.9,
        "finished after {elapsed:.2} units, expected about {expected}"
    );
}

/// Poll `condition` until it holds, giving up after five seconds
#[track_caller]
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(5), "condition never held");
        Tasklet::sleep(Duration::from_millis(1)).unwrap();
    }
}
