//! Monotonic clock, absolute deadlines and timeout requests

mod deadline;

pub use deadline::{Deadline, Timeout};

use std::time::Instant;

/// Current monotonic time
pub fn now() -> Instant {
    Instant::now()
}
