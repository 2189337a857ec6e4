//! Deadline value type and timeout requests

use super::now;
use std::time::{Duration, Instant};

/// Absolute point in time after which a pending wait must fail
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Deadline {
    /// No expiry
    #[default]
    Never,
    /// Expires at the given instant
    At(Instant),
}

impl Deadline {
    /// Deadline `duration` from now
    ///
    /// Durations too large to represent as an `Instant` never expire.
    pub fn after(duration: Duration) -> Self {
        now()
            .checked_add(duration)
            .map_or(Deadline::Never, Deadline::At)
    }

    /// Deadline `secs` seconds from now (see [`Timeout::secs`] for edge values)
    pub fn from_secs_f64(secs: f64) -> Self {
        Timeout::secs(secs).resolve(Deadline::Never)
    }

    /// The earlier of two deadlines; `Never` is the identity
    pub fn tighter(self, other: Deadline) -> Deadline {
        match (self, other) {
            (Deadline::Never, d) | (d, Deadline::Never) => d,
            (Deadline::At(a), Deadline::At(b)) => Deadline::At(a.min(b)),
        }
    }

    /// Expiry instant, `None` for never
    pub fn instant(self) -> Option<Instant> {
        match self {
            Deadline::Never => None,
            Deadline::At(at) => Some(at),
        }
    }

    /// Time left until expiry, `None` for never, zero once expired
    pub fn remaining(self) -> Option<Duration> {
        self.instant()
            .map(|at| at.saturating_duration_since(now()))
    }

    /// Time left until expiry in seconds
    pub fn remaining_secs(self) -> Option<f64> {
        self.remaining().map(|d| d.as_secs_f64())
    }

    /// Whether the deadline has passed
    pub fn is_expired(self) -> bool {
        matches!(self, Deadline::At(at) if at <= now())
    }

    /// Whether this is `Never`
    pub fn is_never(self) -> bool {
        matches!(self, Deadline::Never)
    }
}

impl From<Instant> for Deadline {
    fn from(at: Instant) -> Self {
        Deadline::At(at)
    }
}

/// Deadline request handed to `timeout::push` or a blocking operation
///
/// A request is always resolved against the caller's active deadline and can
/// only tighten it: nested code never outlives its caller's budget.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Timeout {
    /// No expiry of its own; an active deadline still applies
    Never,
    /// Inherit the active deadline
    #[default]
    Current,
    /// Expire this long from now, or earlier if the active deadline says so
    After(Duration),
}

impl Timeout {
    /// Request in seconds
    ///
    /// Zero, negative and NaN values are already expired; infinity is `Never`.
    pub fn secs(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Timeout::After(Duration::ZERO);
        }
        Duration::try_from_secs_f64(secs).map_or(Timeout::Never, Timeout::After)
    }

    /// Request in milliseconds
    pub fn millis(millis: u64) -> Self {
        Timeout::After(Duration::from_millis(millis))
    }

    /// Resolve against the currently active deadline
    pub fn resolve(self, current: Deadline) -> Deadline {
        match self {
            Timeout::Current | Timeout::Never => current,
            Timeout::After(duration) => Deadline::after(duration).tighter(current),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tighter_prefers_earlier() {
        let now = Instant::now();
        let early = Deadline::At(now + Duration::from_secs(5));
        let late = Deadline::At(now + Duration::from_secs(30));

        assert_eq!(early.tighter(late), early);
        assert_eq!(late.tighter(early), early);
        assert_eq!(Deadline::Never.tighter(late), late);
        assert_eq!(late.tighter(Deadline::Never), late);
        assert_eq!(Deadline::Never.tighter(Deadline::Never), Deadline::Never);
    }

    #[test]
    fn test_remaining() {
        assert_eq!(Deadline::Never.remaining(), None);

        let d = Deadline::after(Duration::from_secs(10));
        let left = d.remaining().unwrap();
        assert!(left <= Duration::from_secs(10));
        assert!(left > Duration::from_secs(9));

        let past = Deadline::At(Instant::now() - Duration::from_millis(1));
        assert_eq!(past.remaining(), Some(Duration::ZERO));
        assert!(past.is_expired());
        assert!(!Deadline::Never.is_expired());
    }

    #[test]
    fn test_resolve_current_and_never_keep_active_deadline() {
        let active = Deadline::after(Duration::from_secs(30));

        assert_eq!(Timeout::Current.resolve(active), active);
        assert_eq!(Timeout::Never.resolve(active), active);
        assert_eq!(Timeout::Never.resolve(Deadline::Never), Deadline::Never);
    }

    #[test]
    fn test_resolve_relative_only_tightens() {
        let active = Deadline::after(Duration::from_secs(30));

        let inner = Timeout::secs(5.0).resolve(active);
        assert!(inner.remaining().unwrap() <= Duration::from_secs(5));

        let longer = Timeout::secs(60.0).resolve(active);
        assert_eq!(longer, active);

        let unbounded = Timeout::secs(60.0).resolve(Deadline::Never);
        assert!(unbounded.remaining().unwrap() > Duration::from_secs(59));
    }

    #[test]
    fn test_secs_edge_values() {
        assert_eq!(Timeout::secs(0.0), Timeout::After(Duration::ZERO));
        assert_eq!(Timeout::secs(-3.0), Timeout::After(Duration::ZERO));
        assert_eq!(Timeout::secs(f64::NAN), Timeout::After(Duration::ZERO));
        assert_eq!(Timeout::secs(f64::INFINITY), Timeout::Never);
        assert_eq!(Timeout::secs(1.5), Timeout::After(Duration::from_millis(1500)));
        assert!(Deadline::from_secs_f64(0.0).is_expired());
    }

    #[test]
    fn test_default_is_current() {
        assert_eq!(Timeout::default(), Timeout::Current);
        assert_eq!(Deadline::default(), Deadline::Never);
    }
}
