//! Wall-clock access and elapsed-time helpers.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Fractional minutes elapsed from `earlier` to `later`, computed from the
/// millisecond difference. Negative when `later` precedes `earlier`.
pub fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / MS_PER_MINUTE
}

/// Source of the current time for session liveness.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a host can hand one clone to a
/// `SessionManager` and keep another to drive it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_between_fractional() {
        let start = Utc::now();
        assert_eq!(minutes_between(start, start), 0.0);
        assert_eq!(minutes_between(start, start + Duration::seconds(90)), 1.5);
        assert_eq!(minutes_between(start, start + Duration::milliseconds(600)), 0.01);
        assert_eq!(minutes_between(start + Duration::minutes(2), start), -2.0);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let driver = clock.clone();
        let before = clock.now();

        driver.advance(Duration::minutes(5));
        assert_eq!(minutes_between(before, clock.now()), 5.0);

        driver.set(before);
        assert_eq!(clock.now(), before);
    }
}
