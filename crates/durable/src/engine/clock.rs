//! Wall-clock abstraction
//!
//! Durable deadlines (timer fire times, retry times) are absolute wall-clock
//! instants so they survive a restart. The clock is injectable so tests can
//! pretend a process was down for a while.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Time left until `deadline`, zero if it has passed
    fn remaining_until(&self, deadline: DateTime<Utc>) -> Duration {
        (deadline - self.now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Absolute instant `after` from now, saturating at the end of time
    fn deadline_after(&self, after: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(after)
            .ok()
            .and_then(|after| self.now().checked_add_signed(after))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        if let Some(next) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|by| now.checked_add_signed(by))
        {
            *now = next;
        }
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
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let shared = clock.clone();

        clock.advance(Duration::from_secs(100));
        assert_eq!(shared.now(), start + chrono::Duration::seconds(100));
    }

    #[test]
    fn test_remaining_until() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let deadline = start + chrono::Duration::seconds(86_400);

        clock.advance(Duration::from_secs(100));
        assert_eq!(
            clock.remaining_until(deadline),
            Duration::from_secs(86_300)
        );

        clock.set(deadline + chrono::Duration::seconds(5));
        assert_eq!(clock.remaining_until(deadline), Duration::ZERO);
    }

    #[test]
    fn test_deadline_after() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        assert_eq!(
            clock.deadline_after(Duration::from_secs(10)),
            start + chrono::Duration::seconds(10)
        );
        assert_eq!(
            clock.deadline_after(Duration::MAX),
            DateTime::<Utc>::MAX_UTC
        );
    }
}
