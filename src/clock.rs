//! Time source abstraction.
//!
//! The engine, the recovery procedure and the mirrors read "now" through
//! [`Clock`] so that elapsed-time behaviour can be tested without sleeping.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

impl MockClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += Duration::seconds(seconds);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drops the sub-second part of an instant.
///
/// Sessions are stored with whole-second bounds so that
/// `duration_seconds == end_time - start_time` holds exactly.
pub fn truncate_to_second(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(instant.timestamp(), 0).unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mock_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 58, 0).unwrap();
        let clock = MockClock::new(start);

        clock.advance(240);

        assert_eq!(
            clock.now(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 2, 0).unwrap()
        );
    }

    #[test]
    fn test_mock_clock_set() {
        let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_truncate_to_second() {
        let instant = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        let truncated = truncate_to_second(instant);
        assert_eq!(truncated.timestamp(), 1_700_000_000);
        assert_eq!(truncated.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_system_clock_is_recent() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
