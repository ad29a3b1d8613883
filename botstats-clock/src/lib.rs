//! Clock abstraction for botstats.
//!
//! Analysis windows ("last hour") and firewall rule expiry both depend on the
//! current time. Routing every "now" through [`Clock`] keeps those paths
//! deterministic under test.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds in one minute.
pub const SECS_PER_MINUTE: u64 = 60;

/// Source of the current Unix time.
pub trait Clock: Send + Sync {
    /// Current time as Unix seconds since epoch.
    fn now_unix_sec(&self) -> u64;

    /// Unix timestamp `minutes` from now.
    fn after_minutes(&self, minutes: u64) -> u64 {
        self.now_unix_sec()
            .saturating_add(minutes.saturating_mul(SECS_PER_MINUTE))
    }

    /// Unix timestamp `seconds` before now, clamped at the epoch.
    fn before_secs(&self, seconds: u64) -> u64 {
        self.now_unix_sec().saturating_sub(seconds)
    }

    /// Whether an expiry timestamp lies strictly in the past.
    fn is_expired(&self, expires_at: u64) -> bool {
        expires_at < self.now_unix_sec()
    }
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_sec(&self) -> u64 {
        // A system clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock frozen at a fixed timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockClock {
    timestamp: u64,
}

impl MockClock {
    /// Create a clock that always reports `timestamp`.
    pub fn new(timestamp: u64) -> Self {
        Self { timestamp }
    }
}

impl Clock for MockClock {
    fn now_unix_sec(&self) -> u64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_returns_fixed_timestamp() {
        let clock = MockClock::new(1_700_000_000);
        assert_eq!(clock.now_unix_sec(), 1_700_000_000);
        assert_eq!(clock.now_unix_sec(), 1_700_000_000);
    }

    #[test]
    fn test_after_minutes() {
        let clock = MockClock::new(1_000);
        assert_eq!(clock.after_minutes(0), 1_000);
        assert_eq!(clock.after_minutes(60), 1_000 + 3_600);
    }

    #[test]
    fn test_after_minutes_saturates() {
        let clock = MockClock::new(u64::MAX - 10);
        assert_eq!(clock.after_minutes(5), u64::MAX);
    }

    #[test]
    fn test_before_secs_clamps_at_epoch() {
        let clock = MockClock::new(100);
        assert_eq!(clock.before_secs(40), 60);
        assert_eq!(clock.before_secs(1_000), 0);
    }

    #[test]
    fn test_is_expired() {
        let clock = MockClock::new(1_000);
        assert!(clock.is_expired(999));
        assert!(!clock.is_expired(1_000));
        assert!(!clock.is_expired(1_001));
    }

    #[test]
    fn test_system_clock_returns_reasonable_time() {
        let now = SystemClock.now_unix_sec();

        // After 2020-01-01, before 2100-01-01
        assert!(now > 1_577_836_800);
        assert!(now < 4_102_444_800);
    }

    #[test]
    fn test_clock_trait_object() {
        let clock: Box<dyn Clock> = Box::new(MockClock::new(42));
        assert_eq!(clock.now_unix_sec(), 42);
        assert_eq!(clock.after_minutes(1), 102);
    }
}
