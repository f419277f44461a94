//! RetentionPolicy - durable backend の TTL ポリシー
//!
//! ttl が Infinite の場合、Sweeper は起動しません。

use chrono::TimeDelta;
use std::time::Duration;

/// Time-to-live of durable objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Infinite,
    Finite(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub ttl: Ttl,
    pub poll_interval: Duration,
}

impl RetentionPolicy {
    pub fn new(ttl: Ttl, poll_interval: Duration) -> Self {
        Self { ttl, poll_interval }
    }

    pub fn disabled() -> Self {
        Self {
            ttl: Ttl::Infinite,
            poll_interval: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.ttl, Ttl::Finite(_))
    }

    /// An object is expired iff its age is strictly greater than the ttl.
    pub fn is_expired(&self, age: TimeDelta) -> bool {
        match self.ttl {
            Ttl::Infinite => false,
            Ttl::Finite(ttl) => {
                let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
                age > ttl
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strictly_greater_than_ttl() {
        let policy = RetentionPolicy::new(Ttl::Finite(Duration::from_secs(60)), Duration::from_secs(1));
        assert!(!policy.is_expired(TimeDelta::seconds(59)));
        assert!(!policy.is_expired(TimeDelta::seconds(60)));
        assert!(policy.is_expired(TimeDelta::seconds(61)));
    }

    #[test]
    fn future_timestamps_never_expire() {
        let policy = RetentionPolicy::new(Ttl::Finite(Duration::ZERO), Duration::from_secs(1));
        assert!(!policy.is_expired(TimeDelta::seconds(-5)));
    }

    #[test]
    fn infinite_ttl_disables_retention() {
        let policy = RetentionPolicy::disabled();
        assert!(!policy.is_enabled());
        assert!(!policy.is_expired(TimeDelta::days(10_000)));
    }
}
