//! Quota policy: how many admissions a key gets per window.

use std::time::Duration;

/// Limit and window length applied to every quota key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuotaPolicy {
    limit: u64,
    window: Duration,
}

impl QuotaPolicy {
    /// Create a policy admitting `limit` requests in any `window`-long interval.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    /// `limit` admissions per second.
    pub fn per_second(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    /// `limit` admissions per minute.
    pub fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// `limit` admissions per hour.
    pub fn per_hour(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole milliseconds, the resolution stores work at.
    pub fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::per_minute(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_constructors() {
        assert_eq!(QuotaPolicy::per_second(5).window(), Duration::from_secs(1));
        assert_eq!(QuotaPolicy::per_minute(5).window(), Duration::from_secs(60));
        assert_eq!(QuotaPolicy::per_hour(5).window(), Duration::from_secs(3600));
        assert_eq!(QuotaPolicy::per_hour(5).limit(), 5);
    }

    #[test]
    fn test_default_policy() {
        let policy = QuotaPolicy::default();
        assert_eq!(policy.limit(), 10);
        assert_eq!(policy.window_ms(), 60_000);
    }
}
