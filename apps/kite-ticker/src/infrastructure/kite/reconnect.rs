//! Reconnection Policy
//!
//! Capped exponential backoff for the ticker socket. After the k-th retry the
//! watchdog waits `min(2^k * interval, 60s)` before declaring the attempt
//! dead and trying again. There is no jitter.

use std::time::Duration;

/// Smallest allowed reconnect interval.
pub const MIN_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on the wait between attempts.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Default number of retries before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 50;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Whether watchdog expiry triggers a reconnect.
    pub enabled: bool,
    /// Base interval; also the heartbeat window of a live connection.
    pub interval: Duration,
    /// Maximum number of reconnect attempts.
    pub max_retries: u32,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: MIN_RECONNECT_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            max_delay: MAX_RECONNECT_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Enabled configuration with the given interval and retries.
    ///
    /// The interval is clamped to at least five seconds.
    #[must_use]
    pub fn enabled(interval: Duration, max_retries: u32) -> Self {
        Self {
            enabled: true,
            interval: clamp_interval(interval),
            max_retries,
            max_delay: MAX_RECONNECT_DELAY,
        }
    }

    /// Set whether reconnection is enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the base interval, clamped to at least five seconds.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = clamp_interval(interval);
        self
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_RECONNECT_INTERVAL)
}

/// Retry counter and backoff computation.
///
/// # Example
///
/// ```rust
/// use kite_ticker::infrastructure::kite::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::enabled(Duration::from_secs(5), 50));
///
/// let attempt = policy.next_attempt().unwrap();
/// assert_eq!(attempt.number, 1);
/// assert_eq!(attempt.delay, Duration::from_secs(10));
///
/// // Successful connection
/// policy.reset();
/// assert_eq!(policy.retry_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    retry_count: u32,
}

/// A reconnect attempt granted by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    /// Attempt number, starting at 1.
    pub number: u32,
    /// How long the watchdog waits on this attempt.
    pub delay: Duration,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            retry_count: 0,
        }
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Check if auto-reconnect is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Enable auto-reconnect with a new interval and retry limit.
    pub fn enable(&mut self, interval: Duration, max_retries: u32) {
        self.config.enabled = true;
        self.config.interval = clamp_interval(interval);
        self.config.max_retries = max_retries;
    }

    /// Disable auto-reconnect.
    pub const fn disable(&mut self) {
        self.config.enabled = false;
    }

    /// Base interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Retries made since the last successful connection.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Reset the retry counter after a successful connection.
    pub const fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Delay after `retries` attempts: `min(2^retries * interval, max_delay)`.
    #[must_use]
    pub fn backoff(&self, retries: u32) -> Duration {
        2u32.checked_pow(retries)
            .and_then(|factor| self.config.interval.checked_mul(factor))
            .map_or(self.config.max_delay, |delay| delay.min(self.config.max_delay))
    }

    /// Grant the next attempt, or `None` once the retry limit is reached.
    #[must_use]
    pub fn next_attempt(&mut self) -> Option<ReconnectAttempt> {
        if self.retry_count >= self.config.max_retries {
            return None;
        }

        self.retry_count += 1;
        Some(ReconnectAttempt {
            number: self.retry_count,
            delay: self.backoff(self.retry_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.max_retries, 50);
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn interval_is_clamped() {
        let config = ReconnectConfig::enabled(Duration::from_secs(1), 3);
        assert_eq!(config.interval, Duration::from_secs(5));

        let config = ReconnectConfig::default().with_interval(Duration::from_secs(8));
        assert_eq!(config.interval, Duration::from_secs(8));

        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        policy.enable(Duration::ZERO, 10);
        assert!(policy.is_enabled());
        assert_eq!(policy.interval(), Duration::from_secs(5));
    }

    #[test]
    fn policy_exponential_backoff() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::enabled(Duration::from_secs(5), 50));

        let delays: Vec<u64> = (0..5)
            .map(|_| policy.next_attempt().unwrap().delay.as_secs())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 60, 60]);
    }

    #[test]
    fn backoff_saturates_at_cap() {
        let policy = ReconnectPolicy::new(ReconnectConfig::enabled(Duration::from_secs(7), 50));
        assert_eq!(policy.backoff(0), Duration::from_secs(7));
        assert_eq!(policy.backoff(3), Duration::from_secs(56));
        assert_eq!(policy.backoff(4), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn policy_max_retries() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::enabled(Duration::from_secs(5), 3));

        for expected in 1..=3 {
            assert_eq!(policy.next_attempt().unwrap().number, expected);
        }
        assert!(policy.next_attempt().is_none());
        assert_eq!(policy.retry_count(), 3);
    }

    #[test]
    fn policy_reset() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::enabled(Duration::from_secs(5), 3));
        let _ = policy.next_attempt();
        let _ = policy.next_attempt();
        assert_eq!(policy.retry_count(), 2);

        policy.reset();

        assert_eq!(policy.retry_count(), 0);
        assert_eq!(policy.next_attempt().unwrap().delay, Duration::from_secs(10));
    }

    #[test]
    fn zero_retries_gives_up_immediately() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::enabled(Duration::from_secs(5), 0));
        assert!(policy.next_attempt().is_none());
    }
}
