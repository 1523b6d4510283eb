//! Connection Watchdog
//!
//! Detects silent connection death. The ticker server sends a 1-byte
//! heartbeat frame every second, so any gap in inbound data means the
//! connection is gone even if the socket never reported an error.
//!
//! The countdown is pure: a periodic timer owned by the connection driver
//! calls [`Watchdog::tick`], and every inbound frame calls
//! [`Watchdog::reset`]. The countdown expires once it goes negative.

use std::time::Duration;

/// Default watchdog tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the watchdog timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Period of the watchdog timer.
    pub tick_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl WatchdogConfig {
    /// Set the tick interval. Zero is raised to one millisecond.
    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(Duration::from_millis(1));
        self
    }

    /// Number of ticks covering `window`, at least one.
    #[must_use]
    pub fn ticks_for(&self, window: Duration) -> i64 {
        let tick = self.tick_interval.as_millis().max(1);
        i64::try_from(window.as_millis() / tick)
            .unwrap_or(i64::MAX)
            .max(1)
    }
}

/// Result of a single watchdog tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogTick {
    /// The watchdog is stopped.
    Stopped,
    /// Countdown still running, with the ticks left.
    Running(i64),
    /// Countdown went negative; the watchdog stopped itself.
    Expired,
}

/// Countdown state of the watchdog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchdog {
    countdown: i64,
    running: bool,
}

impl Watchdog {
    /// Create a stopped watchdog seeded with `ticks`.
    #[must_use]
    pub const fn new(ticks: i64) -> Self {
        Self {
            countdown: ticks,
            running: false,
        }
    }

    /// Seed the countdown without changing whether the watchdog runs.
    pub const fn seed(&mut self, ticks: i64) {
        self.countdown = ticks;
    }

    /// Seed the countdown and start the watchdog.
    pub const fn start(&mut self, ticks: i64) {
        self.countdown = ticks;
        self.running = true;
    }

    /// Stop the watchdog. The countdown is kept.
    pub const fn stop(&mut self) {
        self.running = false;
    }

    /// Inbound data arrived: push the countdown back to `ticks`.
    pub const fn reset(&mut self, ticks: i64) {
        self.countdown = ticks;
    }

    /// Charge `ticks` that passed without being counted. Stops at zero, so
    /// the next tick expires.
    pub const fn advance(&mut self, ticks: i64) {
        if !self.running {
            return;
        }
        let left = self.countdown.saturating_sub(ticks);
        self.countdown = if left < 0 { 0 } else { left };
    }

    /// Advance the countdown by one tick.
    pub const fn tick(&mut self) -> WatchdogTick {
        if !self.running {
            return WatchdogTick::Stopped;
        }

        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown < 0 {
            self.running = false;
            WatchdogTick::Expired
        } else {
            WatchdogTick::Running(self.countdown)
        }
    }

    /// Ticks left before expiry.
    #[must_use]
    pub const fn countdown(&self) -> i64 {
        self.countdown
    }

    /// Check if the watchdog is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_watchdog_never_expires() {
        let mut watchdog = Watchdog::new(0);
        for _ in 0..10 {
            assert_eq!(watchdog.tick(), WatchdogTick::Stopped);
        }
        assert_eq!(watchdog.countdown(), 0);
    }

    #[test]
    fn expires_after_countdown_goes_negative() {
        let mut watchdog = Watchdog::new(0);
        watchdog.start(5);

        for left in (0..5).rev() {
            assert_eq!(watchdog.tick(), WatchdogTick::Running(left));
        }
        assert_eq!(watchdog.tick(), WatchdogTick::Expired);
        assert!(!watchdog.is_running());
        assert_eq!(watchdog.tick(), WatchdogTick::Stopped);
    }

    #[test]
    fn reset_postpones_expiry() {
        let mut watchdog = Watchdog::new(0);
        watchdog.start(2);

        for _ in 0..20 {
            assert!(matches!(watchdog.tick(), WatchdogTick::Running(_)));
            watchdog.reset(2);
        }
        assert!(watchdog.is_running());
    }

    #[test]
    fn ticks_for_window() {
        let config = WatchdogConfig::default();
        assert_eq!(config.ticks_for(Duration::from_secs(5)), 5);
        assert_eq!(config.ticks_for(Duration::from_secs(60)), 60);

        let fast = WatchdogConfig::default().with_tick_interval(Duration::from_millis(250));
        assert_eq!(fast.ticks_for(Duration::from_secs(5)), 20);
        assert_eq!(fast.ticks_for(Duration::ZERO), 1);
    }

    #[test]
    fn advance_charges_missed_ticks_down_to_zero() {
        let mut watchdog = Watchdog::new(10);
        watchdog.advance(4);
        assert_eq!(watchdog.countdown(), 10);

        watchdog.start(10);
        watchdog.advance(4);
        assert_eq!(watchdog.countdown(), 6);
        watchdog.advance(30);
        assert_eq!(watchdog.countdown(), 0);
        assert_eq!(watchdog.tick(), WatchdogTick::Expired);
    }
}
