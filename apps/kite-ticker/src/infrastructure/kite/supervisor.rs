//! Connection Supervisor
//!
//! Pure state machine behind the ticker connection. It owns the connection
//! state, the watchdog countdown and the reconnect policy, and decides what
//! the connection driver must do next. It performs no I/O, so every
//! transition can be driven step by step in tests.
//!
//! # State Machine
//!
//! ```text
//!              begin_connect
//! Disconnected ─────────────▶ Connecting ──connect_succeeded──▶ Connected
//!     ▲   ▲                       │                                │
//!     │   └──────connect_failed───┘                                │
//!     └──────────────connection_lost / watchdog expiry─────────────┘
//!
//! any state ──close──▶ Closing   (never reconnects)
//! ```

use std::fmt;
use std::time::Duration;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::watchdog::{Watchdog, WatchdogConfig, WatchdogTick};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection; eligible for reconnection if enabled.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected and streaming.
    Connected,
    /// Closed by the caller; never reconnects on its own.
    Closing,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the driver must do after a watchdog tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Nothing to do.
    None,
    /// Abort the connection and connect again.
    Reconnect {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Wait before this attempt is declared dead.
        backoff: Duration,
    },
    /// Retries used up: abort and report exhaustion. Auto-reconnect is now off.
    Exhausted,
    /// Connection presumed dead with auto-reconnect off: abort and report.
    TimedOut,
}

/// Connection supervisor state machine.
#[derive(Debug, Clone)]
pub struct Supervisor {
    state: ConnectionState,
    watchdog: Watchdog,
    watchdog_config: WatchdogConfig,
    policy: ReconnectPolicy,
}

impl Supervisor {
    /// Create a disconnected supervisor.
    #[must_use]
    pub fn new(reconnect: ReconnectConfig, watchdog_config: WatchdogConfig) -> Self {
        let window = watchdog_config.ticks_for(reconnect.interval);
        Self {
            state: ConnectionState::Disconnected,
            watchdog: Watchdog::new(window),
            watchdog_config,
            policy: ReconnectPolicy::new(reconnect),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    /// Check if auto-reconnect is enabled.
    #[must_use]
    pub const fn reconnect_enabled(&self) -> bool {
        self.policy.is_enabled()
    }

    /// Retries since the last successful connection.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.policy.retry_count()
    }

    /// Watchdog countdown, in ticks.
    #[must_use]
    pub const fn countdown(&self) -> i64 {
        self.watchdog.countdown()
    }

    /// Check if the watchdog is running.
    #[must_use]
    pub const fn watchdog_running(&self) -> bool {
        self.watchdog.is_running()
    }

    fn window(&self) -> i64 {
        self.watchdog_config.ticks_for(self.policy.interval())
    }

    /// Start a connection attempt.
    ///
    /// Returns `false` if a connection is already open or being opened.
    pub const fn begin_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Closing => {
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Connecting | ConnectionState::Connected => false,
        }
    }

    /// Handshake completed: reset backoff and restart the watchdog.
    pub fn connect_succeeded(&mut self) {
        self.state = ConnectionState::Connected;
        self.policy.reset();
        let window = self.window();
        self.watchdog.start(window);
    }

    /// Handshake failed.
    ///
    /// With auto-reconnect on, the watchdog keeps (or starts) counting so the
    /// failure is retried like a dropped connection.
    pub fn connect_failed(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Disconnected;
        }
        self.arm_for_retry();
    }

    /// Inbound data (including heartbeats) arrived.
    pub fn data_received(&mut self) {
        let window = self.window();
        self.watchdog.reset(window);
    }

    /// The transport reported a drop or the server closed the socket.
    pub fn connection_lost(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            self.state = ConnectionState::Disconnected;
        }
        self.arm_for_retry();
    }

    fn arm_for_retry(&mut self) {
        if self.state == ConnectionState::Closing {
            return;
        }
        if self.policy.is_enabled() {
            if !self.watchdog.is_running() {
                let window = self.window();
                self.watchdog.start(window);
            }
        } else {
            self.watchdog.stop();
        }
    }

    /// Charge the watchdog for time spent while its timer could not tick,
    /// such as a blocking reconnect handshake.
    pub fn watchdog_elapsed(&mut self, elapsed: Duration) {
        if self.state == ConnectionState::Closing {
            return;
        }
        let tick = self.watchdog_config.tick_interval.as_millis().max(1);
        let ticks = i64::try_from(elapsed.as_millis() / tick).unwrap_or(i64::MAX);
        self.watchdog.advance(ticks);
    }

    /// Advance the watchdog by one tick.
    pub fn watchdog_tick(&mut self) -> WatchdogAction {
        if self.state == ConnectionState::Closing {
            self.watchdog.stop();
            return WatchdogAction::None;
        }

        match self.watchdog.tick() {
            WatchdogTick::Stopped | WatchdogTick::Running(_) => WatchdogAction::None,
            WatchdogTick::Expired => self.on_expired(),
        }
    }

    fn on_expired(&mut self) -> WatchdogAction {
        self.state = ConnectionState::Disconnected;

        if !self.policy.is_enabled() {
            return WatchdogAction::TimedOut;
        }

        match self.policy.next_attempt() {
            Some(attempt) => {
                let ticks = self.watchdog_config.ticks_for(attempt.delay);
                self.watchdog.start(ticks);
                WatchdogAction::Reconnect {
                    attempt: attempt.number,
                    backoff: attempt.delay,
                }
            }
            None => {
                self.policy.disable();
                self.watchdog.stop();
                WatchdogAction::Exhausted
            }
        }
    }

    /// Caller-initiated close.
    pub const fn close(&mut self) {
        self.watchdog.stop();
        self.state = ConnectionState::Closing;
    }

    /// Turn auto-reconnect on.
    ///
    /// The interval is clamped to at least five seconds. A live connection's
    /// watchdog restarts with the new window.
    pub fn enable_reconnect(&mut self, interval: Duration, max_retries: u32) {
        self.policy.enable(interval, max_retries);
        let window = self.window();
        if self.is_connected() {
            self.watchdog.start(window);
        } else {
            self.watchdog.seed(window);
        }
    }

    /// Turn auto-reconnect off. The watchdog stops, so a pending retry is
    /// dropped.
    pub fn disable_reconnect(&mut self) {
        self.policy.disable();
        self.watchdog.stop();
        let window = self.window();
        self.watchdog.seed(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(enabled: bool, max_retries: u32) -> Supervisor {
        let reconnect = ReconnectConfig::enabled(Duration::from_secs(5), max_retries)
            .with_enabled(enabled);
        Supervisor::new(reconnect, WatchdogConfig::default())
    }

    fn connected(enabled: bool, max_retries: u32) -> Supervisor {
        let mut supervisor = supervisor(enabled, max_retries);
        assert!(supervisor.begin_connect());
        supervisor.connect_succeeded();
        supervisor
    }

    /// Tick until something other than `None` happens.
    fn run_until_action(supervisor: &mut Supervisor) -> (WatchdogAction, u32) {
        for ticks in 1..=120 {
            let action = supervisor.watchdog_tick();
            if action != WatchdogAction::None {
                return (action, ticks);
            }
        }
        panic!("watchdog never fired");
    }

    #[test]
    fn connect_transitions() {
        let mut supervisor = supervisor(false, 50);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);

        assert!(supervisor.begin_connect());
        assert_eq!(supervisor.state(), ConnectionState::Connecting);
        assert!(!supervisor.begin_connect());

        supervisor.connect_succeeded();
        assert!(supervisor.is_connected());
        assert!(supervisor.watchdog_running());
        assert_eq!(supervisor.countdown(), 5);
        assert!(!supervisor.begin_connect());
    }

    #[test]
    fn heartbeats_keep_connection_alive() {
        let mut supervisor = connected(true, 50);
        for _ in 0..100 {
            assert_eq!(supervisor.watchdog_tick(), WatchdogAction::None);
            supervisor.data_received();
        }
        assert!(supervisor.is_connected());
        assert_eq!(supervisor.retry_count(), 0);
    }

    #[test]
    fn expiry_without_reconnect_times_out() {
        let mut supervisor = connected(false, 50);
        let (action, ticks) = run_until_action(&mut supervisor);

        assert_eq!(action, WatchdogAction::TimedOut);
        assert_eq!(ticks, 6);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert!(!supervisor.watchdog_running());
    }

    #[test]
    fn retries_back_off_then_exhaust() {
        let mut supervisor = connected(true, 50);

        for k in 1..=50u32 {
            let (action, _) = run_until_action(&mut supervisor);
            let expected = Duration::from_secs((5u64 << k).min(60));
            assert_eq!(
                action,
                WatchdogAction::Reconnect {
                    attempt: k,
                    backoff: expected
                }
            );
            assert_eq!(supervisor.countdown(), i64::try_from(expected.as_secs()).unwrap());

            // Attempt fails at the handshake.
            assert!(supervisor.begin_connect());
            supervisor.connect_failed();
            assert!(supervisor.watchdog_running());
        }

        let (action, _) = run_until_action(&mut supervisor);
        assert_eq!(action, WatchdogAction::Exhausted);
        assert!(!supervisor.reconnect_enabled());
        assert!(!supervisor.watchdog_running());

        for _ in 0..200 {
            assert_eq!(supervisor.watchdog_tick(), WatchdogAction::None);
        }
    }

    #[test]
    fn successful_reconnect_resets_backoff() {
        let mut supervisor = connected(true, 50);

        let (action, _) = run_until_action(&mut supervisor);
        assert!(matches!(action, WatchdogAction::Reconnect { attempt: 1, .. }));
        assert!(supervisor.begin_connect());
        supervisor.connect_succeeded();

        assert_eq!(supervisor.retry_count(), 0);
        assert_eq!(supervisor.countdown(), 5);
    }

    #[test]
    fn close_stops_reconnection() {
        let mut supervisor = connected(true, 50);
        let (action, _) = run_until_action(&mut supervisor);
        assert!(matches!(action, WatchdogAction::Reconnect { .. }));

        supervisor.close();
        assert_eq!(supervisor.state(), ConnectionState::Closing);
        for _ in 0..200 {
            assert_eq!(supervisor.watchdog_tick(), WatchdogAction::None);
        }

        supervisor.connection_lost();
        assert_eq!(supervisor.state(), ConnectionState::Closing);
        assert!(!supervisor.watchdog_running());
    }

    #[test]
    fn dropped_connection_arms_watchdog_when_enabled() {
        let mut supervisor = connected(true, 50);
        supervisor.connection_lost();
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert!(supervisor.watchdog_running());

        let mut supervisor = connected(false, 50);
        supervisor.connection_lost();
        assert!(!supervisor.watchdog_running());
    }

    #[test]
    fn failed_first_connect_is_retried_when_enabled() {
        let mut supervisor = supervisor(true, 50);
        assert!(supervisor.begin_connect());
        supervisor.connect_failed();

        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        let (action, ticks) = run_until_action(&mut supervisor);
        assert!(matches!(action, WatchdogAction::Reconnect { attempt: 1, .. }));
        assert_eq!(ticks, 6);
    }

    #[test]
    fn toggling_reconnect() {
        let mut supervisor = connected(false, 50);

        supervisor.enable_reconnect(Duration::from_secs(2), 10);
        assert!(supervisor.reconnect_enabled());
        assert_eq!(supervisor.countdown(), 5);
        assert!(supervisor.watchdog_running());

        supervisor.enable_reconnect(Duration::from_secs(9), 10);
        assert_eq!(supervisor.countdown(), 9);

        supervisor.disable_reconnect();
        assert!(!supervisor.reconnect_enabled());
        assert!(!supervisor.watchdog_running());
        assert!(supervisor.is_connected());
    }

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn slow_handshake_is_charged_to_the_backoff_window() {
        let mut supervisor = connected(true, 50);
        let (action, _) = run_until_action(&mut supervisor);
        assert_eq!(
            action,
            WatchdogAction::Reconnect {
                attempt: 1,
                backoff: Duration::from_secs(10),
            }
        );

        assert!(supervisor.begin_connect());
        supervisor.connect_failed();
        supervisor.watchdog_elapsed(Duration::from_secs(10));
        assert_eq!(supervisor.countdown(), 0);

        assert_eq!(
            supervisor.watchdog_tick(),
            WatchdogAction::Reconnect {
                attempt: 2,
                backoff: Duration::from_secs(20),
            }
        );
    }

    #[test]
    fn elapsed_time_is_ignored_after_close() {
        let mut supervisor = connected(true, 50);
        supervisor.close();
        supervisor.watchdog_elapsed(Duration::from_secs(60));
        assert_eq!(supervisor.countdown(), 5);
    }
}
