//! Kite Ticker Client
//!
//! Public façade over the streaming connection.
//!
//! A single driver task owns the socket and serializes everything that
//! touches it: caller commands, watchdog ticks and inbound frames are
//! multiplexed in one `tokio::select!` loop, so there is exactly one send
//! path per connection and callbacks never overlap.
//!
//! ```text
//!  caller ──subscribe/set_mode──▶ registry ──Command::Send──┐
//!  caller ──connect/close──────────────────────Command──────┤
//!                                                           ▼
//!                 watchdog interval ──────────────▶  ┌──────────────┐ ──▶ socket
//!                 inbound frames ─────────────────▶  │    driver    │
//!                                                    └──────────────┘ ──▶ callbacks
//! ```
//!
//! Subscription calls never wait on the network. They update the registry
//! and queue a control message that the driver sends if it is connected;
//! otherwise the next successful connect replays the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    Connection, Frame, SessionProvider, Transport, TransportError,
};
use crate::application::services::{Callbacks, TickerEvent};
use crate::domain::order::OrderUpdate;
use crate::domain::streaming::{Mode, Tick};
use crate::domain::subscription::{InstrumentToken, SubscriptionRegistry};
use crate::infrastructure::metrics::{
    ErrorSource, FrameKind, record_control_message, record_error, record_frame,
    record_order_update, record_packets_skipped, record_reconnect, record_reconnect_exhausted,
    record_tick, set_connected, set_subscriptions,
};

use super::codec::{BinaryCodec, CodecError, JsonCodec, TextMessage};
use super::messages::ControlRequest;
use super::reconnect::ReconnectConfig;
use super::session::{DEFAULT_ROOT, connect_request};
use super::supervisor::{ConnectionState, Supervisor, WatchdogAction};
use super::transport::WsTransport;
use super::watchdog::WatchdogConfig;

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by [`Ticker::connect`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickerError {
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `close()` was called while connecting.
    #[error("connect cancelled by close")]
    Cancelled,

    /// The handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The connection driver is gone.
    #[error("ticker driver is not running")]
    NotRunning,
}

// =============================================================================
// Configuration
// =============================================================================

/// Ticker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerConfig {
    /// Socket root URL.
    pub root: String,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Watchdog timer.
    pub watchdog: WatchdogConfig,
    /// Handshake timeout.
    pub connect_timeout: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            reconnect: ReconnectConfig::default(),
            watchdog: WatchdogConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TickerConfig {
    /// Set the socket root URL.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the reconnection behavior.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the watchdog timer.
    #[must_use]
    pub const fn with_watchdog(mut self, watchdog: WatchdogConfig) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

// =============================================================================
// Ticker
// =============================================================================

enum Command {
    Connect {
        reply: oneshot::Sender<Result<(), TickerError>>,
    },
    Send(ControlRequest),
    Resubscribe,
    EnableReconnect {
        interval: Duration,
        max_retries: u32,
    },
    DisableReconnect,
    Close,
}

/// State shared between the façade and the driver.
struct Shared {
    registry: SubscriptionRegistry,
    callbacks: Callbacks,
    state: RwLock<ConnectionState>,
    closing: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

/// Streaming client for the Kite ticker.
///
/// # Example
///
/// ```rust,no_run
/// use kite_ticker::{Credentials, Mode, Ticker, TickerConfig};
///
/// async fn example() -> Result<(), kite_ticker::TickerError> {
///     let ticker = Ticker::new(TickerConfig::default(), Credentials::new("api_key", "access_token"));
///
///     ticker.on_tick(|tick| println!("{} {}", tick.instrument_token, tick.last_price));
///     ticker.on_error(|message| eprintln!("ticker error: {message}"));
///
///     ticker.subscribe(&[408_065, 884_737]);
///     ticker.set_mode(&[408_065], Mode::Full);
///     ticker.connect().await?;
///
///     tokio::signal::ctrl_c().await.ok();
///     ticker.close();
///     Ok(())
/// }
/// ```
pub struct Ticker {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    driver: Mutex<Option<Driver>>,
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("state", &self.state())
            .field("subscriptions", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl Ticker {
    /// Create a ticker over a real WebSocket.
    #[must_use]
    pub fn new(config: TickerConfig, session: impl SessionProvider + 'static) -> Self {
        Self::with_transport(config, session, Arc::new(WsTransport::new()))
    }

    /// Create a ticker over a custom transport.
    #[must_use]
    pub fn with_transport(
        config: TickerConfig,
        session: impl SessionProvider + 'static,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let shared = Arc::new(Shared {
            registry: SubscriptionRegistry::new(),
            callbacks: Callbacks::new(),
            state: RwLock::new(ConnectionState::Disconnected),
            closing: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        });
        let (commands, receiver) = mpsc::unbounded_channel();

        let driver = Driver {
            shared: Arc::clone(&shared),
            transport,
            session: Arc::new(session),
            root: config.root,
            tick_interval: config.watchdog.tick_interval,
            connect_timeout: config.connect_timeout,
            supervisor: Supervisor::new(config.reconnect, config.watchdog),
            commands: receiver,
            connection: None,
            binary: BinaryCodec::new(),
            json: JsonCodec::new(),
        };

        Self {
            shared,
            commands,
            driver: Mutex::new(Some(driver)),
        }
    }

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------

    /// Open the connection and wait for the handshake.
    ///
    /// The registry is replayed onto the socket before the connect callback
    /// fires. Calling this while connected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails, times out, or is cancelled by
    /// [`close`](Self::close). The error callback fires as well.
    pub async fn connect(&self) -> Result<(), TickerError> {
        self.shared.closing.store(false, Ordering::SeqCst);
        {
            // A pending handshake keeps watching the current token.
            let mut cancel = self.shared.cancel.lock();
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
        }

        if let Some(driver) = self.driver.lock().take() {
            tokio::spawn(driver.run());
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Connect { reply })
            .map_err(|_| TickerError::NotRunning)?;
        response.await.map_err(|_| TickerError::NotRunning)?
    }

    /// Close the connection. Never reconnects afterwards on its own.
    ///
    /// Safe to call from any thread, including while a reconnect attempt is
    /// in flight.
    pub fn close(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.cancel.lock().cancel();
        self.command(Command::Close);
    }

    /// Check if the socket is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Turn auto-reconnect on. The interval is clamped to at least five seconds.
    pub fn enable_reconnect(&self, interval: Duration, max_retries: u32) {
        self.command(Command::EnableReconnect {
            interval,
            max_retries,
        });
    }

    /// Turn auto-reconnect off. The connection itself is untouched.
    pub fn disable_reconnect(&self) {
        self.command(Command::DisableReconnect);
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe instruments. New ones start in `quote` mode.
    pub fn subscribe(&self, tokens: &[InstrumentToken]) {
        if tokens.is_empty() {
            return;
        }

        let added = self.shared.registry.subscribe(tokens);
        set_subscriptions(self.shared.registry.len());
        tracing::debug!(
            requested = tokens.len(),
            added = added.len(),
            "Subscribing instruments"
        );
        self.wire_command(Command::Send(ControlRequest::subscribe(tokens)));
    }

    /// Unsubscribe instruments.
    pub fn unsubscribe(&self, tokens: &[InstrumentToken]) {
        if tokens.is_empty() {
            return;
        }

        let removed = self.shared.registry.unsubscribe(tokens);
        set_subscriptions(self.shared.registry.len());
        tracing::debug!(
            requested = tokens.len(),
            removed = removed.len(),
            "Unsubscribing instruments"
        );
        self.wire_command(Command::Send(ControlRequest::unsubscribe(tokens)));
    }

    /// Change the mode of subscribed instruments. Unknown tokens are ignored.
    pub fn set_mode(&self, tokens: &[InstrumentToken], mode: Mode) {
        if tokens.is_empty() {
            return;
        }

        let updated = self.shared.registry.set_mode(tokens, mode);
        if updated.is_empty() {
            tracing::debug!(%mode, "Mode change for unsubscribed instruments ignored");
            return;
        }

        tracing::debug!(%mode, updated = updated.len(), "Changing instrument mode");
        self.wire_command(Command::Send(ControlRequest::mode(mode, updated)));
    }

    /// Replay the whole registry onto the socket.
    pub fn resubscribe(&self) {
        self.wire_command(Command::Resubscribe);
    }

    /// Snapshot of subscribed instruments and their modes.
    #[must_use]
    pub fn subscriptions(&self) -> std::collections::BTreeMap<InstrumentToken, Mode> {
        self.shared.registry.snapshot()
    }

    // -------------------------------------------------------------------------
    // Callbacks
    // -------------------------------------------------------------------------

    /// Handle decoded ticks.
    pub fn on_tick(&self, handler: impl Fn(Tick) + Send + Sync + 'static) {
        self.shared.callbacks.set_on_tick(handler);
    }

    /// Handle order updates.
    pub fn on_order_update(&self, handler: impl Fn(OrderUpdate) + Send + Sync + 'static) {
        self.shared.callbacks.set_on_order_update(handler);
    }

    /// Handle transport and server errors.
    pub fn on_error(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        self.shared.callbacks.set_on_error(handler);
    }

    /// Handle reconnect attempts. Receives the attempt number.
    pub fn on_reconnect(&self, handler: impl Fn(u32) + Send + Sync + 'static) {
        self.shared.callbacks.set_on_reconnect(handler);
    }

    /// Handle reconnect exhaustion.
    pub fn on_no_reconnect(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.set_on_no_reconnect(handler);
    }

    /// Handle successful connects.
    pub fn on_connect(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.set_on_connect(handler);
    }

    /// Handle connection close.
    pub fn on_close(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.set_on_close(handler);
    }

    /// Queue a wire update. Before the first connect the registry alone
    /// records it; the connect replay puts it on the wire.
    fn wire_command(&self, command: Command) {
        if self.driver.lock().is_some() {
            return;
        }
        self.command(command);
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Ticker driver stopped, dropping command");
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Owns the connection and runs the supervisor.
struct Driver {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionProvider>,
    root: String,
    tick_interval: Duration,
    connect_timeout: Duration,
    supervisor: Supervisor,
    commands: mpsc::UnboundedReceiver<Command>,
    connection: Option<Connection>,
    binary: BinaryCodec,
    json: JsonCodec,
}

async fn next_frame(connection: &mut Option<Connection>) -> Option<Result<Frame, TransportError>> {
    match connection {
        Some(connection) => connection.frames.next().await,
        None => std::future::pending().await,
    }
}

impl Driver {
    async fn run(mut self) {
        let period = self.tick_interval;
        let mut watchdog = tokio::time::interval_at(Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                _ = watchdog.tick() => self.on_watchdog_tick().await,
                frame = next_frame(&mut self.connection) => self.on_frame(frame),
            }
        }

        self.abort();
        tracing::debug!("Ticker driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Send(request) => self.send(&request).await,
            Command::Resubscribe => self.replay().await,
            Command::EnableReconnect {
                interval,
                max_retries,
            } => {
                self.supervisor.enable_reconnect(interval, max_retries);
                tracing::info!(
                    interval_secs = interval.as_secs(),
                    max_retries,
                    "Ticker auto-reconnect enabled"
                );
            }
            Command::DisableReconnect => {
                self.supervisor.disable_reconnect();
                tracing::info!("Ticker auto-reconnect disabled");
            }
            Command::Close => self.close().await,
        }
    }

    fn publish_state(&self) {
        let state = self.supervisor.state();
        *self.shared.state.write() = state;
        set_connected(state == ConnectionState::Connected);
    }

    fn emit(&self, event: TickerEvent) {
        self.shared.callbacks.dispatch(event);
    }

    fn report(&self, source: ErrorSource, message: String) {
        record_error(source);
        self.emit(TickerEvent::Error(message));
    }

    // -------------------------------------------------------------------------
    // Connection lifecycle
    // -------------------------------------------------------------------------

    async fn connect(&mut self) -> Result<(), TickerError> {
        self.connect_within(self.connect_timeout).await
    }

    async fn connect_within(&mut self, timeout: Duration) -> Result<(), TickerError> {
        if !self.supervisor.begin_connect() {
            tracing::debug!(state = %self.supervisor.state(), "Ticker already connecting");
            return Ok(());
        }
        self.publish_state();

        let request = connect_request(&self.root, self.session.as_ref());
        tracing::info!(?request, "Connecting to Kite ticker");

        let cancel = self.shared.cancel.lock().clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TickerError::Cancelled),
            outcome = tokio::time::timeout(timeout, self.transport.connect(&request)) => {
                match outcome {
                    Ok(result) => result.map_err(TickerError::from),
                    Err(_) => Err(TickerError::Timeout(timeout)),
                }
            }
        };

        match result {
            Ok(connection) => {
                self.connection = Some(connection);
                self.supervisor.connect_succeeded();
                self.publish_state();
                tracing::info!("Connected to Kite ticker");

                self.replay().await;
                self.emit(TickerEvent::Connected);
                Ok(())
            }
            Err(TickerError::Cancelled) => {
                self.supervisor.connect_failed();
                self.publish_state();
                tracing::info!("Ticker connect cancelled");
                Err(TickerError::Cancelled)
            }
            Err(e) => {
                self.supervisor.connect_failed();
                self.publish_state();
                tracing::warn!(error = %e, "Ticker connection failed");
                self.report(ErrorSource::Connect, e.to_string());
                Err(e)
            }
        }
    }

    /// Drop the connection without a close handshake.
    fn abort(&mut self) {
        if self.connection.take().is_some() {
            tracing::debug!("Aborted ticker connection");
        }
    }

    async fn close(&mut self) {
        let previous = self.supervisor.state();
        self.supervisor.close();
        self.publish_state();

        if let Some(mut connection) = self.connection.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, connection.sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Ticker close handshake failed"),
                Err(_) => tracing::debug!("Ticker close handshake timed out"),
            }
        }

        if previous != ConnectionState::Closing {
            tracing::info!("Ticker connection closed");
            self.emit(TickerEvent::Closed);
        }
    }

    fn connection_lost(&mut self, error: Option<TransportError>) {
        self.connection = None;
        if self.supervisor.state() == ConnectionState::Closing {
            return;
        }

        self.supervisor.connection_lost();
        self.publish_state();

        match error {
            Some(e) => {
                tracing::warn!(error = %e, "Lost ticker connection");
                self.report(ErrorSource::Receive, e.to_string());
            }
            None => tracing::info!("Ticker connection closed by server"),
        }
        self.emit(TickerEvent::Closed);
    }

    async fn on_watchdog_tick(&mut self) {
        if self.shared.closing.load(Ordering::SeqCst) {
            return;
        }

        match self.supervisor.watchdog_tick() {
            WatchdogAction::None => {}
            WatchdogAction::Reconnect { attempt, backoff } => {
                tracing::warn!(
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    "Ticker watchdog expired, reconnecting"
                );
                record_reconnect();
                self.abort();
                self.publish_state();
                self.emit(TickerEvent::Reconnecting { attempt });

                if self.shared.closing.load(Ordering::SeqCst) {
                    return;
                }
                // The handshake may not outlive its backoff window, and the
                // watchdog is charged for the time it took.
                let started = Instant::now();
                let timeout = self.connect_timeout.min(backoff);
                if self.connect_within(timeout).await.is_err() {
                    self.supervisor.watchdog_elapsed(started.elapsed());
                }
            }
            WatchdogAction::Exhausted => {
                tracing::error!(
                    retries = self.supervisor.retry_count(),
                    "Ticker reconnect attempts exhausted"
                );
                record_reconnect_exhausted();
                self.abort();
                self.publish_state();
                self.emit(TickerEvent::ReconnectExhausted);
            }
            WatchdogAction::TimedOut => {
                tracing::warn!("Ticker watchdog expired, auto-reconnect disabled");
                self.abort();
                self.publish_state();
                self.report(
                    ErrorSource::Timeout,
                    "ticker connection timed out: no data received".to_string(),
                );
                self.emit(TickerEvent::Closed);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    async fn send(&mut self, request: &ControlRequest) {
        if !self.supervisor.is_connected() {
            tracing::trace!(action = request.action(), "Not connected, control message deferred");
            return;
        }
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        let text = match request.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode control message");
                return;
            }
        };

        match connection.sink.send_text(text).await {
            Ok(()) => {
                record_control_message(request.action());
                tracing::debug!(
                    action = request.action(),
                    tokens = request.tokens().len(),
                    "Sent ticker control message"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, action = request.action(), "Failed to send control message");
                self.report(ErrorSource::Send, e.to_string());
            }
        }
    }

    async fn replay(&mut self) {
        let plan = self.shared.registry.replay_plan();
        if plan.is_empty() {
            return;
        }

        tracing::info!(
            tokens = plan.tokens.len(),
            mode_groups = plan.mode_groups.len(),
            "Restoring ticker subscriptions"
        );
        for request in ControlRequest::replay(&plan) {
            self.send(&request).await;
        }
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    fn on_frame(&mut self, frame: Option<Result<Frame, TransportError>>) {
        match frame {
            Some(Ok(Frame::Binary(data))) => {
                self.supervisor.data_received();
                self.on_binary(&data);
            }
            Some(Ok(Frame::Text(text))) => {
                self.supervisor.data_received();
                self.on_text(&text);
            }
            Some(Ok(Frame::Close)) | None => self.connection_lost(None),
            Some(Err(e)) => self.connection_lost(Some(e)),
        }
    }

    fn on_binary(&self, data: &[u8]) {
        if BinaryCodec::is_heartbeat(data) {
            record_frame(FrameKind::Heartbeat);
            return;
        }
        record_frame(FrameKind::Binary);

        if !self.supervisor.is_connected() {
            return;
        }

        match self.binary.decode(data) {
            Ok(decoded) => {
                if decoded.skipped > 0 {
                    record_packets_skipped(decoded.skipped);
                }
                for tick in decoded.ticks {
                    record_tick(tick.mode);
                    self.emit(TickerEvent::Tick(tick));
                }
            }
            Err(e) => {
                record_packets_skipped(1);
                tracing::trace!(error = %e, len = data.len(), "Dropping undecodable frame");
            }
        }
    }

    fn on_text(&self, text: &str) {
        record_frame(FrameKind::Text);

        match self.json.decode(text) {
            Ok(TextMessage::Order(order)) => {
                record_order_update();
                tracing::debug!(order_id = %order.order_id, status = %order.status, "Order update");
                self.emit(TickerEvent::OrderUpdate(order));
            }
            Ok(TextMessage::Error(message)) => {
                tracing::warn!(%message, "Ticker server error");
                self.report(ErrorSource::Server, message);
            }
            Ok(TextMessage::Other(kind)) => {
                tracing::debug!(%kind, "Ignoring ticker message");
            }
            Err(CodecError::InvalidOrder(e)) => {
                tracing::warn!(error = %e, "Undecodable order update");
                self.report(ErrorSource::Decode, format!("invalid order update: {e}"));
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed text frame");
            }
        }
    }
}
