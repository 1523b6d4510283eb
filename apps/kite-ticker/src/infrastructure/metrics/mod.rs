//! Prometheus Metrics Module
//!
//! Exposes ticker metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound frames by kind, heartbeats included
//! - **Ticks**: Decoded ticks by mode, skipped packets
//! - **Connection**: Connection state, reconnect attempts, exhaustion
//! - **Subscriptions**: Registry size, control messages sent
//!
//! Recording is a no-op until [`init_metrics`] installs the recorder.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::Mode;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Install the recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the exporter cannot bind or install.
pub fn serve_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Inbound traffic
    describe_counter!(
        "kite_ticker_frames_received_total",
        "Total frames received from the ticker socket by kind"
    );
    describe_counter!(
        "kite_ticker_ticks_total",
        "Total ticks decoded by mode"
    );
    describe_counter!(
        "kite_ticker_packets_skipped_total",
        "Tick packets dropped as malformed or invalid"
    );
    describe_counter!(
        "kite_ticker_order_updates_total",
        "Total order updates received"
    );

    // Outbound traffic
    describe_counter!(
        "kite_ticker_control_messages_total",
        "Control messages sent by action"
    );

    // Connection
    describe_gauge!(
        "kite_ticker_connected",
        "1 while the ticker socket is connected"
    );
    describe_counter!(
        "kite_ticker_reconnects_total",
        "Total reconnection attempts"
    );
    describe_counter!(
        "kite_ticker_reconnect_exhausted_total",
        "Times reconnection gave up"
    );
    describe_counter!(
        "kite_ticker_errors_total",
        "Errors reported to the error callback by source"
    );

    // Subscriptions
    describe_gauge!(
        "kite_ticker_subscriptions",
        "Instruments in the subscription registry"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for inbound frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Binary tick frame.
    Binary,
    /// 1-byte heartbeat.
    Heartbeat,
    /// JSON text frame.
    Text,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Heartbeat => "heartbeat",
            Self::Text => "text",
        }
    }
}

/// Metric labels for error sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// Handshake failure.
    Connect,
    /// Send failure.
    Send,
    /// Read failure or dropped socket.
    Receive,
    /// Error frame from the server.
    Server,
    /// Undecodable order update.
    Decode,
    /// Watchdog expiry without reconnect.
    Timeout,
}

impl ErrorSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Server => "server",
            Self::Decode => "decode",
            Self::Timeout => "timeout",
        }
    }
}

/// Record an inbound frame.
pub fn record_frame(kind: FrameKind) {
    counter!(
        "kite_ticker_frames_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a decoded tick.
pub fn record_tick(mode: Mode) {
    counter!("kite_ticker_ticks_total", "mode" => mode.as_str()).increment(1);
}

/// Record packets dropped while decoding.
pub fn record_packets_skipped(count: usize) {
    counter!("kite_ticker_packets_skipped_total").increment(count as u64);
}

/// Record an order update.
pub fn record_order_update() {
    counter!("kite_ticker_order_updates_total").increment(1);
}

/// Record a control message sent.
pub fn record_control_message(action: &'static str) {
    counter!(
        "kite_ticker_control_messages_total",
        "action" => action
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("kite_ticker_reconnects_total").increment(1);
}

/// Record reconnect exhaustion.
pub fn record_reconnect_exhausted() {
    counter!("kite_ticker_reconnect_exhausted_total").increment(1);
}

/// Record an error reported to the caller.
pub fn record_error(source: ErrorSource) {
    counter!(
        "kite_ticker_errors_total",
        "source" => source.as_str()
    )
    .increment(1);
}

/// Update the connection gauge.
pub fn set_connected(connected: bool) {
    gauge!("kite_ticker_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the subscription gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("kite_ticker_subscriptions").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_kind_as_str() {
        assert_eq!(FrameKind::Binary.as_str(), "binary");
        assert_eq!(FrameKind::Heartbeat.as_str(), "heartbeat");
        assert_eq!(FrameKind::Text.as_str(), "text");
    }

    #[test]
    fn error_source_as_str() {
        assert_eq!(ErrorSource::Connect.as_str(), "connect");
        assert_eq!(ErrorSource::Send.as_str(), "send");
        assert_eq!(ErrorSource::Receive.as_str(), "receive");
        assert_eq!(ErrorSource::Server.as_str(), "server");
        assert_eq!(ErrorSource::Decode.as_str(), "decode");
        assert_eq!(ErrorSource::Timeout.as_str(), "timeout");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame(FrameKind::Heartbeat);
        record_tick(Mode::Full);
        record_packets_skipped(3);
        set_connected(true);
        set_subscriptions(10);
    }
}
