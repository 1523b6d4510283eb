#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Kite Ticker - Market Data Streaming Client
//!
//! Keeps a single WebSocket connection to the Kite Connect ticker, decodes
//! its compact binary tick protocol, tracks subscriptions by mode and
//! survives network failures with watchdog-driven reconnection.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure data types
//!   - `streaming`: Ticks, market depth, modes, segments
//!   - `subscription`: Subscription registry and replay plan
//!   - `order`: Order updates pushed on the socket
//!
//! - **Application**: Port definitions and event plumbing
//!   - `ports`: Transport, frame sink, session provider
//!   - `services`: Ticker events and callback slots
//!
//! - **Infrastructure**: Adapters
//!   - `kite`: Codec, supervisor, WebSocket transport, `Ticker` façade
//!   - `config`: Environment settings
//!   - `metrics`: Prometheus counters and gauges
//!   - `telemetry`: Tracing subscriber and OTLP export
//!
//! # Data Flow
//!
//! ```text
//!                   ┌──────────────────── driver task ───────────────────┐
//! Kite WS ─frames──▶│ BinaryCodec / JsonCodec ──▶ Callbacks ──▶ on_tick  │
//!                   │ Supervisor (watchdog, backoff)                     │
//!         ◀─control─│ ControlRequest ◀── SubscriptionRegistry ◀── caller │
//!                   └────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no I/O.
pub mod domain;

/// Application layer - Port definitions and event plumbing.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::order::OrderUpdate;
pub use domain::streaming::{DepthItem, MarketDepth, Mode, Segment, Tick};
pub use domain::subscription::{InstrumentToken, ReplayPlan, SubscriptionRegistry};

// Ports and events
pub use application::ports::{
    ConnectRequest, Connection, Frame, FrameSink, FrameStream, SessionProvider, Transport,
    TransportError,
};
pub use application::services::{Callbacks, TickerEvent};

// Ticker client
pub use infrastructure::kite::{
    ConnectionState, Credentials, ReconnectConfig, Ticker, TickerConfig, TickerError,
    WatchdogConfig, WsTransport,
};

// Configuration
pub use infrastructure::config::{ConfigError, TickerSettings};

// Metrics
pub use infrastructure::metrics::{init_metrics, serve_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
