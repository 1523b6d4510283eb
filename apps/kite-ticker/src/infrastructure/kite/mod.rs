//! Kite Ticker Adapters
//!
//! Client for the Kite Connect streaming ticker:
//!
//! - **Codec**: binary tick packets and JSON text envelopes
//! - **Supervisor**: connection state, watchdog and capped backoff
//! - **Transport**: `tokio-tungstenite` WebSocket adapter
//! - **Ticker**: public façade and connection driver

pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod session;
pub mod supervisor;
pub mod ticker;
pub mod transport;
pub mod watchdog;

pub use codec::{BinaryCodec, CodecError, DecodedFrame, JsonCodec, TextMessage};
pub use messages::{ControlRequest, ServerEnvelope};
pub use reconnect::{ReconnectAttempt, ReconnectConfig, ReconnectPolicy};
pub use session::{Credentials, DEFAULT_ROOT, connect_request, socket_url};
pub use supervisor::{ConnectionState, Supervisor, WatchdogAction};
pub use ticker::{Ticker, TickerConfig, TickerError};
pub use transport::WsTransport;
pub use watchdog::{Watchdog, WatchdogConfig, WatchdogTick};
