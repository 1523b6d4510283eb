//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: opens a WebSocket-like connection to the ticker
//! - `FrameSink`: the single write half of an open connection
//!
//! ## Collaborator Ports
//!
//! - `SessionProvider`: supplies the API key and access token

use async_trait::async_trait;
use futures::stream::BoxStream;

// =============================================================================
// Frames
// =============================================================================

/// Inbound frame delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Binary payload (tick stream or heartbeat).
    Binary(Vec<u8>),
    /// Text payload (JSON envelope).
    Text(String),
    /// Server closed the connection.
    Close,
}

/// Stream of inbound frames for one connection.
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

// =============================================================================
// Transport
// =============================================================================

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("error while connecting: {0}")]
    Handshake(String),

    /// Writing a frame failed.
    #[error("error while sending data: {0}")]
    Send(String),

    /// Reading a frame failed.
    #[error("error while receiving data: {0}")]
    Receive(String),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

/// Parameters for opening a ticker connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Full socket URL, including query parameters.
    pub url: String,
    /// Extra handshake headers.
    pub headers: Vec<(String, String)>,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL carries the access token.
        let endpoint = self.url.split('?').next().unwrap_or_default();
        f.debug_struct("ConnectRequest")
            .field("url", &endpoint)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Write half of an open connection.
///
/// Dropping the sink (together with its frame stream) aborts the connection
/// without a close handshake.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a close frame and wait for the close handshake.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An open connection split into its write and read halves.
pub struct Connection {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub frames: FrameStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Factory for ticker connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection and complete the handshake.
    async fn connect(&self, request: &ConnectRequest) -> Result<Connection, TransportError>;
}

// =============================================================================
// Session
// =============================================================================

/// Supplies the credentials for the ticker handshake.
///
/// Session renewal lives outside the ticker; an invalid token surfaces as a
/// transport or server error through the error callback.
pub trait SessionProvider: Send + Sync {
    /// API key issued to the app.
    fn api_key(&self) -> &str;

    /// Access token obtained from the login flow.
    fn access_token(&self) -> &str;
}
