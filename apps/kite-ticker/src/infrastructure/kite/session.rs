//! Ticker Session
//!
//! Credentials and handshake parameters for the ticker socket.
//!
//! # Handshake
//!
//! ```text
//! GET wss://ws.kite.trade/?api_key=<key>&access_token=<token>
//! X-Kite-Version: 3
//! ```
//!
//! The server answers an invalid or expired access token by refusing the
//! upgrade or with an `error` text frame. Token renewal happens outside the
//! ticker.

use crate::application::ports::{ConnectRequest, SessionProvider};

/// Default ticker endpoint.
pub const DEFAULT_ROOT: &str = "wss://ws.kite.trade/";

/// Protocol version header name.
pub const KITE_VERSION_HEADER: &str = "X-Kite-Version";

/// Protocol version sent on the handshake.
pub const KITE_VERSION: &str = "3";

/// Kite API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    access_token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub fn new(api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            access_token: access_token.into(),
        }
    }
}

impl SessionProvider for Credentials {
    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Build the socket URL for a session.
#[must_use]
pub fn socket_url(root: &str, session: &dyn SessionProvider) -> String {
    format!(
        "{root}?api_key={}&access_token={}",
        session.api_key(),
        session.access_token()
    )
}

/// Build the full handshake request for a session.
#[must_use]
pub fn connect_request(root: &str, session: &dyn SessionProvider) -> ConnectRequest {
    ConnectRequest {
        url: socket_url(root, session),
        headers: vec![(KITE_VERSION_HEADER.to_string(), KITE_VERSION.to_string())],
    }
}
