//! WebSocket Transport
//!
//! [`Transport`] adapter over `tokio-tungstenite`. The socket is split into a
//! sink owned by the connection driver and a stream of [`Frame`]s.
//! Ping/pong control frames are answered by tungstenite and never surface.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{
    ConnectRequest, Connection, Frame, FrameSink, Transport, TransportError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport backed by a real WebSocket.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, request: &ConnectRequest) -> Result<Connection, TransportError> {
        let mut handshake = request
            .url
            .as_str()
            .into_client_request()
            .map_err(handshake_error)?;

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| TransportError::Handshake(e.to_string()))?;
            handshake.headers_mut().insert(name, value);
        }

        let (ws_stream, response) = tokio_tungstenite::connect_async(handshake)
            .await
            .map_err(handshake_error)?;
        tracing::debug!(status = %response.status(), "Ticker WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        let frames = read
            .filter_map(|message| std::future::ready(to_frame(message)))
            .boxed();

        Ok(Connection {
            sink: Box::new(WsSink { write }),
            frames,
        })
    }
}

fn handshake_error(error: tungstenite::Error) -> TransportError {
    TransportError::Handshake(error.to_string())
}

fn to_frame(message: Result<Message, tungstenite::Error>) -> Option<Result<Frame, TransportError>> {
    match message {
        Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.to_vec()))),
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
        Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
            Some(Ok(Frame::Close))
        }
        Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
    }
}

/// Write half of a tungstenite socket.
struct WsSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    TransportError::Closed
                }
                other => TransportError::Send(other.to_string()),
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.write.close().await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}
