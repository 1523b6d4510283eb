//! Ticker Codec Module
//!
//! Decodes the frames received on the Kite ticker socket.
//!
//! - **Binary frames**: the compact tick stream (and 1-byte heartbeats)
//! - **Text frames**: JSON envelopes carrying order updates and errors
//!
//! # Binary Framing
//!
//! ```text
//! +---------+---------+----------------+---------+----------------+----
//! | count   | len(0)  | packet(0)      | len(1)  | packet(1)      | ...
//! | u16 BE  | u16 BE  | len(0) bytes   | u16 BE  | len(1) bytes   |
//! +---------+---------+----------------+---------+----------------+----
//! ```
//!
//! The packet length selects the layout:
//!
//! | Length | Layout                                                   |
//! |--------|----------------------------------------------------------|
//! | 8      | LTP: token, last price                                   |
//! | 28     | Index quote: token, last, high, low, open, close, change |
//! | 32     | Index full: index quote + exchange timestamp             |
//! | 44     | Quote: token, last, qty, avg, volume, buy/sell qty, OHLC |
//! | 184    | Full: quote + LTT, OI, OI high/low, timestamp, depth     |
//!
//! Packets of any other length are skipped. A truncated packet ends decoding
//! of the frame; ticks decoded before it are kept.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::order::OrderUpdate;
use crate::domain::streaming::{
    DEPTH_LEVELS, DepthItem, MarketDepth, Mode, Tick, price_divisor, scale_price,
};

use super::messages::ServerEnvelope;

/// Length of a heartbeat frame.
pub const HEARTBEAT_LEN: usize = 1;

/// Packet lengths defined by the protocol.
pub mod packet_len {
    /// LTP mode.
    pub const LTP: usize = 8;
    /// Index quote mode.
    pub const INDEX_QUOTE: usize = 28;
    /// Index full mode.
    pub const INDEX_FULL: usize = 32;
    /// Quote mode.
    pub const QUOTE: usize = 44;
    /// Full mode with market depth.
    pub const FULL: usize = 184;
}

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Buffer ended before the expected field.
    #[error("truncated frame: {0}")]
    Truncated(#[from] std::io::Error),

    /// Offset lies outside the buffer.
    #[error("offset {offset} outside buffer of {len} bytes")]
    OffsetOutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Buffer length.
        len: usize,
    },

    /// Packet length with no defined layout.
    #[error("unsupported packet length: {0}")]
    UnsupportedLength(usize),

    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// An order envelope carried a payload that is not an order.
    #[error("invalid order update: {0}")]
    InvalidOrder(serde_json::Error),
}

// =============================================================================
// Binary Frames
// =============================================================================

/// Result of decoding one binary frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Ticks that passed validation, in wire order.
    pub ticks: Vec<Tick>,
    /// Bytes consumed from the starting offset.
    pub consumed: usize,
    /// Packets dropped (unsupported length, zero token, truncated).
    pub skipped: usize,
    /// Whether the frame was a heartbeat.
    pub heartbeat: bool,
}

/// Decoder for the binary tick stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// Create a new binary codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Check if a binary frame is a heartbeat.
    #[must_use]
    pub const fn is_heartbeat(data: &[u8]) -> bool {
        data.len() == HEARTBEAT_LEN
    }

    /// Decode a whole binary frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too short to hold a packet count.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedFrame, CodecError> {
        self.decode_at(data, 0)
    }

    /// Decode a binary frame starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset` is past the end of `data` or the packet
    /// count cannot be read. Malformed packets inside the frame are skipped
    /// and counted in [`DecodedFrame::skipped`].
    pub fn decode_at(&self, data: &[u8], offset: usize) -> Result<DecodedFrame, CodecError> {
        let frame = data.get(offset..).ok_or(CodecError::OffsetOutOfBounds {
            offset,
            len: data.len(),
        })?;

        if Self::is_heartbeat(frame) {
            return Ok(DecodedFrame {
                consumed: HEARTBEAT_LEN,
                heartbeat: true,
                ..DecodedFrame::default()
            });
        }

        let mut cursor = Cursor::new(frame);
        let count = cursor.read_u16::<BigEndian>()?;
        let mut decoded = DecodedFrame::default();

        for _ in 0..count {
            let Ok(len) = cursor.read_u16::<BigEndian>() else {
                decoded.skipped += 1;
                break;
            };
            let len = usize::from(len);
            let start = position(&cursor);

            let Some(body) = frame.get(start..start + len) else {
                tracing::trace!(len, available = frame.len() - start, "Truncated tick packet");
                decoded.skipped += 1;
                cursor.set_position(frame.len() as u64);
                break;
            };

            match Self::decode_packet(body) {
                Ok(tick) if tick.instrument_token != 0 => decoded.ticks.push(tick),
                Ok(_) => {
                    tracing::trace!("Dropping tick with zero instrument token");
                    decoded.skipped += 1;
                }
                Err(e) => {
                    tracing::trace!(error = %e, "Skipping tick packet");
                    decoded.skipped += 1;
                }
            }

            cursor.set_position((start + len) as u64);
        }

        decoded.consumed = position(&cursor);
        Ok(decoded)
    }

    /// Decode a single packet body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body length has no defined layout.
    pub fn decode_packet(body: &[u8]) -> Result<Tick, CodecError> {
        let mut reader = PacketReader::new(body)?;

        match body.len() {
            packet_len::LTP => reader.ltp(),
            packet_len::INDEX_QUOTE => reader.index(Mode::Quote),
            packet_len::INDEX_FULL => reader.index(Mode::Full),
            packet_len::QUOTE => reader.quote(Mode::Quote),
            packet_len::FULL => reader.full(),
            other => Err(CodecError::UnsupportedLength(other)),
        }
    }
}

fn position(cursor: &Cursor<&[u8]>) -> usize {
    usize::try_from(cursor.position()).unwrap_or(usize::MAX)
}

/// Field reader over one packet body.
struct PacketReader<'a> {
    cursor: Cursor<&'a [u8]>,
    token: u32,
    divisor: u32,
}

impl<'a> PacketReader<'a> {
    fn new(body: &'a [u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(body);
        let token = cursor.read_u32::<BigEndian>()?;
        Ok(Self {
            cursor,
            token,
            divisor: price_divisor(token),
        })
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(self.cursor.read_u32::<BigEndian>()?)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(self.cursor.read_u16::<BigEndian>()?)
    }

    fn price(&mut self) -> Result<Decimal, CodecError> {
        let raw = self.cursor.read_u32::<BigEndian>()?;
        Ok(scale_price(raw, self.divisor))
    }

    /// Net change is the only signed price on the wire.
    fn change(&mut self) -> Result<Decimal, CodecError> {
        let raw = self.cursor.read_i32::<BigEndian>()?;
        Ok(scale_price(raw, self.divisor))
    }

    fn time(&mut self) -> Result<Option<DateTime<Utc>>, CodecError> {
        let secs = self.u32()?;
        Ok(DateTime::from_timestamp(i64::from(secs), 0))
    }

    fn skip(&mut self, bytes: u64) {
        self.cursor.set_position(self.cursor.position() + bytes);
    }

    fn ltp(&mut self) -> Result<Tick, CodecError> {
        let mut tick = Tick::new(Mode::Ltp, self.token);
        tick.last_price = self.price()?;
        Ok(tick)
    }

    fn index(&mut self, mode: Mode) -> Result<Tick, CodecError> {
        let mut tick = Tick::new(mode, self.token);
        tick.last_price = self.price()?;
        tick.high = self.price()?;
        tick.low = self.price()?;
        tick.open = self.price()?;
        tick.close = self.price()?;
        tick.change = self.change()?;
        if mode == Mode::Full {
            tick.timestamp = self.time()?;
        }
        Ok(tick)
    }

    fn quote(&mut self, mode: Mode) -> Result<Tick, CodecError> {
        let mut tick = Tick::new(mode, self.token);
        tick.last_price = self.price()?;
        tick.last_quantity = self.u32()?;
        tick.average_price = self.price()?;
        tick.volume = self.u32()?;
        tick.buy_quantity = self.u32()?;
        tick.sell_quantity = self.u32()?;
        tick.open = self.price()?;
        tick.high = self.price()?;
        tick.low = self.price()?;
        tick.close = self.price()?;
        Ok(tick)
    }

    fn full(&mut self) -> Result<Tick, CodecError> {
        let mut tick = self.quote(Mode::Full)?;
        tick.last_trade_time = self.time()?;
        tick.open_interest = self.u32()?;
        tick.oi_day_high = self.u32()?;
        tick.oi_day_low = self.u32()?;
        tick.timestamp = self.time()?;

        let mut depth = MarketDepth::default();
        for level in &mut depth.bids {
            *level = self.depth_item()?;
        }
        for level in &mut depth.offers {
            *level = self.depth_item()?;
        }
        tick.depth = Some(depth);
        Ok(tick)
    }

    fn depth_item(&mut self) -> Result<DepthItem, CodecError> {
        let quantity = self.u32()?;
        let price = self.price()?;
        let orders = self.u16()?;
        // two bytes of padding per level
        self.skip(2);
        Ok(DepthItem {
            quantity,
            price,
            orders,
        })
    }
}

const _: () = assert!(packet_len::FULL == packet_len::QUOTE + 20 + DEPTH_LEVELS * 2 * 12);

// =============================================================================
// Text Frames
// =============================================================================

/// Decoded text envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMessage {
    /// Order update.
    Order(Box<OrderUpdate>),
    /// Server-reported error, verbatim.
    Error(String),
    /// Any other envelope type.
    Other(String),
}

/// JSON codec for text envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope is not valid JSON or an order payload
    /// does not match [`OrderUpdate`].
    pub fn decode(&self, text: &str) -> Result<TextMessage, CodecError> {
        let envelope: ServerEnvelope = serde_json::from_str(text.trim())?;

        match envelope.kind.as_str() {
            ServerEnvelope::ORDER => {
                let order: OrderUpdate =
                    serde_json::from_value(envelope.data).map_err(CodecError::InvalidOrder)?;
                Ok(TextMessage::Order(Box::new(order)))
            }
            ServerEnvelope::ERROR => {
                let message = match envelope.data {
                    serde_json::Value::String(message) => message,
                    other => other.to_string(),
                };
                Ok(TextMessage::Error(message))
            }
            _ => Ok(TextMessage::Other(envelope.kind)),
        }
    }
}
