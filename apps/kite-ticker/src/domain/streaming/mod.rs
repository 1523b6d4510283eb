//! Market Data Streaming Types
//!
//! Core domain types for market data: ticks, depth levels and streaming
//! modes. These types are codec-agnostic and represent the canonical
//! internal representation of a decoded tick.
//!
//! # Instrument Segments
//!
//! The low byte of every instrument token identifies the market segment the
//! instrument trades on. The segment decides two things:
//!
//! - the divisor applied to fixed-point prices on the wire
//!   (`10_000_000` for currency derivatives, `100` for everything else)
//! - whether the instrument is tradable (indices are not)
//!
//! [`Segment`] is the single place where that mapping lives.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Mode
// =============================================================================

/// Verbosity level of a subscription.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Last traded price only.
    Ltp,
    /// Price, volume and OHLC.
    #[default]
    Quote,
    /// Quote plus market depth and open interest.
    Full,
}

impl Mode {
    /// All modes, in the order subscriptions are replayed.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Ltp, Self::Quote, Self::Full]
    }

    /// Get the wire name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown streaming mode: {0}")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ltp" => Ok(Self::Ltp),
            "quote" => Ok(Self::Quote),
            "full" => Ok(Self::Full),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

// =============================================================================
// Segment
// =============================================================================

/// Market segment encoded in the low byte of an instrument token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    /// NSE equities.
    Nse,
    /// NSE futures and options.
    Nfo,
    /// NSE currency derivatives.
    Cds,
    /// BSE equities.
    Bse,
    /// BSE futures and options.
    Bfo,
    /// BSE currency derivatives.
    Bcd,
    /// MCX commodities.
    Mcx,
    /// MCX-SX.
    Mcxsx,
    /// Indices (not tradable).
    Indices,
    /// Any segment id this client does not know about.
    Unknown(u8),
}

impl Segment {
    /// Segment id of currency-derivative instruments.
    pub const CURRENCY_ID: u8 = 3;
    /// Segment id of indices.
    pub const INDEX_ID: u8 = 9;

    /// Price divisor for currency-derivative instruments.
    pub const CURRENCY_DIVISOR: u32 = 10_000_000;
    /// Price divisor for every other segment.
    pub const DEFAULT_DIVISOR: u32 = 100;

    /// Derive the segment from an instrument token.
    #[must_use]
    pub const fn from_token(token: u32) -> Self {
        Self::from_id(token.to_le_bytes()[0])
    }

    /// Map a raw segment id to a segment.
    #[must_use]
    pub const fn from_id(id: u8) -> Self {
        match id {
            1 => Self::Nse,
            2 => Self::Nfo,
            Self::CURRENCY_ID => Self::Cds,
            4 => Self::Bse,
            5 => Self::Bfo,
            6 => Self::Bcd,
            7 => Self::Mcx,
            8 => Self::Mcxsx,
            Self::INDEX_ID => Self::Indices,
            other => Self::Unknown(other),
        }
    }

    /// Divisor that turns a wire price into a decimal price.
    #[must_use]
    pub const fn price_divisor(&self) -> u32 {
        match self {
            Self::Cds => Self::CURRENCY_DIVISOR,
            _ => Self::DEFAULT_DIVISOR,
        }
    }

    /// Whether instruments in this segment can be traded.
    #[must_use]
    pub const fn is_tradable(&self) -> bool {
        !matches!(self, Self::Indices)
    }
}

/// Price divisor for an instrument token.
#[must_use]
pub const fn price_divisor(token: u32) -> u32 {
    Segment::from_token(token).price_divisor()
}

/// Whether an instrument token refers to a tradable instrument.
#[must_use]
pub const fn is_tradable(token: u32) -> bool {
    Segment::from_token(token).is_tradable()
}

/// Scale a fixed-point wire price by the given divisor.
///
/// Prices arrive as unsigned 32-bit values; only the net change of an index
/// packet is signed.
#[must_use]
pub fn scale_price(raw: impl Into<Decimal>, divisor: u32) -> Decimal {
    raw.into() / Decimal::from(divisor)
}

// =============================================================================
// Depth
// =============================================================================

/// Number of price levels on each side of the book.
pub const DEPTH_LEVELS: usize = 5;

/// One price level of market depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepthItem {
    /// Quantity resting at this level.
    pub quantity: u32,
    /// Price of the level.
    pub price: Decimal,
    /// Number of orders at this level.
    pub orders: u16,
}

/// Top-of-book depth on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarketDepth {
    /// Bid levels, best first.
    pub bids: [DepthItem; DEPTH_LEVELS],
    /// Offer levels, best first.
    pub offers: [DepthItem; DEPTH_LEVELS],
}

// =============================================================================
// Tick
// =============================================================================

/// One market update for one instrument.
///
/// Which fields are populated depends on [`Tick::mode`]; fields outside the
/// mode keep their zero value (or `None`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tick {
    /// Mode the tick was encoded in.
    pub mode: Mode,
    /// Instrument token.
    pub instrument_token: u32,
    /// False for indices.
    pub tradable: bool,
    /// Last traded price.
    pub last_price: Decimal,
    /// Last traded quantity.
    pub last_quantity: u32,
    /// Volume-weighted average price.
    pub average_price: Decimal,
    /// Volume traded today.
    pub volume: u32,
    /// Total pending buy quantity.
    pub buy_quantity: u32,
    /// Total pending sell quantity.
    pub sell_quantity: u32,
    /// Day open.
    pub open: Decimal,
    /// Day high.
    pub high: Decimal,
    /// Day low.
    pub low: Decimal,
    /// Previous close.
    pub close: Decimal,
    /// Change from previous close (index packets only).
    pub change: Decimal,
    /// Time of the last trade.
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Exchange timestamp of the tick.
    pub timestamp: Option<DateTime<Utc>>,
    /// Open interest.
    pub open_interest: u32,
    /// Day high of open interest.
    pub oi_day_high: u32,
    /// Day low of open interest.
    pub oi_day_low: u32,
    /// Five levels of bids and offers (full mode only).
    pub depth: Option<MarketDepth>,
}

impl Tick {
    /// Create an empty tick for a token, with tradability derived from it.
    #[must_use]
    pub fn new(mode: Mode, instrument_token: u32) -> Self {
        Self {
            mode,
            instrument_token,
            tradable: is_tradable(instrument_token),
            ..Self::default()
        }
    }

    /// Segment of the tick's instrument.
    #[must_use]
    pub const fn segment(&self) -> Segment {
        Segment::from_token(self.instrument_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x0000_0101, Segment::Nse ; "nse")]
    #[test_case(0x00AB_CD02, Segment::Nfo ; "nfo")]
    #[test_case(0x0004_0003, Segment::Cds ; "cds")]
    #[test_case(0x0010_0009, Segment::Indices ; "indices")]
    #[test_case(0x0000_00FE, Segment::Unknown(0xFE) ; "unknown")]
    fn segment_from_token(token: u32, expected: Segment) {
        assert_eq!(Segment::from_token(token), expected);
    }

    #[test_case(256_265, 100 ; "index token")]
    #[test_case(738_561, 100 ; "equity token")]
    #[test_case(0x0004_0003, 10_000_000 ; "currency token")]
    fn divisor_by_token(token: u32, divisor: u32) {
        assert_eq!(price_divisor(token), divisor);
    }

    #[test]
    fn index_segment_not_tradable() {
        assert!(!is_tradable(256_265));
        assert!(is_tradable(738_561));
    }

    #[test]
    fn scale_price_is_exact() {
        assert_eq!(scale_price(123_456, 100), Decimal::new(123_456, 2));
        assert_eq!(scale_price(825_075_000, 10_000_000), Decimal::new(825_075, 4));
        assert_eq!(scale_price(-250, 100), Decimal::new(-25, 1));
        assert_eq!(scale_price(u32::MAX, 100), Decimal::new(4_294_967_295, 2));
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("ltp".parse::<Mode>().unwrap(), Mode::Ltp);
        assert_eq!("QUOTE".parse::<Mode>().unwrap(), Mode::Quote);
        assert_eq!(" full ".parse::<Mode>().unwrap(), Mode::Full);
        assert!("depth".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Full).unwrap(), "\"full\"");
        assert_eq!(Mode::default(), Mode::Quote);
    }

    #[test]
    fn new_tick_derives_tradable() {
        let tick = Tick::new(Mode::Ltp, 256_265);
        assert!(!tick.tradable);
        assert_eq!(tick.segment(), Segment::Indices);
        assert!(tick.depth.is_none());
    }
}
