//! Order Update Types
//!
//! Order state pushed over the ticker socket as `{"type":"order","data":{...}}`.
//! The payload mirrors the order book entry of the REST API; only the fields
//! below are kept, anything else is ignored.
//!
//! # Wire Format (JSON)
//! ```json
//! {
//!   "order_id": "220303000308932",
//!   "status": "COMPLETE",
//!   "tradingsymbol": "INFY",
//!   "instrument_token": 408065,
//!   "quantity": 1,
//!   "filled_quantity": 1,
//!   "average_price": 1440.9,
//!   "order_timestamp": "2022-03-03 09:24:25"
//! }
//! ```

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// An order state change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Kite order id.
    pub order_id: String,
    /// Exchange order id, once the order reaches the exchange.
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    /// Parent order id for multi-leg orders.
    #[serde(default)]
    pub parent_order_id: Option<String>,
    /// Order status (`OPEN`, `COMPLETE`, `CANCELLED`, `REJECTED`, ...).
    #[serde(default)]
    pub status: String,
    /// Human readable reason for the status.
    #[serde(default)]
    pub status_message: Option<String>,
    /// Trading symbol.
    #[serde(default)]
    pub tradingsymbol: String,
    /// Instrument token.
    #[serde(default, deserialize_with = "null_as_default")]
    pub instrument_token: u32,
    /// Exchange.
    #[serde(default)]
    pub exchange: String,
    /// `BUY` or `SELL`.
    #[serde(default)]
    pub transaction_type: String,
    /// `MARKET`, `LIMIT`, `SL` or `SL-M`.
    #[serde(default)]
    pub order_type: String,
    /// Product code (`CNC`, `MIS`, `NRML`, ...).
    #[serde(default)]
    pub product: String,
    /// Order variety (`regular`, `amo`, `co`, ...).
    #[serde(default)]
    pub variety: String,
    /// Validity (`DAY`, `IOC`, `TTL`).
    #[serde(default)]
    pub validity: String,
    /// Ordered quantity.
    #[serde(default, deserialize_with = "null_as_default")]
    pub quantity: u32,
    /// Quantity disclosed to the market.
    #[serde(default, deserialize_with = "null_as_default")]
    pub disclosed_quantity: u32,
    /// Quantity filled so far.
    #[serde(default, deserialize_with = "null_as_default")]
    pub filled_quantity: u32,
    /// Quantity still pending.
    #[serde(default, deserialize_with = "null_as_default")]
    pub pending_quantity: u32,
    /// Quantity cancelled.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cancelled_quantity: u32,
    /// Market protection percentage.
    #[serde(default, deserialize_with = "null_as_default")]
    pub market_protection: i32,
    /// Limit price.
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: Decimal,
    /// Trigger price for stop orders.
    #[serde(default, deserialize_with = "null_as_default")]
    pub trigger_price: Decimal,
    /// Average fill price.
    #[serde(default, deserialize_with = "null_as_default")]
    pub average_price: Decimal,
    /// Time the order was accepted by Kite.
    #[serde(default, with = "kite_time")]
    pub order_timestamp: Option<NaiveDateTime>,
    /// Time the exchange acknowledged the order.
    #[serde(default, with = "kite_time")]
    pub exchange_timestamp: Option<NaiveDateTime>,
    /// User id of whoever placed the order.
    #[serde(default)]
    pub placed_by: String,
    /// Caller-supplied tag.
    #[serde(default)]
    pub tag: Option<String>,
}

impl OrderUpdate {
    /// Check if the order reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "COMPLETE" | "CANCELLED" | "REJECTED")
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `YYYY-MM-DD HH:MM:SS` timestamps, empty or null meaning absent.
mod kite_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => NaiveDateTime::parse_from_str(text, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "account_id": "XX0000",
        "unfilled_quantity": 0,
        "checksum": "",
        "placed_by": "XX0000",
        "order_id": "220303000308932",
        "exchange_order_id": "1000000001482421",
        "parent_order_id": null,
        "status": "COMPLETE",
        "status_message": null,
        "order_timestamp": "2022-03-03 09:24:25",
        "exchange_update_timestamp": "2022-03-03 09:24:25",
        "exchange_timestamp": "2022-03-03 09:24:25",
        "variety": "regular",
        "exchange": "NSE",
        "tradingsymbol": "INFY",
        "instrument_token": 408065,
        "order_type": "MARKET",
        "transaction_type": "BUY",
        "validity": "DAY",
        "product": "CNC",
        "quantity": 1,
        "disclosed_quantity": 0,
        "price": 0,
        "trigger_price": 0,
        "average_price": 1440.9,
        "filled_quantity": 1,
        "pending_quantity": 0,
        "cancelled_quantity": 0,
        "market_protection": 0,
        "meta": {},
        "tag": null,
        "guid": "XXXXXX"
    }"#;

    #[test]
    fn decodes_order_payload() {
        let order: OrderUpdate = serde_json::from_str(SAMPLE).unwrap();

        assert_eq!(order.order_id, "220303000308932");
        assert_eq!(order.exchange_order_id.as_deref(), Some("1000000001482421"));
        assert!(order.parent_order_id.is_none());
        assert_eq!(order.instrument_token, 408_065);
        assert_eq!(order.average_price, Decimal::new(14409, 1));
        assert_eq!(order.filled_quantity, 1);
        assert_eq!(
            order.order_timestamp.unwrap().to_string(),
            "2022-03-03 09:24:25"
        );
        assert!(order.is_terminal());
    }

    #[test]
    fn tolerates_missing_and_null_fields() {
        let order: OrderUpdate = serde_json::from_str(
            r#"{"order_id":"1","status":"OPEN","price":null,"order_timestamp":""}"#,
        )
        .unwrap();

        assert_eq!(order.price, Decimal::ZERO);
        assert!(order.order_timestamp.is_none());
        assert!(!order.is_terminal());
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let result: Result<OrderUpdate, _> =
            serde_json::from_str(r#"{"order_id":"1","order_timestamp":"yesterday"}"#);
        assert!(result.is_err());
    }
}
