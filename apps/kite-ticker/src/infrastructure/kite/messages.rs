//! Kite Ticker Message Types
//!
//! JSON frames exchanged on the ticker socket, next to the binary tick stream.
//!
//! # Outbound (Client -> Server)
//!
//! ```json
//! {"a":"subscribe","v":[408065,884737]}
//! {"a":"unsubscribe","v":[408065]}
//! {"a":"mode","v":["full",[408065]]}
//! ```
//!
//! # Inbound (Server -> Client)
//!
//! ```json
//! {"type":"order","data":{"order_id":"...","status":"COMPLETE",...}}
//! {"type":"error","data":"Invalid access token"}
//! ```
//!
//! Any other `type` (e.g. `message`) is ignored.

use serde::{Deserialize, Serialize};

use crate::domain::streaming::Mode;
use crate::domain::subscription::{InstrumentToken, ReplayPlan};

// =============================================================================
// Outbound Messages
// =============================================================================

/// Subscription control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "a", content = "v", rename_all = "lowercase")]
pub enum ControlRequest {
    /// Start streaming tokens (server default mode is `quote`).
    Subscribe(Vec<InstrumentToken>),
    /// Stop streaming tokens.
    Unsubscribe(Vec<InstrumentToken>),
    /// Switch tokens to a mode.
    Mode(Mode, Vec<InstrumentToken>),
}

impl ControlRequest {
    /// Create a subscribe request.
    #[must_use]
    pub fn subscribe(tokens: impl Into<Vec<InstrumentToken>>) -> Self {
        Self::Subscribe(tokens.into())
    }

    /// Create an unsubscribe request.
    #[must_use]
    pub fn unsubscribe(tokens: impl Into<Vec<InstrumentToken>>) -> Self {
        Self::Unsubscribe(tokens.into())
    }

    /// Create a mode request.
    #[must_use]
    pub fn mode(mode: Mode, tokens: impl Into<Vec<InstrumentToken>>) -> Self {
        Self::Mode(mode, tokens.into())
    }

    /// Action name, used in logs.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Mode(..) => "mode",
        }
    }

    /// Tokens the request applies to.
    #[must_use]
    pub fn tokens(&self) -> &[InstrumentToken] {
        match self {
            Self::Subscribe(tokens) | Self::Unsubscribe(tokens) | Self::Mode(_, tokens) => tokens,
        }
    }

    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Expand a replay plan into the frames that rebuild it on the wire.
    #[must_use]
    pub fn replay(plan: &ReplayPlan) -> Vec<Self> {
        if plan.is_empty() {
            return Vec::new();
        }

        let mut requests = Vec::with_capacity(plan.mode_groups.len() + 2);
        requests.push(Self::unsubscribe(plan.tokens.clone()));
        requests.push(Self::subscribe(plan.tokens.clone()));
        requests.extend(
            plan.mode_groups
                .iter()
                .map(|(mode, tokens)| Self::mode(*mode, tokens.clone())),
        );
        requests
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Text envelope sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEnvelope {
    /// Message kind (`order`, `error`, `message`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ServerEnvelope {
    /// Kind of order update envelopes.
    pub const ORDER: &'static str = "order";
    /// Kind of error envelopes.
    pub const ERROR: &'static str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_wire_format() {
        let json = ControlRequest::subscribe(vec![408_065, 884_737])
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"a":"subscribe","v":[408065,884737]}"#);
    }

    #[test]
    fn unsubscribe_wire_format() {
        let json = ControlRequest::unsubscribe(vec![1]).to_json().unwrap();
        assert_eq!(json, r#"{"a":"unsubscribe","v":[1]}"#);
    }

    #[test]
    fn mode_wire_format() {
        let json = ControlRequest::mode(Mode::Full, vec![1, 2])
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"a":"mode","v":["full",[1,2]]}"#);
    }

    #[test]
    fn control_request_parses_back() {
        let request: ControlRequest =
            serde_json::from_str(r#"{"a":"mode","v":["ltp",[5]]}"#).unwrap();
        assert_eq!(request, ControlRequest::mode(Mode::Ltp, vec![5]));
        assert_eq!(request.action(), "mode");
        assert_eq!(request.tokens(), &[5]);
    }

    #[test]
    fn replay_orders_unsubscribe_subscribe_modes() {
        let plan = ReplayPlan {
            tokens: vec![1, 2, 3],
            mode_groups: vec![(Mode::Ltp, vec![2]), (Mode::Full, vec![1, 3])],
        };

        let requests = ControlRequest::replay(&plan);
        assert_eq!(
            requests,
            vec![
                ControlRequest::unsubscribe(vec![1, 2, 3]),
                ControlRequest::subscribe(vec![1, 2, 3]),
                ControlRequest::mode(Mode::Ltp, vec![2]),
                ControlRequest::mode(Mode::Full, vec![1, 3]),
            ]
        );
    }

    #[test]
    fn replay_of_empty_plan_is_empty() {
        assert!(ControlRequest::replay(&ReplayPlan::default()).is_empty());
    }

    #[test]
    fn envelope_parses_error() {
        let envelope: ServerEnvelope =
            serde_json::from_str(r#"{"type":"error","data":"Invalid access token"}"#).unwrap();
        assert_eq!(envelope.kind, ServerEnvelope::ERROR);
        assert_eq!(envelope.data, serde_json::json!("Invalid access token"));
    }
}
