//! Outgoing lifecycle messages and the forwarding seam.
//!
//! Every message the middleware derives from an RSAA is an
//! [`OutgoingMessage`]: a flat `{type, payload?, error?, meta?}` record.
//! Successes and failures share that shape; consumers branch on `error` and
//! match on the [`Payload`] to tell data from an [`RsaaError`].
//!
//! Messages, and actions that are not RSAAs, reach the host through a
//! [`Forward`] implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tracing::warn;

use crate::core::{Symbol, Value};
use crate::error::RsaaError;

/// Type used for validation failures whose start type cannot be determined.
pub const INVALID_RSAA_TYPE: &str = "@@rsaa-ws/INVALID_RSAA";

/// Identifier of an outgoing message type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    Name(String),
    Symbol(Symbol),
}

impl ActionType {
    /// Read an identifier (string or symbol) from a value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(ActionType::Name(name.clone())),
            Value::Symbol(symbol) => Some(ActionType::Symbol(*symbol)),
            _ => None,
        }
    }

    pub fn invalid_rsaa() -> Self {
        ActionType::Name(INVALID_RSAA_TYPE.to_string())
    }
}

impl From<&str> for ActionType {
    fn from(name: &str) -> Self {
        ActionType::Name(name.to_string())
    }
}

impl From<String> for ActionType {
    fn from(name: String) -> Self {
        ActionType::Name(name)
    }
}

impl From<Symbol> for ActionType {
    fn from(symbol: Symbol) -> Self {
        ActionType::Symbol(symbol)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Name(name) => f.write_str(name),
            ActionType::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

impl Serialize for ActionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ActionType::Name(name) => serializer.serialize_str(name),
            ActionType::Symbol(symbol) => serializer.serialize_str(symbol.description()),
        }
    }
}

/// Payload of an outgoing message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Error(RsaaError),
    Data(serde_json::Value),
}

impl Payload {
    pub fn as_error(&self) -> Option<&RsaaError> {
        match self {
            Payload::Error(err) => Some(err),
            Payload::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Data(data) => Some(data),
            Payload::Error(_) => None,
        }
    }
}

impl From<RsaaError> for Payload {
    fn from(err: RsaaError) -> Self {
        Payload::Error(err)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(data: serde_json::Value) -> Self {
        Payload::Data(data)
    }
}

/// A lifecycle message derived from an RSAA.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl OutgoingMessage {
    /// A message with only a type.
    pub fn new(action_type: impl Into<ActionType>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: None,
            error: false,
            meta: None,
        }
    }

    /// An error message carrying `err` as its payload.
    pub fn failure(action_type: impl Into<ActionType>, err: RsaaError) -> Self {
        Self {
            action_type: action_type.into(),
            payload: Some(Payload::Error(err)),
            error: true,
            meta: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// The error carried in the payload, if any.
    pub fn error_payload(&self) -> Option<&RsaaError> {
        self.payload.as_ref().and_then(Payload::as_error)
    }
}

/// Something the middleware hands to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Forwarded {
    /// An action that is not an RSAA, passed through untouched.
    Action(Value),
    /// A lifecycle message derived from an RSAA.
    Message(OutgoingMessage),
}

impl From<OutgoingMessage> for Forwarded {
    fn from(message: OutgoingMessage) -> Self {
        Forwarded::Message(message)
    }
}

impl Forwarded {
    pub fn as_message(&self) -> Option<&OutgoingMessage> {
        match self {
            Forwarded::Message(message) => Some(message),
            Forwarded::Action(_) => None,
        }
    }

    pub fn as_action(&self) -> Option<&Value> {
        match self {
            Forwarded::Action(action) => Some(action),
            Forwarded::Message(_) => None,
        }
    }
}

/// Host message dispatch: receives pass-through actions and derived messages.
///
/// Implementations must not fail; the middleware never inspects a result.
///
/// # Example Implementation
///
/// ```ignore
/// struct StoreForward { store: Arc<Store> }
///
/// #[async_trait]
/// impl Forward for StoreForward {
///     async fn forward(&self, item: Forwarded) {
///         self.store.reduce(item).await;
///     }
/// }
/// ```
#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, item: Forwarded);
}

#[async_trait]
impl Forward for mpsc::UnboundedSender<Forwarded> {
    async fn forward(&self, item: Forwarded) {
        if self.send(item).is_err() {
            warn!("forward receiver dropped, discarding item");
        }
    }
}

#[async_trait]
impl<T: Forward + ?Sized> Forward for Arc<T> {
    async fn forward(&self, item: Forwarded) {
        (**self).forward(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization_omits_unset_fields() {
        let message = OutgoingMessage::new("START");
        assert_eq!(serde_json::to_value(&message).unwrap(), json!({"type": "START"}));
    }

    #[test]
    fn test_failure_message_serialization() {
        let message = OutgoingMessage::failure("FAIL", RsaaError::client("connection refused"))
            .with_meta(json!({"attempt": 1}));

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "FAIL",
                "payload": {"name": "ClientError", "message": "connection refused"},
                "error": true,
                "meta": {"attempt": 1}
            })
        );
    }

    #[test]
    fn test_symbol_type_serializes_as_description() {
        let started = Symbol::new("FEED_STARTED");
        let message = OutgoingMessage::new(started).with_payload(json!({"v": 1}));

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"type": "FEED_STARTED", "payload": {"v": 1}})
        );
    }

    #[test]
    fn test_action_type_from_value() {
        assert_eq!(
            ActionType::from_value(&Value::from("OK")),
            Some(ActionType::from("OK"))
        );
        assert_eq!(ActionType::from_value(&Value::from(3)), None);
    }

    #[tokio::test]
    async fn test_channel_forward_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.forward(Forwarded::Message(OutgoingMessage::new("A"))).await;
        tx.forward(Forwarded::Action(Value::from("plain"))).await;

        assert_eq!(
            rx.recv().await,
            Some(Forwarded::Message(OutgoingMessage::new("A")))
        );
        assert_eq!(rx.recv().await, Some(Forwarded::Action(Value::from("plain"))));
    }

    #[tokio::test]
    async fn test_channel_forward_tolerates_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        // Must not panic.
        tx.forward(Forwarded::Message(OutgoingMessage::new("A"))).await;
    }
}
