//! Error taxonomy carried in the payload of failed lifecycle messages.
//!
//! `RsaaError` is the closed set of failures the pipeline can report. None of
//! them is ever returned to the caller of the middleware: each one is
//! recovered at the pipeline boundary and forwarded as the payload of an
//! [`OutgoingMessage`](crate::OutgoingMessage) with `error: true`.
//!
//! # The Error Boundary Rule
//!
//! > **No `anyhow::Error` ever crosses the forwarding boundary.**
//!
//! - `anyhow` is internal transport (resolvers, transports, body parsing)
//! - `RsaaError` is the only externalized error (structured for consumers)
//!
//! # Example
//!
//! ```ignore
//! match message.error_payload() {
//!     Some(RsaaError::InvalidRsaa { validation_errors }) => report(validation_errors),
//!     Some(RsaaError::Remote { status, .. }) if *status == 404 => mark_gone(),
//!     Some(other) => tracing::warn!(error = %other, "subscription failed"),
//!     None => {}
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::core::Method;

/// Message carried by the setup errors when the endpoint function fails.
pub const ENDPOINT_FAILED_MESSAGE: &str = "[CALL_WS].endpoint function failed";

/// A failure reported in a lifecycle message payload.
///
/// Serializes as `{"name": "<Kind>", ...fields}` with camelCase field names.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "name", rename_all_fields = "camelCase")]
pub enum RsaaError {
    /// The action failed validation.
    #[error("Invalid RSAA")]
    #[serde(rename = "InvalidRSAA")]
    InvalidRsaa { validation_errors: Vec<String> },

    /// A `payload` or `meta` resolver failed.
    #[error("{message}")]
    #[serde(rename = "InternalError")]
    Internal { message: String },

    /// The endpoint could not be resolved for a SUBSCRIBE call.
    #[error("{message}")]
    #[serde(rename = "SubscribeError")]
    Subscribe { message: String },

    /// The endpoint could not be resolved for an UNSUBSCRIBE call.
    #[error("{message}")]
    #[serde(rename = "UnsubscribeError")]
    Unsubscribe { message: String },

    /// The transport call itself failed (malformed request, connectivity, deadline).
    #[error("{message}")]
    #[serde(rename = "ClientError")]
    Client { message: String },

    /// The remote side answered with an unsuccessful response.
    #[error("{status} - {status_text}")]
    #[serde(rename = "RemoteError")]
    Remote {
        status: u16,
        status_text: String,
        body: Option<serde_json::Value>,
    },
}

impl RsaaError {
    pub fn invalid(validation_errors: Vec<String>) -> Self {
        RsaaError::InvalidRsaa { validation_errors }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RsaaError::Internal {
            message: message.into(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        RsaaError::Client {
            message: message.into(),
        }
    }

    pub fn remote(
        status: u16,
        status_text: impl Into<String>,
        body: Option<serde_json::Value>,
    ) -> Self {
        RsaaError::Remote {
            status,
            status_text: status_text.into(),
            body,
        }
    }

    /// Setup error for a failed endpoint function, chosen by call method.
    pub fn endpoint_failed(method: Method) -> Self {
        let message = ENDPOINT_FAILED_MESSAGE.to_string();
        match method {
            Method::Subscribe => RsaaError::Subscribe { message },
            Method::Unsubscribe => RsaaError::Unsubscribe { message },
        }
    }

    /// Stable kind name, as serialized in the `name` field.
    pub fn name(&self) -> &'static str {
        match self {
            RsaaError::InvalidRsaa { .. } => "InvalidRSAA",
            RsaaError::Internal { .. } => "InternalError",
            RsaaError::Subscribe { .. } => "SubscribeError",
            RsaaError::Unsubscribe { .. } => "UnsubscribeError",
            RsaaError::Client { .. } => "ClientError",
            RsaaError::Remote { .. } => "RemoteError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_rsaa_serialization() {
        let err = RsaaError::invalid(vec!["Invalid root key: extra".into()]);

        assert_eq!(err.to_string(), "Invalid RSAA");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"name": "InvalidRSAA", "validationErrors": ["Invalid root key: extra"]})
        );
    }

    #[test]
    fn test_remote_error_serialization() {
        let err = RsaaError::remote(404, "Not Found", None);

        assert_eq!(err.to_string(), "404 - Not Found");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"name": "RemoteError", "status": 404, "statusText": "Not Found", "body": null})
        );
    }

    #[test]
    fn test_endpoint_failed_follows_method() {
        assert_eq!(
            RsaaError::endpoint_failed(Method::Subscribe).name(),
            "SubscribeError"
        );
        assert_eq!(
            RsaaError::endpoint_failed(Method::Unsubscribe).name(),
            "UnsubscribeError"
        );
        assert_eq!(
            RsaaError::endpoint_failed(Method::Unsubscribe).to_string(),
            ENDPOINT_FAILED_MESSAGE
        );
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        let errors = [
            RsaaError::invalid(vec![]),
            RsaaError::internal("boom"),
            RsaaError::endpoint_failed(Method::Subscribe),
            RsaaError::endpoint_failed(Method::Unsubscribe),
            RsaaError::client("refused"),
            RsaaError::remote(500, "Internal Server Error", Some(json!({"e": 1}))),
        ];

        for err in errors {
            let serialized = serde_json::to_value(&err).unwrap();
            assert_eq!(serialized["name"], json!(err.name()));
        }
    }
}
