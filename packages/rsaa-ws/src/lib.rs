//! # rsaa-ws
//!
//! Middleware that turns declarative subscribe/unsubscribe actions into calls
//! on a socket-like transport, and reports the call's lifecycle as plain
//! messages.
//!
//! ## Core Concepts
//!
//! An **RSAA** (subscribe-style standard action) is a map carrying the
//! unforgeable [`CALL_WS`] key. Its value, the *call descriptor*, names:
//! - `endpoint`: a string, or an [`EndpointFn`] computed from the state
//! - `method`: `SUBSCRIBE` or `UNSUBSCRIBE`, case-insensitive
//! - `types`: three type descriptors for the start, success and failure messages
//!
//! Anything else passes through untouched.
//!
//! ## Architecture
//!
//! ```text
//! Host dispatch
//!     │
//!     ▼ process()
//! Middleware ──── not an RSAA ─────────────────────────────► Forward
//!     │                                                       ▲
//!     ├─► validate_rsaa() ── violations ── InvalidRSAA ───────┤
//!     │                                                       │
//!     ├─► normalize types, resolve endpoint ── failure ───────┤
//!     │                                                       │
//!     ├─► evaluate(start) ────────────────────────────────────┤
//!     │                                                       │
//!     ├─► Transport.call() ── error / timeout ── ClientError ─┤
//!     │                                                       │
//!     └─► Response.ok() ? evaluate(success)                   │
//!                       : evaluate(failure) ──────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A started call forwards exactly one start message, then exactly one
//!   terminal message, in that order
//! - An invalid RSAA forwards a single error message and performs no call
//! - `process` never returns an error and never panics: resolver, endpoint
//!   function and transport failures all become messages
//! - Dispatches are independent; nothing is shared between them but the
//!   transport and the state accessor
//!
//! ## Example
//!
//! ```ignore
//! use rsaa_ws::{HttpTransport, Middleware, MiddlewareConfig, Value};
//!
//! let config = MiddlewareConfig::from_env()?;
//! let middleware = Middleware::builder(HttpTransport::from_config(&config))
//!     .with_config(&config)
//!     .with_state(move || store.snapshot())
//!     .build();
//!
//! let action = Value::rsaa(Value::map([
//!     ("endpoint", "/feeds/42".into()),
//!     ("method", "SUBSCRIBE".into()),
//!     ("types", Value::list(["FEED_REQUEST", "FEED_SUCCESS", "FEED_FAILURE"])),
//! ]));
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! middleware.process(action, &tx).await;
//!
//! while let Some(item) = rx.recv().await {
//!     store.reduce(item);
//! }
//! ```

// Core modules
mod body;
mod core;
mod descriptor;
mod error;
mod message;
mod middleware;
mod transport;
mod validation;

// Environment configuration
pub mod config;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;


// Re-export core types
pub use crate::core::{
    CorrelationId, EndpointFn, Fields, Key, Method, Resolver, Symbol, Value, CALL_WS,
};

// Re-export error types
pub use crate::error::{RsaaError, ENDPOINT_FAILED_MESSAGE};

// Re-export message types
pub use message::{ActionType, Forward, Forwarded, OutgoingMessage, Payload, INVALID_RSAA_TYPE};

// Re-export validation
pub use validation::{is_rsaa, is_valid_rsaa, is_valid_type_descriptor, validate_rsaa};

// Re-export descriptor types
pub use descriptor::{
    evaluate, normalize_type_descriptors, CallContext, DescriptorBuilder, NormalizedTypes,
    PayloadSource, Resolvable, TypeDescriptor,
};

// Re-export body extraction
pub use body::extract_body;

// Re-export transport types
pub use transport::{HttpTransport, Request, Response, Transport};

// Re-export middleware types (primary entry point)
pub use middleware::{Middleware, MiddlewareBuilder, NoState, StateAccessor};

pub use config::MiddlewareConfig;

// Re-export commonly used external types
pub use async_trait::async_trait;
