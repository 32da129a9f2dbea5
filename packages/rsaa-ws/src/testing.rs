//! Testing utilities for code that dispatches RSAAs.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! rsaa-ws = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use rsaa_ws::testing::{subscribe_action, RecordingForward, StubResponse, StubTransport};
//!
//! let transport = StubTransport::responding(StubResponse::json(200, json!({"v": 1})));
//! let middleware = Middleware::builder(transport).build();
//! let forward = RecordingForward::new();
//!
//! middleware
//!     .process(subscribe_action("/x", ["START", "OK", "FAIL"]), &forward)
//!     .await;
//!
//! assert_eq!(forward.types(), vec!["START", "OK"]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::core::Value;
use crate::message::{Forward, Forwarded, OutgoingMessage};
use crate::transport::{Request, Response, Transport};

// =============================================================================
// Actions
// =============================================================================

/// Build an RSAA with the given endpoint, method and types.
pub fn call_action<T: Into<Value>>(
    endpoint: impl Into<Value>,
    method: &str,
    types: [T; 3],
) -> Value {
    Value::rsaa(Value::map([
        ("endpoint", endpoint.into()),
        ("method", Value::from(method)),
        ("types", Value::list(types)),
    ]))
}

/// Build a SUBSCRIBE RSAA.
pub fn subscribe_action<T: Into<Value>>(endpoint: impl Into<Value>, types: [T; 3]) -> Value {
    call_action(endpoint, "SUBSCRIBE", types)
}

// =============================================================================
// Responses
// =============================================================================

/// Scripted [`Response`].
#[derive(Debug, Clone)]
pub struct StubResponse {
    ok: Option<bool>,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    json_error: Option<String>,
    json_reads: Arc<AtomicUsize>,
}

impl StubResponse {
    /// A response with no headers and no body.
    pub fn new(status: u16) -> Self {
        Self {
            ok: None,
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: None,
            json_error: None,
            json_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A response with an `application/json` body.
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(body)
    }

    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the success flag, which otherwise follows the status.
    pub fn with_ok(mut self, ok: bool) -> Self {
        self.ok = Some(ok);
        self
    }

    /// Make `json()` fail with `message`.
    pub fn with_json_error(mut self, message: impl Into<String>) -> Self {
        self.json_error = Some(message.into());
        self
    }

    /// How many times the body was read, across clones.
    pub fn json_reads(&self) -> usize {
        self.json_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Response for StubResponse {
    fn ok(&self) -> bool {
        self.ok.unwrap_or((200..300).contains(&self.status))
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn status_text(&self) -> String {
        self.status_text.clone()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    async fn json(&self) -> Result<serde_json::Value> {
        self.json_reads.fetch_add(1, Ordering::SeqCst);
        match &self.json_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.body.clone().unwrap_or(serde_json::Value::Null)),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Scripted outcome of a stub call.
#[derive(Debug, Clone)]
pub enum StubReply {
    Respond(StubResponse),
    Fail(String),
    Panic(String),
}

type ReplyFn = dyn Fn(&Request) -> StubReply + Send + Sync;

/// [`Transport`] that records requests and answers from a script.
pub struct StubTransport {
    reply: Box<ReplyFn>,
    requests: Mutex<Vec<Request>>,
    delay: Option<Duration>,
    jitter_ms: Option<u64>,
}

impl StubTransport {
    /// Answer each request with the reply computed from it.
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&Request) -> StubReply + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
            delay: None,
            jitter_ms: None,
        }
    }

    /// Always answer with `response`.
    pub fn responding(response: StubResponse) -> Self {
        Self::new(move |_| StubReply::Respond(response.clone()))
    }

    /// Always fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| StubReply::Fail(message.clone()))
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep a random 0..=max_ms milliseconds before answering.
    pub fn with_jitter(mut self, max_ms: u64) -> Self {
        self.jitter_ms = Some(max_ms);
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn call(&self, request: &Request) -> Result<Box<dyn Response>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(max_ms) = self.jitter_ms {
            tokio::time::sleep(Duration::from_millis(fastrand::u64(0..=max_ms))).await;
        }

        match (self.reply)(request) {
            StubReply::Respond(response) => Ok(Box::new(response)),
            StubReply::Fail(message) => Err(anyhow!("{}", message)),
            StubReply::Panic(message) => panic!("{}", message),
        }
    }
}

// =============================================================================
// Forwarding
// =============================================================================

/// [`Forward`] that records everything it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingForward {
    items: Mutex<Vec<Forwarded>>,
}

impl RecordingForward {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<Forwarded> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forwarded messages, skipping pass-through actions.
    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                Forwarded::Message(message) => Some(message),
                Forwarded::Action(_) => None,
            })
            .collect()
    }

    /// Type names of forwarded messages.
    pub fn types(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|message| message.action_type.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Forward for RecordingForward {
    async fn forward(&self, item: Forwarded) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }
}
