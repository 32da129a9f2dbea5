//! The dispatch pipeline.
//!
//! Every action handed to [`Middleware::process`] moves through:
//!
//! ```text
//! IDLE -> RECOGNIZED -> VALIDATED -> STARTED -> SUCCEEDED | FAILED
//!   |          |             |           |
//!   |          |             |           +-- call failed: start + ClientError
//!   |          |             +-- endpoint fn failed: start + Subscribe/UnsubscribeError
//!   |          +-- violations: one InvalidRSAA message
//!   +-- not an RSAA: forwarded unchanged
//! ```
//!
//! A started call forwards exactly one start message and one terminal message.
//! Nothing escapes `process`: errors and panics from user code and from the
//! transport become messages.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::config::MiddlewareConfig;
use crate::core::{panic_message, CorrelationId, Value};
use crate::descriptor::{evaluate, CallContext};
use crate::error::RsaaError;
use crate::message::{ActionType, Forward, Forwarded, OutgoingMessage};
use crate::transport::{Request, Response, Transport};
use crate::validation::{is_rsaa, start_type, validate_rsaa, CallSpec, Endpoint};

/// Read access to the host's current state.
///
/// Called once per stage, so resolvers always see a fresh snapshot.
pub trait StateAccessor: Send + Sync {
    fn state(&self) -> serde_json::Value;
}

impl<F> StateAccessor for F
where
    F: Fn() -> serde_json::Value + Send + Sync,
{
    fn state(&self) -> serde_json::Value {
        self()
    }
}

/// State accessor for hosts without state. Always returns `null`.
pub struct NoState;

impl StateAccessor for NoState {
    fn state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Intercepts RSAAs, performs their call and forwards lifecycle messages.
///
/// Shareable across tasks; dispatches do not coordinate with each other.
///
/// # Example
///
/// ```ignore
/// let middleware = Middleware::builder(HttpTransport::from_config(&config))
///     .with_state(move || store.snapshot())
///     .with_config(&config)
///     .build();
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// middleware.process(action, &tx).await;
/// ```
pub struct Middleware {
    transport: Arc<dyn Transport>,
    state: Arc<dyn StateAccessor>,
    call_timeout: Option<Duration>,
}

impl Middleware {
    pub fn builder<T: Transport>(transport: T) -> MiddlewareBuilder {
        MiddlewareBuilder::new(transport)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Process one action, forwarding everything it produces to `next`.
    pub async fn process(&self, action: Value, next: &dyn Forward) {
        if !is_rsaa(&action) {
            next.forward(Forwarded::Action(action)).await;
            return;
        }

        let cid = CorrelationId::new();

        let violations = validate_rsaa(&action);
        if !violations.is_empty() {
            debug!(%cid, count = violations.len(), "rejecting invalid RSAA");
            self.reject(&action, violations, cid, next).await;
            return;
        }

        let Some(call) = CallSpec::from_action(&action) else {
            error!(%cid, "validated RSAA has no readable call descriptor");
            let violations = vec!["[CALL_WS] could not be read".to_string()];
            self.reject(&action, violations, cid, next).await;
            return;
        };

        let action = Arc::new(action);
        let types = &call.types;

        let endpoint = match &call.endpoint {
            Endpoint::Static(url) => url.clone(),
            Endpoint::Dynamic(func) => match func.resolve(&self.snapshot(cid)) {
                Ok(url) => url,
                Err(e) => {
                    warn!(%cid, method = %call.method, error = %e, "endpoint function failed");
                    let descriptor = types
                        .start
                        .clone()
                        .with_error_payload(RsaaError::endpoint_failed(call.method));
                    let ctx = CallContext::new(action.clone(), self.snapshot(cid));
                    next.forward(evaluate(&descriptor, &ctx).await.into()).await;
                    return;
                }
            },
        };

        let ctx = CallContext::new(action.clone(), self.snapshot(cid));
        next.forward(evaluate(&types.start, &ctx).await.into()).await;

        let request = Request {
            endpoint,
            method: call.method,
        };
        debug!(%cid, endpoint = %request.endpoint, method = %request.method, "calling transport");

        let response = match self.call(&request, cid).await {
            Ok(response) => response,
            Err(e) => {
                error!(%cid, error = ?e, "transport call failed");
                let descriptor = types
                    .start
                    .clone()
                    .with_error_payload(RsaaError::client(e.to_string()));
                let ctx = CallContext::new(action.clone(), self.snapshot(cid));
                next.forward(evaluate(&descriptor, &ctx).await.into()).await;
                return;
            }
        };

        let ok = response.ok();
        debug!(%cid, status = response.status(), ok, "transport responded");

        let ctx = CallContext::new(action, self.snapshot(cid)).with_response(response);
        let message = if ok {
            evaluate(&types.success, &ctx).await
        } else {
            let mut message = evaluate(&types.failure, &ctx).await;
            message.error = true;
            message
        };
        next.forward(message.into()).await;
    }

    async fn reject(
        &self,
        action: &Value,
        violations: Vec<String>,
        cid: CorrelationId,
        next: &dyn Forward,
    ) {
        let action_type = start_type(action).unwrap_or_else(|| {
            warn!(%cid, "invalid RSAA has no start type, using fallback type");
            ActionType::invalid_rsaa()
        });

        let message = OutgoingMessage::failure(action_type, RsaaError::invalid(violations));
        next.forward(message.into()).await;
    }

    /// Run the transport, containing panics and applying the deadline.
    async fn call(&self, request: &Request, cid: CorrelationId) -> Result<Arc<dyn Response>> {
        let call = AssertUnwindSafe(self.transport.call(request)).catch_unwind();

        let outcome = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| anyhow!("request timed out after {:?}", limit))?,
            None => call.await,
        };

        match outcome {
            Ok(result) => result.map(Arc::from),
            Err(panic_info) => {
                let panic_msg = panic_message(&panic_info);
                error!(%cid, panic = %panic_msg, "transport panicked");
                Err(anyhow!("transport panicked: {}", panic_msg))
            }
        }
    }

    fn snapshot(&self, cid: CorrelationId) -> serde_json::Value {
        match catch_unwind(AssertUnwindSafe(|| self.state.state())) {
            Ok(state) => state,
            Err(panic_info) => {
                error!(%cid, panic = %panic_message(&panic_info), "state accessor panicked");
                serde_json::Value::Null
            }
        }
    }
}

/// Builder for [`Middleware`].
pub struct MiddlewareBuilder {
    transport: Arc<dyn Transport>,
    state: Arc<dyn StateAccessor>,
    call_timeout: Option<Duration>,
}

impl MiddlewareBuilder {
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    /// Use a transport that is shared with other parts of the system.
    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Arc::new(NoState),
            call_timeout: None,
        }
    }

    pub fn with_state<S: StateAccessor + 'static>(mut self, state: S) -> Self {
        self.state = Arc::new(state);
        self
    }

    /// Fail calls that take longer than `limit` with a `ClientError`.
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    pub fn with_config(mut self, config: &MiddlewareConfig) -> Self {
        self.call_timeout = config.call_timeout;
        self
    }

    pub fn build(self) -> Middleware {
        Middleware {
            transport: self.transport,
            state: self.state,
            call_timeout: self.call_timeout,
        }
    }
}
