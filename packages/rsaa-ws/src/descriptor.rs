//! Type descriptor normalization and evaluation.
//!
//! The `types` triple of a call descriptor is normalized into three full
//! [`TypeDescriptor`]s before anything is evaluated:
//!
//! ```text
//! "START"                         -> { type: START }
//! "OK"                            -> { type: OK, payload: <response body> }
//! { type: OK, payload: f }        -> { type: OK, payload: f }
//! "FAIL"                          -> { type: FAIL, payload: <remote failure> }
//! { type: FAIL, meta: m }         -> { type: FAIL, payload: <remote failure>, meta: m }
//! { type: FAIL, payload: p }      -> { type: FAIL, payload: p }
//! ```
//!
//! The success and failure slots start from a default payload source and
//! user-supplied fields are applied over it one by one, see
//! [`DescriptorBuilder`].
//!
//! [`evaluate`] turns a descriptor into an [`OutgoingMessage`], resolving
//! dynamic `payload` / `meta` against the [`CallContext`].

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::body::extract_body;
use crate::core::{Key, Resolver, Value};
use crate::error::RsaaError;
use crate::message::{ActionType, OutgoingMessage, Payload};
use crate::transport::Response;

// =============================================================================
// Call Context
// =============================================================================

/// Arguments handed to dynamic resolvers: the action, the state and, once the
/// call has answered, the response.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct CallContext {
    action: Arc<Value>,
    state: serde_json::Value,
    response: Option<Arc<dyn Response>>,
}

impl CallContext {
    pub fn new(action: Arc<Value>, state: serde_json::Value) -> Self {
        Self {
            action,
            state,
            response: None,
        }
    }

    pub fn with_response(mut self, response: Arc<dyn Response>) -> Self {
        self.response = Some(response);
        self
    }

    /// The original action.
    pub fn action(&self) -> &Value {
        &self.action
    }

    /// State snapshot taken when this context was built.
    pub fn state(&self) -> &serde_json::Value {
        &self.state
    }

    /// The transport response; `None` before the call has answered.
    pub fn response(&self) -> Option<&dyn Response> {
        self.response.as_deref()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("action", &self.action)
            .field("state", &self.state)
            .field("has_response", &self.response.is_some())
            .finish()
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// A `payload` or `meta` given either as data or as a resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolvable {
    Static(Value),
    Dynamic(Resolver),
}

impl Resolvable {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Resolver(resolver) => Resolvable::Dynamic(resolver.clone()),
            other => Resolvable::Static(other.clone()),
        }
    }

    async fn resolve(&self, ctx: &CallContext) -> Result<serde_json::Value> {
        match self {
            Resolvable::Static(value) => value.to_json(),
            Resolvable::Dynamic(resolver) => resolver.resolve(ctx.clone()).await,
        }
    }
}

/// Where the payload of a message comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PayloadSource {
    /// No payload.
    #[default]
    Absent,
    /// User-supplied data or resolver.
    Given(Resolvable),
    /// Default of the success slot: the JSON body of the response, if any.
    ResponseBody,
    /// Default of the failure slot: the response body wrapped as
    /// [`RsaaError::Remote`].
    RemoteFailure,
    /// A fixed error, used when the pipeline replaces the payload.
    Error(RsaaError),
}

/// A normalized type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub action_type: ActionType,
    pub payload: PayloadSource,
    pub meta: Option<Resolvable>,
    /// Forces `error: true` on the evaluated message.
    pub error: bool,
}

impl TypeDescriptor {
    pub fn new(action_type: impl Into<ActionType>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: PayloadSource::Absent,
            meta: None,
            error: false,
        }
    }

    pub fn with_payload(mut self, payload: Resolvable) -> Self {
        self.payload = PayloadSource::Given(payload);
        self
    }

    pub fn with_meta(mut self, meta: Resolvable) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Replace the payload with `err` and mark the message as an error.
    pub fn with_error_payload(mut self, err: RsaaError) -> Self {
        self.payload = PayloadSource::Error(err);
        self.error = true;
        self
    }
}

/// Builds a [`TypeDescriptor`] from defaults plus explicit overrides.
///
/// Each field given by the user replaces the corresponding default; fields the
/// user leaves out keep the default.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    action_type: Option<ActionType>,
    payload: PayloadSource,
    meta: Option<Resolvable>,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults of the success slot.
    pub fn success_defaults() -> Self {
        Self {
            payload: PayloadSource::ResponseBody,
            ..Self::default()
        }
    }

    /// Defaults of the failure slot.
    pub fn failure_defaults() -> Self {
        Self {
            payload: PayloadSource::RemoteFailure,
            ..Self::default()
        }
    }

    /// Apply a bare identifier or a descriptor map over the current fields.
    pub fn apply(mut self, value: &Value) -> Self {
        let Value::Map(fields) = value else {
            if let Some(action_type) = ActionType::from_value(value) {
                self.action_type = Some(action_type);
            }
            return self;
        };

        let get = |name: &str| fields.get(&Key::Name(name.to_string()));

        if let Some(action_type) = get("type").and_then(ActionType::from_value) {
            self.action_type = Some(action_type);
        }
        if let Some(payload) = get("payload") {
            self.payload = PayloadSource::Given(Resolvable::from_value(payload));
        }
        if let Some(meta) = get("meta") {
            self.meta = Some(Resolvable::from_value(meta));
        }
        self
    }

    /// `None` if no identifier was ever applied.
    pub fn build(self) -> Option<TypeDescriptor> {
        Some(TypeDescriptor {
            action_type: self.action_type?,
            payload: self.payload,
            meta: self.meta,
            error: false,
        })
    }
}

/// The three normalized lifecycle descriptors of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTypes {
    /// Emitted before the call is attempted, and for setup/transport errors.
    pub start: TypeDescriptor,
    /// Emitted when the response is ok.
    pub success: TypeDescriptor,
    /// Emitted when the response is not ok.
    pub failure: TypeDescriptor,
}

/// Expand the `types` triple into full descriptors.
///
/// Returns `None` if an element yields no identifier, which cannot happen for
/// a triple that passed validation. The input is only borrowed.
pub fn normalize_type_descriptors(types: &[Value; 3]) -> Option<NormalizedTypes> {
    let [start, success, failure] = types;

    Some(NormalizedTypes {
        start: DescriptorBuilder::new().apply(start).build()?,
        success: DescriptorBuilder::success_defaults().apply(success).build()?,
        failure: DescriptorBuilder::failure_defaults().apply(failure).build()?,
    })
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluate a descriptor into a fresh message.
///
/// Resolver failures never escape: a failing `payload` resolver replaces the
/// payload with [`RsaaError::Internal`]; a failing `meta` resolver drops the
/// meta and does the same to the payload. Either sets `error`.
pub async fn evaluate(descriptor: &TypeDescriptor, ctx: &CallContext) -> OutgoingMessage {
    let mut message = OutgoingMessage {
        action_type: descriptor.action_type.clone(),
        payload: None,
        error: descriptor.error,
        meta: None,
    };

    match resolve_payload(&descriptor.payload, ctx).await {
        Ok(payload) => message.payload = payload,
        Err(e) => {
            warn!(action_type = %message.action_type, error = %e, "payload resolution failed");
            message.payload = Some(Payload::Error(RsaaError::internal(e.to_string())));
            message.error = true;
        }
    }

    if let Some(meta) = &descriptor.meta {
        match meta.resolve(ctx).await {
            Ok(value) => message.meta = Some(value),
            Err(e) => {
                warn!(action_type = %message.action_type, error = %e, "meta resolution failed");
                message.payload = Some(Payload::Error(RsaaError::internal(e.to_string())));
                message.error = true;
            }
        }
    }

    if message.error_payload().is_some() {
        message.error = true;
    }
    message
}

async fn resolve_payload(source: &PayloadSource, ctx: &CallContext) -> Result<Option<Payload>> {
    Ok(match source {
        PayloadSource::Absent => None,
        PayloadSource::Given(resolvable) => Some(Payload::Data(resolvable.resolve(ctx).await?)),
        PayloadSource::ResponseBody => extract_body(response_of(ctx)?).await?.map(Payload::Data),
        PayloadSource::RemoteFailure => Some(Payload::Error(remote_failure(ctx).await?)),
        PayloadSource::Error(err) => Some(Payload::Error(err.clone())),
    })
}

fn response_of(ctx: &CallContext) -> Result<&dyn Response> {
    ctx.response()
        .ok_or_else(|| anyhow!("no response to read the payload from"))
}

async fn remote_failure(ctx: &CallContext) -> Result<RsaaError> {
    let response = response_of(ctx)?;
    let body = extract_body(response).await?;

    Ok(RsaaError::remote(
        response.status(),
        response.status_text(),
        body,
    ))
}
