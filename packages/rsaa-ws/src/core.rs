//! Action data model for the RSAA pipeline.
//!
//! # Overview
//!
//! Actions are plain, order-irrelevant key-value maps built from [`Value`].
//! An action is an RSAA when it carries the [`CALL_WS`] key. That key is a
//! [`Symbol`]: symbols compare by identity, and [`Symbol::new`] always hands
//! out a fresh identity, so application code cannot forge the tag from a
//! string or from another symbol with the same description.
//!
//! Dynamic parts of a call descriptor are stored as values too:
//! - [`EndpointFn`] resolves the endpoint from the current state
//! - [`Resolver`] resolves a `payload` or `meta` from the [`CallContext`]
//!
//! # Correlation
//!
//! Every RSAA processed by the middleware is tagged with a [`CorrelationId`]
//! that appears on each log line of that dispatch.

use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use uuid::Uuid;

use crate::descriptor::CallContext;

// =============================================================================
// Symbols
// =============================================================================

/// Id 0 is reserved for [`CALL_WS`].
static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// An unforgeable identifier compared by identity, not by description.
///
/// Symbols may be used as map keys and as action type identifiers.
///
/// # Example
///
/// ```ignore
/// let started = Symbol::new("STARTED");
/// assert_ne!(started, Symbol::new("STARTED"));
/// assert_eq!(started, started);
/// ```
#[derive(Clone, Copy)]
pub struct Symbol {
    id: u64,
    description: &'static str,
}

/// The key that marks an action as an RSAA.
pub const CALL_WS: Symbol = Symbol {
    id: 0,
    description: "Call WS",
};

impl Symbol {
    /// Allocate a new symbol, distinct from every other symbol in the process.
    pub fn new(description: &'static str) -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description,
        }
    }

    /// Human-readable description. Not used for equality.
    pub fn description(&self) -> &'static str {
        self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Symbol").field(&self.description).finish()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

// =============================================================================
// Keys and methods
// =============================================================================

/// Map key: a plain name or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Name(String),
    Symbol(Symbol),
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<Symbol> for Key {
    fn from(symbol: Symbol) -> Self {
        Key::Symbol(symbol)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

/// Call method of an RSAA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Subscribe,
    Unsubscribe,
}

impl Method {
    /// Parse a method name, ignoring case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_uppercase().as_str() {
            "SUBSCRIBE" => Some(Method::Subscribe),
            "UNSUBSCRIBE" => Some(Method::Unsubscribe),
            _ => None,
        }
    }

    /// The upper-case verb sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Subscribe => "SUBSCRIBE",
            Method::Unsubscribe => "UNSUBSCRIBE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Dynamic functions
// =============================================================================

type EndpointFnInner = dyn Fn(&serde_json::Value) -> Result<String> + Send + Sync;

/// Endpoint function: computes the endpoint from the current state.
#[derive(Clone)]
pub struct EndpointFn(Arc<EndpointFnInner>);

impl EndpointFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the function. A panic inside it is reported as an error.
    pub fn resolve(&self, state: &serde_json::Value) -> Result<String> {
        match catch_unwind(AssertUnwindSafe(|| (self.0)(state))) {
            Ok(result) => result,
            Err(panic_info) => Err(anyhow!(
                "endpoint function panicked: {}",
                panic_message(&panic_info)
            )),
        }
    }
}

impl fmt::Debug for EndpointFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EndpointFn(..)")
    }
}

type ResolverFn = dyn Fn(CallContext) -> BoxFuture<'static, Result<serde_json::Value>> + Send + Sync;

/// Dynamic `payload` / `meta` resolver, called with the [`CallContext`].
///
/// # Example
///
/// ```ignore
/// let payload = Resolver::new(|ctx: CallContext| async move {
///     let body = match ctx.response() {
///         Some(res) => res.json().await?,
///         None => serde_json::Value::Null,
///     };
///     Ok(body)
/// });
///
/// let meta = Resolver::from_fn(|ctx| Ok(ctx.state()["session"].clone()));
/// ```
#[derive(Clone)]
pub struct Resolver(Arc<ResolverFn>);

impl Resolver {
    /// Wrap an async resolver.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self(Arc::new(move |ctx| f(ctx).boxed()))
    }

    /// Wrap a synchronous resolver.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CallContext) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        Self(Arc::new(move |ctx| {
            let resolved = f(&ctx);
            async move { resolved }.boxed()
        }))
    }

    /// Invoke the resolver and await it. A panic inside it is reported as an error.
    pub async fn resolve(&self, ctx: CallContext) -> Result<serde_json::Value> {
        let outcome = AssertUnwindSafe(async { (self.0)(ctx).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => result,
            Err(panic_info) => Err(anyhow!(
                "resolver panicked: {}",
                panic_message(&panic_info)
            )),
        }
    }
}

impl PartialEq for Resolver {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resolver(..)")
    }
}

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Values
// =============================================================================

/// Entries of a [`Value::Map`].
pub type Fields = BTreeMap<Key, Value>;

/// A dynamic action value.
///
/// Functions compare by identity (`Arc` pointer), everything else structurally.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Symbol(Symbol),
    List(Vec<Value>),
    Map(Fields),
    Endpoint(EndpointFn),
    Resolver(Resolver),
}

impl Value {
    /// Build a map from `(key, value)` entries.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<Key>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Wrap a call descriptor under the [`CALL_WS`] key.
    ///
    /// ```ignore
    /// let action = Value::rsaa(Value::map([
    ///     ("endpoint", "/feeds/1".into()),
    ///     ("method", "SUBSCRIBE".into()),
    ///     ("types", Value::list(["START", "OK", "FAIL"])),
    /// ]));
    /// ```
    pub fn rsaa(call: Value) -> Self {
        Value::map([(CALL_WS, call)])
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a named entry of a map. `None` for non-maps.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_map()
            .and_then(|fields| fields.get(&Key::Name(name.to_string())))
    }

    /// Strings and symbols may identify an action type.
    pub fn is_identifier(&self) -> bool {
        matches!(self, Value::String(_) | Value::Symbol(_))
    }

    /// Convert to plain JSON data.
    ///
    /// Symbols become their description; functions cannot be converted.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Symbol(symbol) => serde_json::Value::String(symbol.description().to_string()),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_>>()?,
            ),
            Value::Map(fields) => {
                let mut object = serde_json::Map::with_capacity(fields.len());
                for (key, value) in fields {
                    let name = match key {
                        Key::Name(name) => name.clone(),
                        Key::Symbol(symbol) => symbol.description().to_string(),
                    };
                    object.insert(name, value.to_json()?);
                }
                serde_json::Value::Object(object)
            }
            Value::Endpoint(_) => return Err(anyhow!("an endpoint function is not plain data")),
            Value::Resolver(_) => return Err(anyhow!("a resolver function is not plain data")),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Endpoint(a), Value::Endpoint(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Resolver(a), Value::Resolver(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "{:?}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Symbol(symbol) => write!(f, "{:?}", symbol),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(fields) => f.debug_map().entries(fields).finish(),
            Value::Endpoint(func) => write!(f, "{:?}", func),
            Value::Resolver(func) => write!(f, "{:?}", func),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats become `Null`.
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl From<Symbol> for Value {
    fn from(symbol: Symbol) -> Self {
        Value::Symbol(symbol)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Map(fields)
    }
}

impl From<EndpointFn> for Value {
    fn from(func: EndpointFn) -> Self {
        Value::Endpoint(func)
    }
}

impl From<Resolver> for Value {
    fn from(func: Resolver) -> Self {
        Value::Resolver(func)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| (Key::Name(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

// =============================================================================
// Correlation
// =============================================================================

/// Correlation ID tying together the log lines of one RSAA dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Create a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
