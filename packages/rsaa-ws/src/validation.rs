//! Structural validation of RSAAs.
//!
//! [`validate_rsaa`] never fails: it returns the (possibly empty) list of
//! violations. Only the top-level shape check short-circuits; every other
//! check runs and contributes its own violation.

use crate::core::{EndpointFn, Fields, Key, Method, Value, CALL_WS};
use crate::descriptor::{normalize_type_descriptors, NormalizedTypes};
use crate::message::ActionType;

const NOT_AN_RSAA: &str = "RSAAs must be plain maps with a [CALL_WS] key";

const CALL_WS_KEYS: [&str; 3] = ["endpoint", "method", "types"];

const DESCRIPTOR_KEYS: [&str; 3] = ["type", "payload", "meta"];

/// Slot names of the `types` triple, in order.
const TYPE_SLOTS: [&str; 3] = ["start", "success", "failure"];

fn field<'a>(fields: &'a Fields, name: &str) -> Option<&'a Value> {
    fields.get(&Key::Name(name.to_string()))
}

fn is_allowed_key(key: &Key, allowed: &[&str]) -> bool {
    matches!(key, Key::Name(name) if allowed.contains(&name.as_str()))
}

/// Is the action a map carrying the [`CALL_WS`] key?
pub fn is_rsaa(action: &Value) -> bool {
    action
        .as_map()
        .is_some_and(|fields| fields.contains_key(&Key::Symbol(CALL_WS)))
}

/// Is the value a full type descriptor?
///
/// Only `type`, `payload` and `meta` are allowed; `type` must be a string or
/// a symbol. `payload` and `meta` are resolved with the call context, so an
/// endpoint function there is rejected.
pub fn is_valid_type_descriptor(value: &Value) -> bool {
    let Some(fields) = value.as_map() else {
        return false;
    };

    if !fields.keys().all(|key| is_allowed_key(key, &DESCRIPTOR_KEYS)) {
        return false;
    }
    if !field(fields, "type").is_some_and(Value::is_identifier) {
        return false;
    }

    !["payload", "meta"]
        .iter()
        .any(|name| matches!(field(fields, name), Some(Value::Endpoint(_))))
}

/// Check an action against the RSAA definition.
pub fn validate_rsaa(action: &Value) -> Vec<String> {
    let mut violations = Vec::new();

    let Some(root) = action.as_map().filter(|_| is_rsaa(action)) else {
        violations.push(NOT_AN_RSAA.to_string());
        return violations;
    };

    for key in root.keys() {
        if *key != Key::Symbol(CALL_WS) {
            violations.push(format!("Invalid root key: {}", key));
        }
    }

    let empty = Fields::new();
    let call = match root.get(&Key::Symbol(CALL_WS)).and_then(Value::as_map) {
        Some(call) => call,
        None => {
            violations.push("[CALL_WS] property must be a plain map".to_string());
            &empty
        }
    };

    for key in call.keys() {
        if !is_allowed_key(key, &CALL_WS_KEYS) {
            violations.push(format!("Invalid [CALL_WS] key: {}", key));
        }
    }

    match field(call, "endpoint") {
        None => violations.push("[CALL_WS] must have an endpoint property".to_string()),
        Some(Value::String(_) | Value::Endpoint(_)) => {}
        Some(_) => violations.push(
            "[CALL_WS].endpoint property must be a string or an endpoint function".to_string(),
        ),
    }

    match field(call, "method") {
        None => violations.push("[CALL_WS] must have a method property".to_string()),
        Some(Value::String(method)) => {
            if Method::parse(method).is_none() {
                violations.push(format!(
                    "Invalid method for [CALL_WS]: {}",
                    method.to_uppercase()
                ));
            }
        }
        Some(_) => violations.push("[CALL_WS].method property must be a string".to_string()),
    }

    match field(call, "types") {
        None => violations.push("[CALL_WS] must have a types property".to_string()),
        Some(Value::List(types)) if types.len() == 3 => {
            for (slot, descriptor) in TYPE_SLOTS.iter().zip(types) {
                if !descriptor.is_identifier() && !is_valid_type_descriptor(descriptor) {
                    violations.push(format!("Invalid {} type", slot));
                }
            }
        }
        Some(_) => {
            violations.push("[CALL_WS].types property must be a list of length 3".to_string())
        }
    }

    violations
}

/// Is the action a valid RSAA?
pub fn is_valid_rsaa(action: &Value) -> bool {
    validate_rsaa(action).is_empty()
}

/// Identifier of the start type, read from a possibly invalid action.
///
/// `None` when `types` is missing, not a list, or its first element is
/// neither an identifier nor a map with an identifier `type`.
pub(crate) fn start_type(action: &Value) -> Option<ActionType> {
    let first = action
        .as_map()?
        .get(&Key::Symbol(CALL_WS))?
        .get("types")?
        .as_list()?
        .first()?;

    match first {
        Value::Map(fields) => field(fields, "type").and_then(ActionType::from_value),
        other => ActionType::from_value(other),
    }
}

/// Endpoint of a validated call descriptor.
#[derive(Debug, Clone)]
pub(crate) enum Endpoint {
    Static(String),
    Dynamic(EndpointFn),
}

/// Owned, typed view of a validated call descriptor.
#[derive(Debug, Clone)]
pub(crate) struct CallSpec {
    pub endpoint: Endpoint,
    pub method: Method,
    pub types: NormalizedTypes,
}

impl CallSpec {
    /// Read the call descriptor of an action that passed [`validate_rsaa`].
    pub fn from_action(action: &Value) -> Option<Self> {
        let call = action.as_map()?.get(&Key::Symbol(CALL_WS))?.as_map()?;

        let endpoint = match field(call, "endpoint")? {
            Value::String(url) => Endpoint::Static(url.clone()),
            Value::Endpoint(func) => Endpoint::Dynamic(func.clone()),
            _ => return None,
        };
        let method = field(call, "method")?.as_str().and_then(Method::parse)?;
        let types = match field(call, "types")?.as_list()? {
            [start, success, failure] => {
                normalize_type_descriptors(&[start.clone(), success.clone(), failure.clone()])?
            }
            _ => return None,
        };

        Some(Self {
            endpoint,
            method,
            types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Resolver, Symbol};
    use serde_json::json;

    fn call(entries: Vec<(&str, Value)>) -> Value {
        Value::rsaa(Value::map(entries))
    }

    fn valid_call() -> Vec<(&'static str, Value)> {
        vec![
            ("endpoint", Value::from("/x")),
            ("method", Value::from("SUBSCRIBE")),
            ("types", Value::list(["START", "OK", "FAIL"])),
        ]
    }

    #[test]
    fn test_is_rsaa() {
        assert!(is_rsaa(&call(valid_call())));
        assert!(!is_rsaa(&Value::map([("type", Value::from("PLAIN"))])));
        assert!(!is_rsaa(&Value::from("not a map")));
        // A string key with the tag's description is not the tag.
        assert!(!is_rsaa(&Value::map([("Call WS", Value::map(valid_call()))])));
    }

    #[test]
    fn test_valid_rsaa_has_no_violations() {
        assert_eq!(validate_rsaa(&call(valid_call())), Vec::<String>::new());
        assert!(is_valid_rsaa(&call(valid_call())));
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let mut entries = valid_call();
        entries[1] = ("method", Value::from("unsubscribe"));
        assert!(is_valid_rsaa(&call(entries)));
    }

    #[test]
    fn test_non_rsaa_short_circuits() {
        let violations = validate_rsaa(&Value::list(["a", "b"]));
        assert_eq!(violations, vec![NOT_AN_RSAA.to_string()]);

        let violations = validate_rsaa(&Value::map([("endpoint", Value::from("/x"))]));
        assert_eq!(violations, vec![NOT_AN_RSAA.to_string()]);
    }

    #[test]
    fn test_extra_root_keys() {
        let action = Value::map([
            (Key::Symbol(CALL_WS), Value::map(valid_call())),
            (Key::from("extra"), Value::from(1)),
        ]);

        assert_eq!(validate_rsaa(&action), vec!["Invalid root key: extra".to_string()]);
    }

    #[test]
    fn test_call_descriptor_must_be_a_map() {
        let violations = validate_rsaa(&Value::rsaa(Value::from("/x")));

        assert!(violations.contains(&"[CALL_WS] property must be a plain map".to_string()));
        assert!(violations.contains(&"[CALL_WS] must have an endpoint property".to_string()));
        assert!(violations.contains(&"[CALL_WS] must have a method property".to_string()));
        assert!(violations.contains(&"[CALL_WS] must have a types property".to_string()));
    }

    #[test]
    fn test_extra_call_keys() {
        let mut entries = valid_call();
        entries.push(("headers", Value::map(Vec::<(&str, Value)>::new())));

        assert_eq!(
            validate_rsaa(&call(entries)),
            vec!["Invalid [CALL_WS] key: headers".to_string()]
        );
    }

    #[test]
    fn test_endpoint_checks() {
        let mut entries = valid_call();
        entries[0] = ("endpoint", Value::from(42));
        assert_eq!(
            validate_rsaa(&call(entries)),
            vec!["[CALL_WS].endpoint property must be a string or an endpoint function".to_string()]
        );

        let mut entries = valid_call();
        entries[0] = ("endpoint", Value::from(EndpointFn::new(|_| Ok("/x".into()))));
        assert!(is_valid_rsaa(&call(entries)));

        let mut entries = valid_call();
        entries.remove(0);
        assert_eq!(
            validate_rsaa(&call(entries)),
            vec!["[CALL_WS] must have an endpoint property".to_string()]
        );
    }

    #[test]
    fn test_invalid_method() {
        let mut entries = valid_call();
        entries[1] = ("method", Value::from("patch"));

        let violations = validate_rsaa(&call(entries));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("Invalid method"));
        assert!(violations[0].ends_with("PATCH"));
    }

    #[test]
    fn test_method_must_be_string() {
        let mut entries = valid_call();
        entries[1] = ("method", Value::from(true));
        assert_eq!(
            validate_rsaa(&call(entries)),
            vec!["[CALL_WS].method property must be a string".to_string()]
        );
    }

    #[test]
    fn test_types_must_be_a_triple() {
        let mut entries = valid_call();
        entries[2] = ("types", Value::list(["START", "OK"]));
        assert_eq!(
            validate_rsaa(&call(entries)),
            vec!["[CALL_WS].types property must be a list of length 3".to_string()]
        );

        let mut entries = valid_call();
        entries[2] = ("types", Value::from("START"));
        assert_eq!(
            validate_rsaa(&call(entries)),
            vec!["[CALL_WS].types property must be a list of length 3".to_string()]
        );
    }

    #[test]
    fn test_each_type_slot_is_checked() {
        let mut entries = valid_call();
        entries[2] = (
            "types",
            Value::list([Value::from(1), Value::from("OK"), Value::Null]),
        );

        assert_eq!(
            validate_rsaa(&call(entries)),
            vec![
                "Invalid start type".to_string(),
                "Invalid failure type".to_string()
            ]
        );
    }

    #[test]
    fn test_descriptor_with_extra_key_is_invalid() {
        let descriptor = Value::map([
            ("type", Value::from("OK")),
            ("payload", Value::from(5)),
            ("extra", Value::from(1)),
        ]);
        assert!(!is_valid_type_descriptor(&descriptor));

        let mut entries = valid_call();
        entries[2] = (
            "types",
            Value::list([Value::from("START"), descriptor, Value::from("FAIL")]),
        );
        assert_eq!(
            validate_rsaa(&call(entries)),
            vec!["Invalid success type".to_string()]
        );
    }

    #[test]
    fn test_descriptor_rules() {
        let symbol = Symbol::new("OK");
        assert!(is_valid_type_descriptor(&Value::map([("type", Value::from(symbol))])));
        assert!(is_valid_type_descriptor(&Value::map([
            ("type", Value::from("OK")),
            ("payload", Value::from(Resolver::from_fn(|_| Ok(json!(1))))),
            ("meta", Value::from(json!({"page": 2}))),
        ])));

        // Missing or non-identifier type.
        assert!(!is_valid_type_descriptor(&Value::map([("payload", Value::from(1))])));
        assert!(!is_valid_type_descriptor(&Value::map([("type", Value::from(1))])));
        // Endpoint functions are not resolvers.
        assert!(!is_valid_type_descriptor(&Value::map([
            ("type", Value::from("OK")),
            ("meta", Value::from(EndpointFn::new(|_| Ok("/x".into())))),
        ])));
        // Symbol keys are never allowed in descriptors.
        assert!(!is_valid_type_descriptor(&Value::map([
            (Key::from("type"), Value::from("OK")),
            (Key::from(CALL_WS), Value::Null),
        ])));
        assert!(!is_valid_type_descriptor(&Value::from("OK")));
    }

    #[test]
    fn test_violations_accumulate() {
        let action = Value::map([
            (Key::Symbol(CALL_WS), Value::map([("method", Value::from("GET"))])),
            (Key::from("type"), Value::from("X")),
        ]);

        assert_eq!(
            validate_rsaa(&action),
            vec![
                "Invalid root key: type".to_string(),
                "[CALL_WS] must have an endpoint property".to_string(),
                "Invalid method for [CALL_WS]: GET".to_string(),
                "[CALL_WS] must have a types property".to_string(),
            ]
        );
    }

    #[test]
    fn test_start_type() {
        assert_eq!(start_type(&call(valid_call())), Some(ActionType::from("START")));

        let mut entries = valid_call();
        entries[2] = (
            "types",
            Value::list([Value::map([("type", Value::from("BEGIN")), ("bogus", Value::Null)])]),
        );
        assert_eq!(start_type(&call(entries)), Some(ActionType::from("BEGIN")));

        let mut entries = valid_call();
        entries[2] = ("types", Value::list([Value::from(7)]));
        assert_eq!(start_type(&call(entries)), None);

        let mut entries = valid_call();
        entries.remove(2);
        assert_eq!(start_type(&call(entries)), None);
    }

    #[test]
    fn test_call_spec_from_valid_action() {
        let spec = CallSpec::from_action(&call(valid_call())).unwrap();

        assert!(matches!(spec.endpoint, Endpoint::Static(ref url) if url == "/x"));
        assert_eq!(spec.method, Method::Subscribe);
        assert_eq!(spec.types.start.action_type, ActionType::from("START"));
        assert_eq!(spec.types.success.action_type, ActionType::from("OK"));
        assert_eq!(spec.types.failure.action_type, ActionType::from("FAIL"));
    }
}
