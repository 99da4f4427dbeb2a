//! Context sanitization.
//!
//! Shared by the structured logger and the error tracker. The walk keeps a
//! stack of the object identities on the current path; meeting one of them
//! again means a cycle and yields [`CIRCULAR`] instead of recursing.

use serde_json::{Map, Value};

use crate::logging::value::{ContextObject, ContextValue};

pub const REDACTED: &str = "[REDACTED]";
pub const CIRCULAR: &str = "[Circular]";
pub const FUNCTION: &str = "[Function]";

const SENSITIVE_PATTERNS: [&str; 7] = [
    "password",
    "token",
    "secret",
    "key",
    "auth",
    "credential",
    "bearer",
];

/// True if a key names something that must never leave the process.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Turn a context graph into JSON safe to log or transmit.
pub fn sanitize_context(value: &ContextValue) -> Value {
    let mut path = Vec::new();
    walk(value, &mut path)
}

/// Sanitize an already-plain JSON value (no functions, no cycles possible).
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize_json(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        other => other.clone(),
    }
}

fn walk(value: &ContextValue, path: &mut Vec<usize>) -> Value {
    match value {
        ContextValue::Null => Value::Null,
        ContextValue::Bool(b) => Value::Bool(*b),
        ContextValue::Number(n) => Value::Number(n.clone()),
        ContextValue::String(s) => Value::String(s.clone()),
        ContextValue::Function(_) => Value::String(FUNCTION.to_string()),
        ContextValue::Array(items) => Value::Array(items.iter().map(|v| walk(v, path)).collect()),
        ContextValue::Object(obj) => walk_object(obj, path),
    }
}

fn walk_object(obj: &ContextObject, path: &mut Vec<usize>) -> Value {
    let identity = obj.identity();
    if path.contains(&identity) {
        return Value::String(CIRCULAR.to_string());
    }

    path.push(identity);
    let mut out = Map::new();
    for (key, child) in obj.entries() {
        let sanitized = if is_sensitive_key(&key) {
            Value::String(REDACTED.to_string())
        } else {
            walk(&child, path)
        };
        out.insert(key, sanitized);
    }
    path.pop();

    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_redacts_nested_keys() {
        let ctx = ContextValue::from(json!({
            "user": {"name": "ada", "Password": "hunter2", "profile": {"apiKey": "abc"}},
            "AuthHeader": "Bearer xyz",
            "items": [{"sessionToken": "t"}]
        }));
        let out = sanitize_context(&ctx);
        assert_eq!(out["user"]["name"], "ada");
        assert_eq!(out["user"]["Password"], REDACTED);
        assert_eq!(out["user"]["profile"]["apiKey"], REDACTED);
        assert_eq!(out["AuthHeader"], REDACTED);
        assert_eq!(out["items"][0]["sessionToken"], REDACTED);
    }

    #[test]
    fn test_sensitive_object_value_is_replaced_whole() {
        let ctx = ContextValue::from(json!({"credentials": {"user": "a", "pass": "b"}}));
        assert_eq!(sanitize_context(&ctx)["credentials"], REDACTED);
    }

    #[test]
    fn test_functions_become_marker() {
        let obj = ContextObject::new();
        obj.insert("onClick", ContextValue::function("handleClick"));
        let out = sanitize_context(&obj.into());
        assert_eq!(out["onClick"], FUNCTION);
    }

    #[test]
    fn test_self_reference_is_marked() {
        let obj = ContextObject::new();
        obj.insert("name", "root");
        obj.insert("self", obj.clone());
        let out = sanitize_context(&ContextValue::Object(obj.clone()));
        assert_eq!(out["name"], "root");
        assert_eq!(out["self"], CIRCULAR);
        obj.remove("self");
    }

    #[test]
    fn test_indirect_cycle_is_marked() {
        let a = ContextObject::new();
        let b = ContextObject::new();
        a.insert("child", b.clone());
        b.insert("parent", a.clone());
        let out = sanitize_context(&ContextValue::Object(a.clone()));
        assert_eq!(out["child"]["parent"], CIRCULAR);
        b.remove("parent");
    }

    #[test]
    fn test_shared_but_acyclic_object_is_not_circular() {
        let shared = ContextObject::new();
        shared.insert("v", 1i64);
        let root = ContextObject::new();
        root.insert("left", shared.clone());
        root.insert("right", shared.clone());
        let out = sanitize_context(&root.into());
        assert_eq!(out, json!({"left": {"v": 1}, "right": {"v": 1}}));
    }

    #[test]
    fn test_sanitize_json_matches_graph_walk() {
        let raw = json!({"a": 1, "token": "x", "nested": [{"secret": 2}]});
        assert_eq!(sanitize_json(&raw), sanitize_context(&ContextValue::from(raw.clone())));
    }

    fn safe_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[mnopqrz]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_safe_input_unchanged(v in safe_json()) {
            // keys drawn from letters that cannot spell any sensitive pattern
            prop_assert_eq!(sanitize_context(&ContextValue::from(v.clone())), v);
        }

        #[test]
        fn prop_sensitive_keys_always_redacted(
            prefix in "[a-z]{0,4}",
            pattern in prop::sample::select(SENSITIVE_PATTERNS.to_vec()),
            depth in 0usize..5,
        ) {
            let key = format!("{prefix}{}", pattern.to_uppercase());
            let mut value = json!({ key.clone(): "leak" });
            for _ in 0..depth {
                value = json!({ "wrap": value });
            }
            let mut out = sanitize_context(&ContextValue::from(value));
            for _ in 0..depth {
                out = out["wrap"].clone();
            }
            prop_assert_eq!(&out[key.as_str()], &json!(REDACTED));
        }
    }
}
