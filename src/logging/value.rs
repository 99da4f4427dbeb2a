//! Caller-supplied context values.
//!
//! Context attached to log entries and error events is an arbitrary graph:
//! objects are shared handles, so the same object can appear twice or even
//! contain itself. `sanitize_context` turns such a graph into plain JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::{Number, Value};

/// A node in a context graph.
#[derive(Clone)]
pub enum ContextValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<ContextValue>),
    Object(ContextObject),
    /// A callable the host attached; only its name is kept.
    Function(String),
}

/// A shared, mutable object node. Clones point at the same object.
#[derive(Clone, Default)]
pub struct ContextObject(Arc<RwLock<BTreeMap<String, ContextValue>>>);

impl ContextObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<ContextValue>) -> &Self {
        self.0
            .write()
            .expect("context object lock poisoned")
            .insert(key.into(), value.into());
        self
    }

    pub fn remove(&self, key: &str) -> Option<ContextValue> {
        self.0.write().expect("context object lock poisoned").remove(key)
    }

    pub fn get(&self, key: &str) -> Option<ContextValue> {
        self.0.read().expect("context object lock poisoned").get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().expect("context object lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entries, in key order.
    pub fn entries(&self) -> Vec<(String, ContextValue)> {
        self.0
            .read()
            .expect("context object lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Identity of the underlying object, used for cycle detection.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ContextObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// Cycles make a derived Debug recurse forever.
impl fmt::Debug for ContextObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .0
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ContextObject")
            .field("id", &format_args!("{:#x}", self.identity()))
            .field("keys", &keys)
            .finish()
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Null => write!(f, "Null"),
            ContextValue::Bool(b) => write!(f, "Bool({b})"),
            ContextValue::Number(n) => write!(f, "Number({n})"),
            ContextValue::String(s) => write!(f, "String({s:?})"),
            ContextValue::Array(items) => f.debug_tuple("Array").field(&items.len()).finish(),
            ContextValue::Object(obj) => obj.fmt(f),
            ContextValue::Function(name) => write!(f, "Function({name})"),
        }
    }
}

impl ContextValue {
    pub fn object() -> ContextObject {
        ContextObject::new()
    }

    pub fn function(name: impl Into<String>) -> Self {
        ContextValue::Function(name.into())
    }

    pub fn as_object(&self) -> Option<&ContextObject> {
        match self {
            ContextValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// JS-style string conversion, used when a non-error value is reported
    /// as an error.
    pub fn display_string(&self) -> String {
        match self {
            ContextValue::Null => "null".to_string(),
            ContextValue::Bool(b) => b.to_string(),
            ContextValue::Number(n) => n.to_string(),
            ContextValue::String(s) => s.clone(),
            ContextValue::Array(items) => items
                .iter()
                .map(ContextValue::display_string)
                .collect::<Vec<_>>()
                .join(","),
            ContextValue::Object(_) => "[object Object]".to_string(),
            ContextValue::Function(name) => format!("function {name}()"),
        }
    }
}

impl From<Value> for ContextValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ContextValue::Null,
            Value::Bool(b) => ContextValue::Bool(b),
            Value::Number(n) => ContextValue::Number(n),
            Value::String(s) => ContextValue::String(s),
            Value::Array(items) => ContextValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                let obj = ContextObject::new();
                for (k, v) in map {
                    obj.insert(k, ContextValue::from(v));
                }
                ContextValue::Object(obj)
            }
        }
    }
}

impl From<ContextObject> for ContextValue {
    fn from(obj: ContextObject) -> Self {
        ContextValue::Object(obj)
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<i64> for ContextValue {
    fn from(n: i64) -> Self {
        ContextValue::Number(n.into())
    }
}

impl From<u64> for ContextValue {
    fn from(n: u64) -> Self {
        ContextValue::Number(n.into())
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n)
            .map(ContextValue::Number)
            .unwrap_or(ContextValue::Null)
    }
}

impl From<Vec<ContextValue>> for ContextValue {
    fn from(items: Vec<ContextValue>) -> Self {
        ContextValue::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_builds_objects() {
        let value = ContextValue::from(json!({"a": {"b": [1, 2]}, "c": "x"}));
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj.get("a").unwrap().as_object().is_some());
    }

    #[test]
    fn test_clones_share_identity() {
        let obj = ContextObject::new();
        let alias = obj.clone();
        alias.insert("k", 1i64);
        assert!(obj.ptr_eq(&alias));
        assert_eq!(obj.len(), 1);
    }

    #[test]
    fn test_debug_on_cycle_terminates() {
        let obj = ContextObject::new();
        obj.insert("me", obj.clone());
        let rendered = format!("{:?}", ContextValue::Object(obj.clone()));
        assert!(rendered.contains("me"));
        obj.remove("me");
    }

    #[test]
    fn test_display_string() {
        assert_eq!(ContextValue::Null.display_string(), "null");
        assert_eq!(ContextValue::from(42i64).display_string(), "42");
        assert_eq!(ContextValue::from(ContextObject::new()).display_string(), "[object Object]");
    }
}
