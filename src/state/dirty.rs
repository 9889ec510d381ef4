//! Dirty-flagged partial diff fields
//!
//! Diff events carry changed fields as `{"dirty": bool, "value": ...}`.
//! [`Field`] captures every shape such an entry can take so callers apply
//! changes through [`Field::apply_if_dirty`] instead of probing by hand.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// State of one diff field inside a parent object
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    /// Key not present in the parent
    Absent,
    /// Present, but not flagged dirty
    Clean,
    /// Present and dirty; a null or missing value yields `T::default()`
    Dirty(T),
    /// Present and dirty, but the entry or its value has the wrong shape
    Malformed,
}

impl<T: DeserializeOwned + Default> Field<T> {
    /// Read `parent[key]` as a dirty-flagged field
    pub fn read(parent: &Value, key: &str) -> Self {
        Self::read_or(parent, key, || Some(T::default()))
    }
}

impl<T: DeserializeOwned> Field<T> {
    /// Like [`Field::read`], but a dirty entry must carry a value. A null or
    /// missing value is malformed.
    pub fn read_required(parent: &Value, key: &str) -> Self {
        Self::read_or(parent, key, || None)
    }

    fn read_or(parent: &Value, key: &str, on_missing: impl FnOnce() -> Option<T>) -> Self {
        let Some(entry) = parent.get(key) else {
            return Self::Absent;
        };
        let Some(obj) = entry.as_object() else {
            warn!(field = key, "diff field is not an object: {}", entry);
            return Self::Malformed;
        };
        if !obj.get("dirty").map(truthy).unwrap_or(false) {
            return Self::Clean;
        }
        match obj.get("value") {
            None | Some(Value::Null) => match on_missing() {
                Some(v) => Self::Dirty(v),
                None => {
                    warn!(field = key, "ignoring dirty field without a value");
                    Self::Malformed
                }
            },
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(v) => Self::Dirty(v),
                Err(e) => {
                    warn!(field = key, error = %e, "ignoring malformed dirty value");
                    Self::Malformed
                }
            },
        }
    }
}

impl<T> Field<T> {
    /// Run `apply` with the new value if the field is dirty; returns whether it ran
    pub fn apply_if_dirty(self, apply: impl FnOnce(T)) -> bool {
        match self {
            Self::Dirty(value) => {
                apply(value);
                true
            }
            _ => false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, Self::Dirty(_))
    }
}

/// Loose truthiness for protocol flags
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Integer view of a JSON number or numeric string
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}
