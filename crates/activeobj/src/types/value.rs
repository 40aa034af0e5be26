//! Argument and result values carried by requests

use std::fmt;

use bytes::Bytes;

use super::identifiers::BodyId;

/// Declared type of a parameter or return value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    /// Reference to another active object
    Ref,
    /// Any value; checked at runtime by the callee
    Any,
}

impl ValueType {
    /// Whether a result of this type can be stood in for by a future.
    ///
    /// Primitive-like and final types cannot be late-bound.
    pub fn is_reifiable(&self) -> bool {
        matches!(self, ValueType::Bytes | ValueType::List | ValueType::Ref | ValueType::Any)
    }

    /// Whether `value` conforms to this declared type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Any, _) => true,
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::Int, Value::Int(_)) => true,
            (ValueType::Float, Value::Float(_)) => true,
            (ValueType::Str, Value::Str(_)) => true,
            (ValueType::Bytes, Value::Bytes(_)) => true,
            (ValueType::List, Value::List(_)) => true,
            (ValueType::Ref, Value::Ref(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A request argument or result
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    List(Vec<Value>),
    Ref(BodyId),
}

impl Value {
    /// Name of the runtime type, used in mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "Str",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Ref(_) => "Ref",
        }
    }

    /// Copy that shares no buffer with `self`.
    ///
    /// `Bytes::clone` only bumps a reference count, so payloads are copied
    /// into fresh allocations here.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Bytes(b) => Value::Bytes(Bytes::copy_from_slice(b)),
            Value::List(items) => Value::List(items.iter().map(Value::deep_copy).collect()),
            other => other.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<BodyId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}
