//! The XML-RPC value model.
//!
//! Covers the scalar and compound types the host actually exchanges:
//! integers, booleans, strings, doubles, arrays and structs. Internal code
//! represents "no value" as `Option<Value>`; the reserved on-wire stand-in
//! (the one-member struct `{null: ""}`) exists only at the encode/decode
//! boundary and is produced and recognized via [`Value::null_sentinel`] and
//! [`Value::is_null_sentinel`].

use std::collections::BTreeMap;
use std::fmt;

/// Member name of the null sentinel struct.
const NULL_KEY: &str = "null";

/// A single XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `<int>` / `<i4>`.
    Int(i32),
    /// `<boolean>`, encoded as `0`/`1`.
    Bool(bool),
    /// `<string>`, or an untyped `<value>` body.
    Str(String),
    /// `<double>`.
    Double(f64),
    /// `<array><data>...</data></array>`.
    Array(Vec<Value>),
    /// `<struct>` with named members. Ordered map so encoding is stable.
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// The reserved wire stand-in for "no value": the struct `{null: ""}`.
    ///
    /// The host's encoding has no native null, and an empty string is a
    /// legitimate value, so absence travels as this distinguished struct.
    pub fn null_sentinel() -> Value {
        let mut members = BTreeMap::new();
        members.insert(NULL_KEY.to_string(), Value::Str(String::new()));
        Value::Struct(members)
    }

    /// True if this value is exactly the null sentinel struct.
    ///
    /// Distinguished by structure, never by comparison with an empty
    /// string: `Value::Str("")` is not the sentinel.
    pub fn is_null_sentinel(&self) -> bool {
        match self {
            Value::Struct(members) => {
                members.len() == 1 && members.get(NULL_KEY) == Some(&Value::Str(String::new()))
            }
            _ => false,
        }
    }

    /// Borrow the string contents, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents, if this is an integer value.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean contents. The host encodes flags as `<boolean>` but some
    /// procedures answer with `<int>` 0/1, so both are accepted.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    /// Borrow the element list, if this is an array value.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Struct(members) => {
                write!(f, "{{")?;
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_structural() {
        let sentinel = Value::null_sentinel();
        assert!(sentinel.is_null_sentinel());
        assert_ne!(sentinel, Value::Str(String::new()));
        assert!(!Value::Str(String::new()).is_null_sentinel());
    }

    #[test]
    fn test_sentinel_requires_exact_shape() {
        let mut members = BTreeMap::new();
        members.insert("null".to_string(), Value::Str(String::new()));
        members.insert("extra".to_string(), Value::Int(1));
        assert!(!Value::Struct(members).is_null_sentinel());

        let mut members = BTreeMap::new();
        members.insert("null".to_string(), Value::Str("x".to_string()));
        assert!(!Value::Struct(members).is_null_sentinel());
    }

    #[test]
    fn test_as_bool_accepts_int() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Int(1).as_bool(), Some(true));
        assert_eq!(Value::Str("1".to_string()).as_bool(), None);
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from("hi"), Value::Str("hi".to_string()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(true), Value::Bool(true));
    }
}
