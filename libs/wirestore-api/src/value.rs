use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a typed value. Determines the native column type via `TypeMapper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Double,
    String,
    ByteArray,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Boolean => f.write_str("boolean"),
            ValueKind::Byte => f.write_str("byte"),
            ValueKind::Short => f.write_str("short"),
            ValueKind::Integer => f.write_str("integer"),
            ValueKind::Long => f.write_str("long"),
            ValueKind::Double => f.write_str("double"),
            ValueKind::String => f.write_str("string"),
            ValueKind::ByteArray => f.write_str("byte_array"),
        }
    }
}

/// A value tagged with its kind.
///
/// JSON form: `{"type": "double", "value": 21.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    ByteArray(Vec<u8>),
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Boolean(_) => ValueKind::Boolean,
            TypedValue::Byte(_) => ValueKind::Byte,
            TypedValue::Short(_) => ValueKind::Short,
            TypedValue::Integer(_) => ValueKind::Integer,
            TypedValue::Long(_) => ValueKind::Long,
            TypedValue::Double(_) => ValueKind::Double,
            TypedValue::String(_) => ValueKind::String,
            TypedValue::ByteArray(_) => ValueKind::ByteArray,
        }
    }

    /// Borrow as a positional statement parameter.
    pub fn as_param(&self) -> SqlParam<'_> {
        match self {
            TypedValue::Boolean(v) => SqlParam::Bool(*v),
            TypedValue::Byte(v) => SqlParam::TinyInt(*v),
            TypedValue::Short(v) => SqlParam::SmallInt(*v),
            TypedValue::Integer(v) => SqlParam::Int(*v),
            TypedValue::Long(v) => SqlParam::BigInt(*v),
            TypedValue::Double(v) => SqlParam::Double(*v),
            TypedValue::String(v) => SqlParam::Text(v),
            TypedValue::ByteArray(v) => SqlParam::Bytes(v),
        }
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        TypedValue::Boolean(v)
    }
}

impl From<i8> for TypedValue {
    fn from(v: i8) -> Self {
        TypedValue::Byte(v)
    }
}

impl From<i16> for TypedValue {
    fn from(v: i16) -> Self {
        TypedValue::Short(v)
    }
}

impl From<i32> for TypedValue {
    fn from(v: i32) -> Self {
        TypedValue::Integer(v)
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        TypedValue::Long(v)
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        TypedValue::Double(v)
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::String(v.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        TypedValue::String(v)
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(v: Vec<u8>) -> Self {
        TypedValue::ByteArray(v)
    }
}

/// Positional parameter bound into a parameterized statement.
///
/// One variant per native bind call (`setBoolean`, `setByte`, ...).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SqlParam<'a> {
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(&'a str),
    Bytes(&'a [u8]),
}
