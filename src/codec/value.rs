//! Value model.
//!
//! Every synchronizable value has a [`ValueType`] known to both sides. The wire
//! carries the type's descriptor string next to each value so a receiver can
//! detect schema drift before applying anything.

use std::fmt;
use std::sync::Arc;

/// Declared variants of an enum setting. Enums travel as their integer value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSchema {
    /// Enum name, for diagnostics and the settings file.
    pub name: String,
    /// `(variant name, integer value)` pairs.
    pub variants: Vec<(String, i64)>,
}

impl EnumSchema {
    /// Create an enum schema.
    pub fn new<N: Into<String>>(name: impl Into<String>, variants: impl IntoIterator<Item = (N, i64)>) -> Self {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    /// Variant name for an integer value.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }

    /// Integer value for a variant name (case-insensitive).
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }
}

/// One field of a flat struct.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: ValueType,
}

/// Field list of a flat struct, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructSchema {
    /// Struct name; the wire descriptor is `struct:<name>`.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldSchema>,
}

impl StructSchema {
    /// Create a struct schema.
    pub fn new<N: Into<String>>(name: impl Into<String>, fields: impl IntoIterator<Item = (N, ValueType)>) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(name, ty)| FieldSchema { name: name.into(), ty })
                .collect(),
        }
    }
}

/// Closed set of synchronizable types.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    String,
    /// Enum transmitted as its integer value.
    Enum(Arc<EnumSchema>),
    /// Flat struct with registered fields.
    Struct(Arc<StructSchema>),
    /// Homogeneous list.
    List(Box<ValueType>),
    /// Map, transmitted as a list of two-field key/value structs.
    Map(Box<ValueType>, Box<ValueType>),
}

impl ValueType {
    /// List of `inner`.
    pub fn list(inner: ValueType) -> Self {
        ValueType::List(Box::new(inner))
    }

    /// Map from `key` to `value`.
    pub fn map(key: ValueType, value: ValueType) -> Self {
        ValueType::Map(Box::new(key), Box::new(value))
    }

    /// Wire descriptor. Enums report their underlying integer type.
    pub fn descriptor(&self) -> String {
        match self {
            ValueType::Bool => "bool".to_string(),
            ValueType::Int | ValueType::Enum(_) => "int".to_string(),
            ValueType::Float => "float".to_string(),
            ValueType::String => "string".to_string(),
            ValueType::Struct(schema) => format!("struct:{}", schema.name),
            ValueType::List(inner) => format!("list<{}>", inner.descriptor()),
            ValueType::Map(key, value) => {
                format!("map<{},{}>", key.descriptor(), value.descriptor())
            }
        }
    }

    /// Whether a null value is acceptable for this type.
    pub fn is_nullable(&self) -> bool {
        matches!(self, ValueType::String | ValueType::List(_) | ValueType::Map(..))
    }

    /// Value a null decodes to, for nullable types.
    pub fn empty_value(&self) -> Option<Value> {
        match self {
            ValueType::String => Some(Value::String(String::new())),
            ValueType::List(_) => Some(Value::List(Vec::new())),
            ValueType::Map(..) => Some(Value::Map(Vec::new())),
            _ => None,
        }
    }

    /// Whether a value of this type can act as the locking setting.
    pub fn is_truthy_type(&self) -> bool {
        matches!(self, ValueType::Bool | ValueType::Int | ValueType::Enum(_))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// A setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
    /// Enum, by integer value.
    Enum(i64),
    /// Struct field values in declaration order.
    Struct(Vec<Value>),
    /// List elements.
    List(Vec<Value>),
    /// Map entries in insertion order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Whether the value has the shape of `ty`.
    pub fn conforms_to(&self, ty: &ValueType) -> bool {
        match (self, ty) {
            (Value::Bool(_), ValueType::Bool)
            | (Value::Int(_), ValueType::Int)
            | (Value::Float(_), ValueType::Float)
            | (Value::String(_), ValueType::String)
            | (Value::Enum(_), ValueType::Enum(_)) => true,
            (Value::Struct(values), ValueType::Struct(schema)) => {
                values.len() == schema.fields.len()
                    && values
                        .iter()
                        .zip(&schema.fields)
                        .all(|(v, f)| v.conforms_to(&f.ty))
            }
            (Value::List(items), ValueType::List(inner)) => {
                items.iter().all(|item| item.conforms_to(inner))
            }
            (Value::Map(entries), ValueType::Map(k, v)) => entries
                .iter()
                .all(|(key, value)| key.conforms_to(k) && value.conforms_to(v)),
            _ => false,
        }
    }

    /// Reinterpret integers as enums wherever `ty` declares an enum.
    ///
    /// Enums arrive as plain integers; this restores the receiver's view.
    pub fn coerce(self, ty: &ValueType) -> Value {
        match (self, ty) {
            (Value::Int(n), ValueType::Enum(_)) => Value::Enum(n),
            (Value::Struct(values), ValueType::Struct(schema)) => Value::Struct(
                values
                    .into_iter()
                    .zip(&schema.fields)
                    .map(|(v, f)| v.coerce(&f.ty))
                    .collect(),
            ),
            (Value::List(items), ValueType::List(inner)) => {
                Value::List(items.into_iter().map(|i| i.coerce(inner)).collect())
            }
            (Value::Map(entries), ValueType::Map(k, v)) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.coerce(k), value.coerce(v)))
                    .collect(),
            ),
            (value, _) => value,
        }
    }

    /// Truthiness used by the locking setting.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) | Value::Enum(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Struct(v) | Value::List(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Borrow as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as integer (enums included).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) | Value::Enum(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow as float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Borrow as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
