//! Text form of values, as stored in the settings file.
//!
//! Scalars use their plain invariant text. Enums are stored by variant name.
//! Lists, maps and structs are stored as the hex of their wire encoding.

use super::entry::{decode_value_strict, encode_value};
use super::error::CodecError;
use super::value::{Value, ValueType};
use super::wire::WireWriter;

impl Value {
    /// Render for the settings file.
    pub fn to_setting_string(&self, ty: &ValueType) -> Result<String, CodecError> {
        if !self.conforms_to(ty) {
            return Err(CodecError::ValueMismatch(ty.descriptor()));
        }
        let text = match (self, ty) {
            (Value::Bool(b), _) => b.to_string(),
            (Value::Int(n), _) => n.to_string(),
            (Value::Enum(n), ValueType::Enum(schema)) => match schema.name_of(*n) {
                Some(name) => name.to_string(),
                None => n.to_string(),
            },
            (Value::Float(f), _) => f.to_string(),
            (Value::String(s), _) => s.clone(),
            _ => {
                let mut writer = WireWriter::new();
                encode_value(&mut writer, ty, self)?;
                hex::encode(writer.into_bytes())
            }
        };
        Ok(text)
    }
}

impl ValueType {
    /// Parse text from the settings file.
    pub fn parse_setting_string(&self, text: &str) -> Result<Value, CodecError> {
        let invalid = || CodecError::InvalidSettingString {
            ty: self.descriptor(),
            text: text.to_string(),
        };
        let trimmed = text.trim();

        match self {
            ValueType::Bool => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(invalid())
                }
            }
            ValueType::Int => trimmed.parse().map(Value::Int).map_err(|_| invalid()),
            ValueType::Float => trimmed.parse().map(Value::Float).map_err(|_| invalid()),
            ValueType::String => Ok(Value::String(text.to_string())),
            ValueType::Enum(schema) => schema
                .value_of(trimmed)
                .or_else(|| trimmed.parse().ok())
                .map(Value::Enum)
                .ok_or_else(invalid),
            ValueType::Struct(_) | ValueType::List(_) | ValueType::Map(..) => {
                let bytes = hex::decode(trimmed).map_err(|_| invalid())?;
                decode_value_strict(&bytes, self).map_err(|_| invalid())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::{EnumSchema, StructSchema};
    use std::sync::Arc;

    #[test]
    fn test_scalar_text() {
        assert_eq!(Value::Bool(true).to_setting_string(&ValueType::Bool).unwrap(), "true");
        assert_eq!(Value::Float(0.25).to_setting_string(&ValueType::Float).unwrap(), "0.25");
        assert_eq!(ValueType::Bool.parse_setting_string("True").unwrap(), Value::Bool(true));
        assert_eq!(ValueType::Int.parse_setting_string(" -7 ").unwrap(), Value::Int(-7));
        assert_eq!(ValueType::Float.parse_setting_string("1").unwrap(), Value::Float(1.0));
        assert!(ValueType::Int.parse_setting_string("seven").is_err());
    }

    #[test]
    fn test_enum_text() {
        let ty = ValueType::Enum(Arc::new(EnumSchema::new("Toggle", [("Off", 0), ("On", 1)])));
        assert_eq!(Value::Enum(1).to_setting_string(&ty).unwrap(), "On");
        assert_eq!(Value::Enum(4).to_setting_string(&ty).unwrap(), "4");
        assert_eq!(ty.parse_setting_string("off").unwrap(), Value::Enum(0));
        assert_eq!(ty.parse_setting_string("4").unwrap(), Value::Enum(4));
    }

    #[test]
    fn test_compound_text() {
        let point = ValueType::Struct(Arc::new(StructSchema::new(
            "Point",
            [("x", ValueType::Int), ("y", ValueType::Int)],
        )));
        let ty = ValueType::list(point);
        let value = Value::List(vec![Value::Struct(vec![Value::Int(1), Value::Int(2)])]);

        let text = value.to_setting_string(&ty).unwrap();
        assert!(text.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ty.parse_setting_string(&text).unwrap(), value);
        assert!(ty.parse_setting_string("zz").is_err());
    }
}
