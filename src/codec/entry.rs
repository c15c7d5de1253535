//! Entry and payload encoding.
//!
//! A plain payload is laid out as:
//!
//! ```text
//! +-------+-----------+------------------------------------------+
//! | flags | count LE32| count x entry                            |
//! +-------+-----------+------------------------------------------+
//!
//! entry = section | key | descriptor ("" for null) | value
//! ```
//!
//! Lists are a count followed by the elements. Structs are a field count
//! followed by `(descriptor, value)` pairs in declaration order. Maps are a
//! count followed by two-field key/value structs.

use super::error::CodecError;
use super::schema::SchemaRegistry;
use super::value::{StructSchema, Value, ValueType};
use super::wire::{WireReader, WireWriter};
use crate::core::constants::FLAG_PARTIAL;

/// Smallest possible encoded entry: three empty strings.
const MIN_ENTRY_SIZE: usize = 12;

/// Name used in diagnostics for map key/value pairs.
const MAP_ENTRY_NAME: &str = "KeyValuePair";

/// Deepest struct, list or map nesting accepted inside one value.
pub const MAX_VALUE_DEPTH: usize = 64;

/// One setting as sent on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Section name.
    pub section: String,
    /// Key within the section.
    pub key: String,
    /// Declared type.
    pub ty: ValueType,
    /// Value, or `None` for null.
    pub value: Option<Value>,
}

impl Entry {
    /// Create an entry carrying a value.
    pub fn new(section: impl Into<String>, key: impl Into<String>, ty: ValueType, value: Value) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            ty,
            value: Some(value),
        }
    }

    /// Create an entry carrying null.
    pub fn null(section: impl Into<String>, key: impl Into<String>, ty: ValueType) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            ty,
            value: None,
        }
    }
}

/// Append one entry to `writer`.
///
/// Nothing is written if the value does not conform to the entry's type.
pub fn encode_entry(writer: &mut WireWriter, entry: &Entry) -> Result<(), CodecError> {
    if let Some(value) = &entry.value {
        if !value.conforms_to(&entry.ty) {
            return Err(CodecError::ValueMismatch(entry.ty.descriptor()));
        }
    }

    writer.write_str(&entry.section);
    writer.write_str(&entry.key);
    match &entry.value {
        None => writer.write_str(""),
        Some(value) => {
            writer.write_str(&entry.ty.descriptor());
            encode_value(writer, &entry.ty, value)?;
        }
    }
    Ok(())
}

/// Append the type-specific encoding of `value` (no descriptor).
pub fn encode_value(writer: &mut WireWriter, ty: &ValueType, value: &Value) -> Result<(), CodecError> {
    match (ty, value) {
        (ValueType::Bool, Value::Bool(b)) => writer.write_bool(*b),
        (ValueType::Int, Value::Int(n)) | (ValueType::Enum(_), Value::Enum(n) | Value::Int(n)) => {
            writer.write_i64(*n)
        }
        (ValueType::Float, Value::Float(f)) => writer.write_f64(*f),
        (ValueType::String, Value::String(s)) => writer.write_str(s),
        (ValueType::Struct(schema), Value::Struct(values)) if values.len() == schema.fields.len() => {
            writer.write_len(values.len());
            for (field, value) in schema.fields.iter().zip(values) {
                writer.write_str(&field.ty.descriptor());
                encode_value(writer, &field.ty, value)?;
            }
        }
        (ValueType::List(inner), Value::List(items)) => {
            writer.write_len(items.len());
            for item in items {
                encode_value(writer, inner, item)?;
            }
        }
        (ValueType::Map(key_ty, value_ty), Value::Map(entries)) => {
            writer.write_len(entries.len());
            for (key, value) in entries {
                writer.write_len(2);
                writer.write_str(&key_ty.descriptor());
                encode_value(writer, key_ty, key)?;
                writer.write_str(&value_ty.descriptor());
                encode_value(writer, value_ty, value)?;
            }
        }
        _ => return Err(CodecError::ValueMismatch(ty.descriptor())),
    }
    Ok(())
}

/// An entry read off the wire, not yet checked against the receiver's registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    /// Section name.
    pub section: String,
    /// Key within the section.
    pub key: String,
    /// Descriptor as received; empty for null.
    pub descriptor: String,
    /// Decoded value, `None` for null.
    pub value: Option<Value>,
    /// First struct schema disagreement met while reading the value.
    ///
    /// The value was still consumed in full, so the reader stays aligned.
    pub schema_error: Option<CodecError>,
}

impl RawEntry {
    /// Check the entry against the type registered for its key.
    pub fn into_typed(self, expected: &ValueType) -> Result<Value, CodecError> {
        if let Some(err) = self.schema_error {
            return Err(err);
        }

        let Some(value) = self.value else {
            return expected
                .empty_value()
                .ok_or_else(|| CodecError::UnexpectedNull(expected.descriptor()));
        };

        let expected_descriptor = expected.descriptor();
        let value = value.coerce(expected);
        if self.descriptor != expected_descriptor || !value.conforms_to(expected) {
            return Err(CodecError::TypeMismatch {
                section: self.section,
                key: self.key,
                expected: expected_descriptor,
                received: self.descriptor,
            });
        }
        Ok(value)
    }
}

/// Read one entry.
///
/// Errors returned here are payload-fatal; per-entry problems are reported
/// through [`RawEntry::schema_error`].
pub fn decode_entry(reader: &mut WireReader<'_>, schemas: &SchemaRegistry) -> Result<RawEntry, CodecError> {
    let section = reader.read_string()?;
    let key = reader.read_string()?;
    let descriptor = reader.read_string()?;

    if descriptor.is_empty() {
        return Ok(RawEntry {
            section,
            key,
            descriptor,
            value: None,
            schema_error: None,
        });
    }

    let ty = schemas.resolve(&descriptor)?;
    let mut decoder = ValueDecoder::new(reader, Some(schemas));
    let value = decoder.read_value(&ty)?;
    let schema_error = decoder.schema_error;

    Ok(RawEntry {
        section,
        key,
        descriptor,
        value: Some(value),
        schema_error,
    })
}

/// Read one entry and check it against `expected`.
pub fn decode_entry_as(
    reader: &mut WireReader<'_>,
    expected: &ValueType,
    schemas: &SchemaRegistry,
) -> Result<Value, CodecError> {
    decode_entry(reader, schemas)?.into_typed(expected)
}

/// Decode a bare value of a known type with no registry.
///
/// Struct fields must match the local schema exactly.
pub(crate) fn decode_value_strict(data: &[u8], ty: &ValueType) -> Result<Value, CodecError> {
    let mut reader = WireReader::new(data);
    let mut decoder = ValueDecoder::new(&mut reader, None);
    let value = decoder.read_value(ty)?;
    if let Some(err) = decoder.schema_error {
        return Err(err);
    }
    reader.finish()?;
    Ok(value.coerce(ty))
}

struct ValueDecoder<'r, 'a> {
    reader: &'r mut WireReader<'a>,
    schemas: Option<&'r SchemaRegistry>,
    schema_error: Option<CodecError>,
    depth: usize,
}

impl<'r, 'a> ValueDecoder<'r, 'a> {
    fn new(reader: &'r mut WireReader<'a>, schemas: Option<&'r SchemaRegistry>) -> Self {
        Self {
            reader,
            schemas,
            schema_error: None,
            depth: 0,
        }
    }

    /// Run `read` one compound level deeper.
    fn nested<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T, CodecError>) -> Result<T, CodecError> {
        if self.depth >= MAX_VALUE_DEPTH {
            return Err(CodecError::NestingTooDeep { limit: MAX_VALUE_DEPTH });
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn record(&mut self, err: CodecError) {
        if self.schema_error.is_none() {
            self.schema_error = Some(err);
        }
    }

    fn resolve(&self, descriptor: &str, hint: Option<&ValueType>) -> Result<ValueType, CodecError> {
        if let Some(hint) = hint {
            if hint.descriptor() == descriptor {
                return Ok(hint.clone());
            }
        }
        match self.schemas {
            Some(schemas) => schemas.resolve(descriptor),
            None => Err(CodecError::UnknownType(descriptor.to_string())),
        }
    }

    fn read_value(&mut self, ty: &ValueType) -> Result<Value, CodecError> {
        let value = match ty {
            ValueType::Bool => Value::Bool(self.reader.read_bool()?),
            ValueType::Int => Value::Int(self.reader.read_i64()?),
            ValueType::Enum(_) => Value::Enum(self.reader.read_i64()?),
            ValueType::Float => Value::Float(self.reader.read_f64()?),
            ValueType::String => Value::String(self.reader.read_string()?),
            ValueType::Struct(schema) => Value::Struct(self.nested(|d| d.read_struct(schema))?),
            ValueType::List(inner) => Value::List(self.nested(|d| d.read_list(inner))?),
            ValueType::Map(key_ty, value_ty) => Value::Map(self.nested(|d| d.read_map(key_ty, value_ty))?),
        };
        Ok(value)
    }

    fn read_list(&mut self, inner: &ValueType) -> Result<Vec<Value>, CodecError> {
        let count = self.reader.read_len(1)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.read_value(inner)?);
        }
        Ok(items)
    }

    fn read_map(&mut self, key_ty: &ValueType, value_ty: &ValueType) -> Result<Vec<(Value, Value)>, CodecError> {
        let count = self.reader.read_len(4)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let expected = [key_ty, value_ty];
            let fields = self.read_fields(&expected)?;
            self.check_fields(MAP_ENTRY_NAME, &["key", "value"], &expected, &fields);
            let mut values = fields.into_iter().map(|(_, value)| value);
            if let (Some(key), Some(value)) = (values.next(), values.next()) {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    fn read_struct(&mut self, schema: &StructSchema) -> Result<Vec<Value>, CodecError> {
        let expected: Vec<&ValueType> = schema.fields.iter().map(|f| &f.ty).collect();
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        let fields = self.read_fields(&expected)?;
        self.check_fields(&schema.name, &names, &expected, &fields);
        Ok(fields.into_iter().map(|(_, value)| value).collect())
    }

    /// Read `(descriptor, value)` pairs, resolving each wire descriptor.
    fn read_fields(&mut self, expected: &[&ValueType]) -> Result<Vec<(String, Value)>, CodecError> {
        let count = self.reader.read_len(4)?;
        let mut fields = Vec::with_capacity(count);
        for i in 0..count {
            let descriptor = self.reader.read_string()?;
            let ty = self.resolve(&descriptor, expected.get(i).copied())?;
            let value = self.read_value(&ty)?;
            fields.push((descriptor, value));
        }
        Ok(fields)
    }

    fn check_fields(&mut self, schema: &str, names: &[&str], expected: &[&ValueType], fields: &[(String, Value)]) {
        if fields.len() != expected.len() {
            self.record(CodecError::SchemaMismatch {
                schema: schema.to_string(),
                field: None,
                expected: format!("(field count: {})", expected.len()),
                received: format!("(field count: {})", fields.len()),
            });
            return;
        }
        for ((name, ty), (descriptor, _)) in names.iter().zip(expected).zip(fields) {
            let wanted = ty.descriptor();
            if *descriptor != wanted {
                self.record(CodecError::SchemaMismatch {
                    schema: schema.to_string(),
                    field: Some(name.to_string()),
                    expected: wanted,
                    received: descriptor.clone(),
                });
                return;
            }
        }
    }
}

/// An outbound payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigPayload {
    /// Merge into the receiver's state rather than replacing it.
    pub partial: bool,
    /// Entries in send order.
    pub entries: Vec<Entry>,
}

impl ConfigPayload {
    /// A full snapshot.
    pub fn full() -> Self {
        Self::default()
    }

    /// A partial update.
    pub fn partial() -> Self {
        Self {
            partial: true,
            entries: Vec::new(),
        }
    }

    /// Append an entry.
    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Serialize as a plain message.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = WireWriter::with_capacity(64 * self.entries.len() + 5);
        writer.write_u8(if self.partial { FLAG_PARTIAL } else { 0 });
        writer.write_len(self.entries.len());
        for entry in &self.entries {
            encode_entry(&mut writer, entry)?;
        }
        Ok(writer.into_bytes())
    }
}

/// A decoded inbound plain message.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    /// Whether the sender marked it partial.
    pub partial: bool,
    /// Entries in wire order.
    pub entries: Vec<RawEntry>,
}

impl RawPayload {
    /// Decode a plain message (flag byte, count, entries).
    ///
    /// Fails as a whole if any descriptor is unresolvable or the buffer is
    /// truncated; nothing from such a payload should be applied.
    pub fn decode(data: &[u8], schemas: &SchemaRegistry) -> Result<Self, CodecError> {
        let mut reader = WireReader::new(data);
        let flags = reader.read_u8()?;
        let count = reader.read_len(MIN_ENTRY_SIZE)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(decode_entry(&mut reader, schemas)?);
        }
        Ok(Self {
            partial: flags & FLAG_PARTIAL != 0,
            entries,
        })
    }
}
