//! Codec error types.

use thiserror::Error;

use crate::core::WireError;

/// Errors from encoding or decoding setting values.
///
/// [`CodecError::UnknownType`], [`CodecError::NestingTooDeep`] and
/// [`CodecError::Wire`] are payload-fatal when they occur while reading a
/// payload; the others are scoped to one entry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// A type descriptor names no type known to the receiver.
    #[error("unresolvable type descriptor '{0}'")]
    UnknownType(String),

    /// A struct name was registered twice with different fields.
    #[error("struct '{0}' is already registered with a different field list")]
    ConflictingSchema(String),

    /// The entry's declared type differs from the receiver's registered type.
    #[error("type mismatch for {key} in section {section}: expected {expected}, received {received}")]
    TypeMismatch {
        /// Section of the entry.
        section: String,
        /// Key of the entry.
        key: String,
        /// Descriptor registered locally.
        expected: String,
        /// Descriptor found on the wire.
        received: String,
    },

    /// A struct's field count or a field type differs from the local schema.
    #[error("struct {schema} field {which}: expected {expected}, received {received}",
        which = .field.as_deref().unwrap_or("count"))]
    SchemaMismatch {
        /// Struct name.
        schema: String,
        /// Offending field, or `None` for a field-count mismatch.
        field: Option<String>,
        /// What the local schema declares.
        expected: String,
        /// What the wire carried.
        received: String,
    },

    /// A null value arrived for a type that cannot be null.
    #[error("null value for non-nullable type {0}")]
    UnexpectedNull(String),

    /// A value handed to the encoder does not have the shape of its type.
    #[error("value does not conform to type {0}")]
    ValueMismatch(String),

    /// Text from the settings file could not be parsed as the setting's type.
    #[error("cannot parse '{text}' as {ty}")]
    InvalidSettingString {
        /// Target type descriptor.
        ty: String,
        /// Offending text.
        text: String,
    },

    /// A received value nests structs, lists or maps past the decoder's limit.
    #[error("value nesting exceeds {limit} levels")]
    NestingTooDeep {
        /// Deepest nesting accepted.
        limit: usize,
    },

    /// Primitive decoding failed.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

impl CodecError {
    /// Whether the error makes the rest of a payload unreadable.
    pub fn is_payload_fatal(&self) -> bool {
        matches!(
            self,
            CodecError::UnknownType(_) | CodecError::NestingTooDeep { .. } | CodecError::Wire(_)
        )
    }
}
