//! Struct schema registration and descriptor resolution.
//!
//! Compound types register their field list once at startup. Descriptor
//! strings received from the wire are resolved against this registry; a
//! descriptor that does not resolve makes the rest of a payload unreadable.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::CodecError;
use super::value::{StructSchema, ValueType};

/// Deepest generic nesting accepted in a descriptor.
const MAX_TYPE_DEPTH: usize = 32;

/// Known struct types, by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    structs: HashMap<String, Arc<StructSchema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a struct schema, returning its type.
    ///
    /// Re-registering an identical schema is a no-op; a different schema under
    /// the same name is rejected.
    pub fn register_struct(&mut self, schema: StructSchema) -> Result<ValueType, CodecError> {
        if let Some(existing) = self.structs.get(&schema.name) {
            if **existing != schema {
                return Err(CodecError::ConflictingSchema(schema.name));
            }
            return Ok(ValueType::Struct(existing.clone()));
        }
        let schema = Arc::new(schema);
        self.structs.insert(schema.name.clone(), schema.clone());
        Ok(ValueType::Struct(schema))
    }

    /// Look up a struct by name.
    pub fn get_struct(&self, name: &str) -> Option<&Arc<StructSchema>> {
        self.structs.get(name)
    }

    /// Resolve a wire descriptor into a type.
    pub fn resolve(&self, descriptor: &str) -> Result<ValueType, CodecError> {
        let mut parser = DescriptorParser {
            input: descriptor,
            pos: 0,
            depth: 0,
            schemas: self,
        };
        let ty = parser.parse_type()?;
        if parser.pos != descriptor.len() {
            return Err(CodecError::UnknownType(descriptor.to_string()));
        }
        Ok(ty)
    }
}

struct DescriptorParser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    schemas: &'a SchemaRegistry,
}

impl<'a> DescriptorParser<'a> {
    fn unknown(&self) -> CodecError {
        CodecError::UnknownType(self.input.to_string())
    }

    fn rest(&self) -> &'a str {
        let input = self.input;
        &input[self.pos..]
    }

    fn expect(&mut self, token: char) -> Result<(), CodecError> {
        if self.rest().starts_with(token) {
            self.pos += token.len_utf8();
            Ok(())
        } else {
            Err(self.unknown())
        }
    }

    fn parse_type(&mut self) -> Result<ValueType, CodecError> {
        self.depth += 1;
        if self.depth > MAX_TYPE_DEPTH {
            return Err(self.unknown());
        }
        let ty = self.parse_named();
        self.depth -= 1;
        ty
    }

    fn parse_named(&mut self) -> Result<ValueType, CodecError> {
        let rest = self.rest();
        let name_len = rest
            .find(['<', ',', '>'])
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        self.pos += name_len;

        match name {
            "bool" => Ok(ValueType::Bool),
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "string" => Ok(ValueType::String),
            "list" => {
                self.expect('<')?;
                let inner = self.parse_type()?;
                self.expect('>')?;
                Ok(ValueType::list(inner))
            }
            "map" => {
                self.expect('<')?;
                let key = self.parse_type()?;
                self.expect(',')?;
                let value = self.parse_type()?;
                self.expect('>')?;
                Ok(ValueType::map(key, value))
            }
            _ => match name.strip_prefix("struct:") {
                Some(struct_name) => self
                    .schemas
                    .get_struct(struct_name)
                    .map(|schema| ValueType::Struct(schema.clone()))
                    .ok_or_else(|| self.unknown()),
                None => Err(self.unknown()),
            },
        }
    }
}
