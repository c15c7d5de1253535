//! Setting and custom value records.

use std::fmt;

use crate::codec::{Value, ValueType};

/// Identity of a persisted setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingId {
    /// Section name.
    pub section: String,
    /// Key within the section.
    pub key: String,
}

impl SettingId {
    /// Create an identity.
    pub fn new(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for SettingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.key)
    }
}

/// Handle to a registered setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingHandle(pub(crate) usize);

/// Handle to a registered custom value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CustomValueHandle(pub(crate) usize);

/// A persisted, typed setting.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub(crate) id: SettingId,
    pub(crate) ty: ValueType,
    pub(crate) value: Value,
    pub(crate) synchronized: bool,
    pub(crate) local_base: Option<Value>,
    pub(crate) read_only: bool,
}

impl Setting {
    pub(crate) fn new(id: SettingId, ty: ValueType, value: Value) -> Self {
        Self {
            id,
            ty,
            value,
            synchronized: true,
            local_base: None,
            read_only: false,
        }
    }

    /// Identity.
    pub fn id(&self) -> &SettingId {
        &self.id
    }

    /// Registered type.
    pub fn ty(&self) -> &ValueType {
        &self.ty
    }

    /// Live value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether the setting participates in sync.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Local value saved before the authority overwrote it.
    pub fn local_override(&self) -> Option<&Value> {
        self.local_base.as_ref()
    }

    /// Read-only flag as of the last writability refresh.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// An internal synced value that is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomValue {
    pub(crate) identifier: String,
    pub(crate) ty: ValueType,
    pub(crate) value: Value,
    pub(crate) local_base: Option<Value>,
}

impl CustomValue {
    /// Identifier, unique per registry.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Registered type.
    pub fn ty(&self) -> &ValueType {
        &self.ty
    }

    /// Live value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Local value saved before the authority overwrote it.
    pub fn local_override(&self) -> Option<&Value> {
        self.local_base.as_ref()
    }
}
