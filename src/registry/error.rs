//! Registry errors.

use thiserror::Error;

/// Errors from registering or updating settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A setting with the same section and key is already registered.
    #[error("setting {section}.{key} is already registered")]
    DuplicateSetting {
        /// Section.
        section: String,
        /// Key.
        key: String,
    },

    /// A custom value with this identifier exists, or the identifier is reserved.
    #[error("cannot have multiple settings with the same name or with a reserved name ({0})")]
    DuplicateCustomValue(String),

    /// A locking setting is already registered.
    #[error("cannot initialize locking setting twice")]
    LockingAlreadySet,

    /// The locking setting must be a bool, integer or enum.
    #[error("locking setting must be bool, int or enum, got {0}")]
    InvalidLockingType(String),

    /// A value does not match the registered type.
    #[error("value for {name} does not match type {expected}")]
    WrongType {
        /// Setting or custom value name.
        name: String,
        /// Registered type descriptor.
        expected: String,
    },
}
