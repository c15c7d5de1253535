//! Version negotiation errors.

use thiserror::Error;

use crate::core::WireError;

/// Errors from version parsing and the handshake.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Not a dotted numeric version with two to four components.
    #[error("invalid version string: {0:?}")]
    InvalidVersion(String),

    /// The handshake message was malformed.
    #[error("malformed version handshake: {0}")]
    Handshake(#[from] WireError),

    /// A check with this name is already registered.
    #[error("duplicate version check: {0}")]
    DuplicateCheck(String),
}
