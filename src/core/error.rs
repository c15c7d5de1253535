//! Error types shared across layers.

use thiserror::Error;

use crate::codec::CodecError;
use crate::registry::RegistryError;
use crate::transport::{CompressionError, TransportError};
use crate::version::VersionError;

/// Errors from reading or writing the primitive wire encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Input ended before the value was complete.
    #[error("unexpected end of data: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Bytes required by the read.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// A length or count field was negative or implausibly large.
    #[error("invalid length prefix: {0}")]
    InvalidLength(u32),

    /// Bytes were left over after a complete read.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Top-level errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wire error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Compression error on the outbound path.
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    /// Inbound message could not be unwrapped.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Version negotiation error.
    #[error("version error: {0}")]
    Version(#[from] VersionError),

    /// No engine registered under the given name.
    #[error("unknown config sync: {0}")]
    UnknownConfigSync(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
