//! Settings store errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;
use crate::core::SyncError;

/// Errors from reading or writing persisted settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read or written.
    #[error("settings file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid TOML.
    #[error("settings file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// The settings could not be serialized.
    #[error("cannot serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value has no text form.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Applying a loaded value failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
}
