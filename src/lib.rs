//! # serversync
//!
//! Server-authoritative configuration synchronization and version negotiation
//! for modded multiplayer hosts.
//!
//! Each mod registers its settings with a [`ConfigSync`](sync::ConfigSync). The
//! server sends every connecting peer a full snapshot, then partial updates as
//! values change. Clients keep their own values as local overrides while they
//! are connected and get them back when the session ends. A locking setting
//! makes the server's values read-only for everyone but admins.
//!
//! Before any of that, both sides exchange version handshakes; a peer whose
//! required mods are missing or out of range is refused with a readable reason.
//!
//! ## Feature Flags
//!
//! - `settings-file` (default): TOML-backed settings store and persist hooks
//! - `runtime` (default): tokio task driving a [`SyncHost`](host::SyncHost)
//!
//! ## Modules
//!
//! - [`core`]: constants, configuration, error types and the host's `Transport` trait
//! - [`codec`]: value model, struct schemas and the entry wire format
//! - [`registry`]: settings, custom values, authority and locking
//! - [`transport`]: compression, fragmentation, send queues and the outbound gate
//! - [`sync`]: the config sync engine
//! - [`version`]: version handshakes and negotiation
//! - [`host`]: one [`SyncHost`](host::SyncHost) composing all of the above
//! - [`settings`]: persisted settings (requires `settings-file`)
//! - [`runtime`]: tokio driver (requires `runtime`)
//!
//! ## Example Usage
//!
//! ```rust
//! use serversync::prelude::*;
//!
//! let config = SyncConfig::default();
//! let mut sync = ConfigSync::new("dk.thrakal.DifficultyScaler", &config)
//!     .with_display_name("Difficulty Scaler")
//!     .with_current_version("1.2.0");
//! sync.add_locking_setting("General", "Lock Configuration", ValueType::Bool, true)
//!     .unwrap();
//! let speed = sync.add_setting("Monsters", "Speed", ValueType::Float, 1.0).unwrap();
//!
//! let ctx = SessionContext::new(SessionRole::Offline);
//! let mut outbox = Outbox::new(&config);
//! sync.set_value(&ctx, &mut outbox, speed, 1.5).unwrap();
//! assert_eq!(sync.value(speed), &Value::Float(1.5));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Always included
pub mod codec;
pub mod core;
pub mod host;
pub mod registry;
pub mod sync;
pub mod transport;
pub mod version;

// Settings file (feature-gated)
#[cfg(feature = "settings-file")]
#[cfg_attr(docsrs, doc(cfg(feature = "settings-file")))]
pub mod settings;

// tokio driver (feature-gated)
#[cfg(feature = "runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
pub mod runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::{ConfigPayload, Entry, EnumSchema, StructSchema, Value, ValueType};
    pub use crate::core::*;
    pub use crate::host::{HostEvent, SyncHost};
    pub use crate::registry::{CustomValueHandle, RegistryError, SettingHandle};
    pub use crate::sync::{ApplyReport, ConfigSync, ReceiveOutcome, SyncEvent};
    pub use crate::transport::{Outbox, SendResult};
    pub use crate::version::{NegotiationState, Version, VersionCheck, VersionError, VersionNegotiator};

    #[cfg(feature = "settings-file")]
    pub use crate::settings::{MemorySettingsStore, SettingsError, SettingsStore, TomlSettingsStore};

    #[cfg(feature = "runtime")]
    pub use crate::runtime::{HostCommand, HostHandle, spawn_host};
}

// Re-export commonly used items at crate root
pub use core::{SessionContext, SessionRole, SyncConfig, SyncError, Transport};
pub use host::SyncHost;
pub use sync::ConfigSync;
