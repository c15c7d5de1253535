//! Version checks and the handshake message.

use std::collections::{HashMap, HashSet};

use super::error::VersionError;
use super::version::satisfies;
use crate::codec::{WireReader, WireWriter};
use crate::core::PeerId;
use crate::core::constants::DEFAULT_VERSION;
use crate::sync::ConfigSync;

/// One handshake message: three length-prefixed strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Name of the check.
    pub name: String,
    /// Minimum version the sender requires of the receiver.
    pub minimum_required_version: String,
    /// Version the sender runs.
    pub current_version: String,
}

impl Handshake {
    /// Encode for the version route.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(
            12 + self.name.len() + self.minimum_required_version.len() + self.current_version.len(),
        );
        writer.write_str(&self.name);
        writer.write_str(&self.minimum_required_version);
        writer.write_str(&self.current_version);
        writer.into_bytes()
    }

    /// Decode a handshake message.
    pub fn decode(data: &[u8]) -> Result<Self, VersionError> {
        let mut reader = WireReader::new(data);
        let handshake = Self {
            name: reader.read_string()?,
            minimum_required_version: reader.read_string()?,
            current_version: reader.read_string()?,
        };
        reader.finish()?;
        Ok(handshake)
    }
}

/// Versions a peer reported for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedVersions {
    /// Minimum the peer requires of us.
    pub minimum_required_version: String,
    /// Version the peer runs.
    pub current_version: String,
}

/// A named version requirement exchanged with every peer.
#[derive(Debug, Clone)]
pub struct VersionCheck {
    name: String,
    display_name: Option<String>,
    current_version: Option<String>,
    minimum_required_version: Option<String>,
    mod_required: bool,
    /// Name of the config sync this check mirrors.
    bound_to: Option<String>,
    received: HashMap<PeerId, ReceivedVersions>,
    /// Peers that passed this check (server side).
    validated: HashSet<PeerId>,
}

impl VersionCheck {
    /// Create a required check.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            current_version: None,
            minimum_required_version: None,
            mod_required: true,
            bound_to: None,
            received: HashMap::new(),
            validated: HashSet::new(),
        }
    }

    /// Create a check that mirrors a config sync's metadata.
    pub fn for_config_sync(sync: &ConfigSync) -> Self {
        let mut check = Self::new(sync.name());
        check.bound_to = Some(sync.name().to_string());
        check.refresh_from(sync);
        check
    }

    /// Set the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the current version.
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }

    /// Set the minimum version peers must run.
    pub fn with_minimum_required_version(mut self, version: impl Into<String>) -> Self {
        self.minimum_required_version = Some(version.into());
        self
    }

    /// Whether the peer must run this mod.
    pub fn with_mod_required(mut self, required: bool) -> Self {
        self.mod_required = required;
        self
    }

    /// Copy metadata from the bound config sync.
    pub fn refresh_from(&mut self, sync: &ConfigSync) {
        self.name = sync.name().to_string();
        self.display_name = Some(sync.display_name().to_string());
        self.current_version = sync.current_version().map(str::to_string);
        self.minimum_required_version = sync.minimum_required_version().map(str::to_string);
        self.mod_required = sync.mod_required();
    }

    /// Name of the bound config sync.
    pub fn bound_to(&self) -> Option<&str> {
        self.bound_to.as_deref()
    }

    /// Check name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name, falling back to the name.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Current version; `0.0.0` when unset.
    pub fn current_version(&self) -> &str {
        self.current_version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    /// Minimum version; defaults to the current version when the mod is
    /// required, else `0.0.0`.
    pub fn minimum_required_version(&self) -> &str {
        match &self.minimum_required_version {
            Some(version) => version,
            None if self.mod_required => self.current_version(),
            None => DEFAULT_VERSION,
        }
    }

    /// Whether peers must run this mod.
    pub fn mod_required(&self) -> bool {
        self.mod_required
    }

    /// Handshake message announcing this side's versions.
    pub fn handshake(&self) -> Handshake {
        Handshake {
            name: self.name.clone(),
            minimum_required_version: self.minimum_required_version().to_string(),
            current_version: self.current_version().to_string(),
        }
    }

    // =========================================================================
    // Per-peer state
    // =========================================================================

    /// Forget what `peer` reported.
    pub fn reset_peer(&mut self, peer: PeerId) {
        self.received.remove(&peer);
        self.validated.remove(&peer);
    }

    /// Record the versions `peer` reported. On a server a passing peer is
    /// marked validated.
    pub fn record(&mut self, peer: PeerId, handshake: &Handshake, is_server: bool) {
        self.received.insert(
            peer,
            ReceivedVersions {
                minimum_required_version: handshake.minimum_required_version.clone(),
                current_version: handshake.current_version.clone(),
            },
        );
        if is_server && self.is_version_ok(peer) {
            self.validated.insert(peer);
        }
    }

    /// Versions `peer` reported, if any.
    pub fn received(&self, peer: PeerId) -> Option<&ReceivedVersions> {
        self.received.get(&peer)
    }

    /// Whether `peer` passed this check on the server.
    pub fn is_validated(&self, peer: PeerId) -> bool {
        self.validated.contains(&peer)
    }

    /// Both sides satisfy each other's minimum. Without data the check passes
    /// only if the mod is optional.
    pub fn is_version_ok(&self, peer: PeerId) -> bool {
        let Some(received) = self.received.get(&peer) else {
            return !self.mod_required;
        };
        satisfies(self.current_version(), &received.minimum_required_version)
            && satisfies(&received.current_version, self.minimum_required_version())
    }

    /// Failure text from this side's point of view (client wording).
    pub fn client_error(&self, peer: PeerId) -> String {
        let Some(received) = self.received.get(&peer) else {
            return format!("Mod {} must not be installed.", self.display_name());
        };
        if satisfies(self.current_version(), &received.minimum_required_version) {
            format!(
                "Mod {} requires maximum {}. Installed is version {}.",
                self.display_name(),
                received.current_version,
                self.current_version()
            )
        } else {
            format!(
                "Mod {} requires minimum {}. Installed is version {}.",
                self.display_name(),
                received.minimum_required_version,
                self.current_version()
            )
        }
    }

    /// Failure text from the peer's point of view, sent as the disconnect reason.
    pub fn peer_error(&self, peer: PeerId) -> String {
        let Some(received) = self.received.get(&peer) else {
            return format!(
                "Mod {} requires minimum {}. It is not installed.",
                self.display_name(),
                self.minimum_required_version()
            );
        };
        if satisfies(&received.current_version, self.minimum_required_version()) {
            format!(
                "Mod {} requires maximum {}. Installed is version {}.",
                self.display_name(),
                self.current_version(),
                received.current_version
            )
        } else {
            format!(
                "Mod {} requires minimum {}. Installed is version {}.",
                self.display_name(),
                self.minimum_required_version(),
                received.current_version
            )
        }
    }

    /// Server log line for a failed peer.
    pub fn server_error(&self, host_name: &str) -> String {
        format!(
            "Disconnect: The client ({host_name}) doesn't have the correct {} version {}",
            self.display_name(),
            self.minimum_required_version()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SyncConfig;

    fn handshake(min: &str, current: &str) -> Handshake {
        Handshake {
            name: "mod".into(),
            minimum_required_version: min.into(),
            current_version: current.into(),
        }
    }

    #[test]
    fn test_handshake_layout() {
        let bytes = handshake("1.0", "1.1").encode();
        assert_eq!(hex::encode(&bytes), "030000006d6f6403000000312e3003000000312e31");
        assert_eq!(Handshake::decode(&bytes).unwrap(), handshake("1.0", "1.1"));
        assert!(Handshake::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_defaults() {
        let check = VersionCheck::new("mod");
        assert_eq!(check.display_name(), "mod");
        assert_eq!(check.current_version(), "0.0.0");
        assert!(check.mod_required());

        let check = VersionCheck::new("mod").with_current_version("1.4.0");
        assert_eq!(check.minimum_required_version(), "1.4.0");

        let check = check.with_mod_required(false);
        assert_eq!(check.minimum_required_version(), "0.0.0");
    }

    #[test]
    fn test_version_ok_both_directions() {
        let mut check = VersionCheck::new("mod")
            .with_current_version("2.0.0")
            .with_minimum_required_version("2.0.0");

        check.record(1, &handshake("1.5.0", "1.5.0"), true);
        assert!(!check.is_version_ok(1));
        assert!(!check.is_validated(1));
        assert_eq!(
            check.peer_error(1),
            "Mod mod requires minimum 2.0.0. Installed is version 1.5.0."
        );

        check.record(2, &handshake("2.0.0", "2.1.0"), true);
        assert!(check.is_validated(2));

        check.record(3, &handshake("3.0.0", "3.0.0"), true);
        assert!(!check.is_version_ok(3));
        assert_eq!(
            check.peer_error(3),
            "Mod mod requires maximum 2.0.0. Installed is version 3.0.0."
        );

        check.reset_peer(2);
        assert!(!check.is_validated(2));
        assert!(check.received(2).is_none());
    }

    #[test]
    fn test_client_errors() {
        let mut check = VersionCheck::new("mod")
            .with_display_name("Difficulty Scaler")
            .with_current_version("1.5.0");
        assert_eq!(check.client_error(1), "Mod Difficulty Scaler must not be installed.");

        check.record(1, &handshake("2.0.0", "2.0.0"), false);
        assert_eq!(
            check.client_error(1),
            "Mod Difficulty Scaler requires minimum 2.0.0. Installed is version 1.5.0."
        );
        assert_eq!(
            check.server_error("steam_1"),
            "Disconnect: The client (steam_1) doesn't have the correct Difficulty Scaler version 1.5.0"
        );
    }

    #[test]
    fn test_missing_data() {
        let optional = VersionCheck::new("mod").with_mod_required(false);
        assert!(optional.is_version_ok(7));
        assert!(!VersionCheck::new("mod").is_version_ok(7));
    }

    #[test]
    fn test_bound_to_config_sync() {
        let sync = ConfigSync::new("dk.mod", &SyncConfig::default())
            .with_display_name("Doors")
            .with_current_version("1.0.2")
            .with_minimum_required_version("1.0.0")
            .with_mod_required(true);
        let check = VersionCheck::for_config_sync(&sync);
        assert_eq!(check.bound_to(), Some("dk.mod"));
        assert_eq!(check.display_name(), "Doors");
        assert_eq!(check.handshake(), Handshake {
            name: "dk.mod".into(),
            minimum_required_version: "1.0.0".into(),
            current_version: "1.0.2".into(),
        });
    }
}
