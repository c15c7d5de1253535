//! Per-connection version negotiation.
//!
//! Each side sends one [`Handshake`] per registered check when a connection
//! opens. Received versions are recorded per peer and the verdict is taken
//! once the peer sends its login info:
//!
//! ```text
//! on_peer_connected ──► Pending ──on_peer_info──► Matched
//!                                            └──► Failed(reasons)
//! ```
//!
//! The server fails a peer that has no validated record for a required
//! check. A client fails any check whose versions do not satisfy both sides.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::check::{Handshake, VersionCheck};
use super::error::VersionError;
use crate::core::PeerId;

/// Negotiation state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// Handshakes sent; verdict not taken yet.
    Pending,
    /// Every check passed.
    Matched,
    /// At least one check failed.
    Failed(VersionFailure),
}

/// Why a connection failed negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFailure {
    /// Names of the failed checks.
    pub checks: Vec<String>,
    /// Text for the remote side (server) or the local user (client).
    pub message: String,
}

/// Handler for handshakes whose name matches no registered check.
///
/// Returns whether the handshake was consumed.
pub type FallbackHandler = Box<dyn FnMut(PeerId, &Handshake) -> bool + Send>;

/// Registered checks plus per-connection state.
#[derive(Default)]
pub struct VersionNegotiator {
    checks: Vec<VersionCheck>,
    states: HashMap<PeerId, NegotiationState>,
    /// Unmatched handshake names and versions, for the client's error text.
    not_processed: BTreeMap<String, String>,
    fallback: Option<FallbackHandler>,
}

impl fmt::Debug for VersionNegotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionNegotiator")
            .field("checks", &self.checks)
            .field("states", &self.states)
            .field("not_processed", &self.not_processed)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl VersionNegotiator {
    /// Create an empty negotiator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a check. Names must be unique.
    pub fn add_check(&mut self, check: VersionCheck) -> Result<(), VersionError> {
        if self.check(check.name()).is_some() {
            return Err(VersionError::DuplicateCheck(check.name().to_string()));
        }
        self.checks.push(check);
        Ok(())
    }

    /// Registered checks.
    pub fn checks(&self) -> &[VersionCheck] {
        &self.checks
    }

    /// Mutable access to the registered checks.
    pub fn checks_mut(&mut self) -> &mut [VersionCheck] {
        &mut self.checks
    }

    /// Check by name.
    pub fn check(&self, name: &str) -> Option<&VersionCheck> {
        self.checks.iter().find(|check| check.name() == name)
    }

    /// Install the handler for handshakes no check claims.
    pub fn set_fallback(&mut self, handler: FallbackHandler) {
        self.fallback = Some(handler);
    }

    /// State of the connection to `peer`.
    pub fn state(&self, peer: PeerId) -> Option<&NegotiationState> {
        self.states.get(&peer)
    }

    /// Unmatched handshakes seen since the last connection, by name.
    pub fn not_processed(&self) -> &BTreeMap<String, String> {
        &self.not_processed
    }

    /// A connection opened. Returns the handshakes to send, in order.
    ///
    /// A client skips optional checks; one side is enough for those.
    pub fn on_peer_connected(&mut self, peer: PeerId, is_server: bool) -> Vec<Vec<u8>> {
        self.not_processed.clear();
        self.states.insert(peer, NegotiationState::Pending);

        let mut messages = Vec::new();
        for check in &mut self.checks {
            check.reset_peer(peer);
            if !check.mod_required() && !is_server {
                continue;
            }
            tracing::info!(
                peer,
                check = check.display_name(),
                version = check.current_version(),
                minimum = check.minimum_required_version(),
                to = if is_server { "client" } else { "server" },
                "sending version"
            );
            messages.push(check.handshake().encode());
        }
        messages
    }

    /// A handshake arrived from `peer`.
    pub fn on_handshake(&mut self, peer: PeerId, data: &[u8], is_server: bool) -> Result<(), VersionError> {
        let handshake = Handshake::decode(data)?;

        let mut matched = false;
        for check in self.checks.iter_mut().filter(|check| check.name() == handshake.name) {
            tracing::info!(
                peer,
                check = check.display_name(),
                version = %handshake.current_version,
                minimum = %handshake.minimum_required_version,
                from = if is_server { "client" } else { "server" },
                "received version"
            );
            check.record(peer, &handshake, is_server);
            matched = true;
        }

        if !matched {
            let consumed = self
                .fallback
                .as_mut()
                .is_some_and(|handler| handler(peer, &handshake));
            if !consumed {
                self.not_processed
                    .insert(handshake.name.clone(), handshake.current_version.clone());
            }
        }
        Ok(())
    }

    /// Take the verdict for `peer` once it sent its login info.
    pub fn evaluate(&mut self, peer: PeerId, is_server: bool, host_name: &str) -> &NegotiationState {
        let failed: Vec<&VersionCheck> = self
            .checks
            .iter()
            .filter(|check| {
                if is_server {
                    check.mod_required() && !check.is_validated(peer)
                } else {
                    !check.is_version_ok(peer)
                }
            })
            .collect();

        let state = if failed.is_empty() {
            NegotiationState::Matched
        } else {
            for check in &failed {
                let line = if is_server {
                    check.server_error(host_name)
                } else {
                    check.client_error(peer)
                };
                tracing::warn!(peer, check = check.display_name(), "{line}");
            }
            let lines: Vec<String> = failed
                .iter()
                .map(|check| {
                    if is_server {
                        check.peer_error(peer)
                    } else {
                        check.client_error(peer)
                    }
                })
                .collect();
            let mut message = lines.join("\n");
            if !is_server {
                self.append_not_processed(&mut message);
            }
            NegotiationState::Failed(VersionFailure {
                checks: failed.iter().map(|check| check.name().to_string()).collect(),
                message,
            })
        };

        let entry = self.states.entry(peer).or_insert(NegotiationState::Pending);
        *entry = state;
        entry
    }

    fn append_not_processed(&self, message: &mut String) {
        for (name, version) in &self.not_processed {
            if !message.contains(name.as_str()) {
                if !message.is_empty() {
                    message.push('\n');
                }
                message.push_str(&format!("{name} (Version: {version})"));
            }
        }
    }

    /// A connection closed.
    pub fn on_peer_disconnected(&mut self, peer: PeerId) {
        self.states.remove(&peer);
        for check in &mut self.checks {
            check.reset_peer(peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn strict(current: &str, min: &str) -> VersionCheck {
        VersionCheck::new("mod")
            .with_display_name("Scaler")
            .with_current_version(current)
            .with_minimum_required_version(min)
    }

    fn exchange(server: &mut VersionNegotiator, client: &mut VersionNegotiator) {
        for message in server.on_peer_connected(2, true) {
            client.on_handshake(1, &message, false).unwrap();
        }
        for message in client.on_peer_connected(1, false) {
            server.on_handshake(2, &message, true).unwrap();
        }
    }

    #[test]
    fn test_matching_versions() {
        let mut server = VersionNegotiator::new();
        server.add_check(strict("2.0.0", "2.0.0")).unwrap();
        let mut client = VersionNegotiator::new();
        client.add_check(strict("2.0.1", "2.0.0")).unwrap();

        exchange(&mut server, &mut client);
        assert_eq!(server.state(2), Some(&NegotiationState::Pending));
        assert_eq!(server.evaluate(2, true, "client"), &NegotiationState::Matched);
        assert_eq!(client.evaluate(1, false, "server"), &NegotiationState::Matched);
    }

    #[test]
    fn test_server_rejects_old_client() {
        let mut server = VersionNegotiator::new();
        server.add_check(strict("2.0.0", "2.0.0")).unwrap();
        let mut client = VersionNegotiator::new();
        client.add_check(strict("1.5.0", "1.5.0")).unwrap();

        exchange(&mut server, &mut client);
        let NegotiationState::Failed(failure) = server.evaluate(2, true, "steam_2").clone() else {
            panic!("server accepted an old client");
        };
        assert_eq!(failure.checks, vec!["mod".to_string()]);
        assert!(failure.message.contains("requires minimum 2.0.0"));

        let NegotiationState::Failed(failure) = client.evaluate(1, false, "server").clone() else {
            panic!("client accepted a newer server minimum");
        };
        assert_eq!(failure.message, "Mod Scaler requires minimum 2.0.0. Installed is version 1.5.0.");
    }

    #[test]
    fn test_required_check_never_received() {
        let mut server = VersionNegotiator::new();
        server.add_check(strict("1.0.0", "1.0.0")).unwrap();
        server.on_peer_connected(2, true);
        assert!(matches!(server.evaluate(2, true, "x"), NegotiationState::Failed(_)));
    }

    #[test]
    fn test_client_skips_optional_checks() {
        let mut client = VersionNegotiator::new();
        client
            .add_check(VersionCheck::new("optional").with_mod_required(false))
            .unwrap();
        client.add_check(VersionCheck::new("required")).unwrap();
        assert_eq!(client.on_peer_connected(1, false).len(), 1);

        // Optional check without data passes; the required one does not.
        let NegotiationState::Failed(failure) = client.evaluate(1, false, "server").clone() else {
            panic!("missing required check passed");
        };
        assert_eq!(failure.checks, vec!["required".to_string()]);
    }

    #[test]
    fn test_unmatched_handshake_goes_to_fallback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut client = VersionNegotiator::new();
        let sink = Arc::clone(&seen);
        client.set_fallback(Box::new(move |_, handshake| {
            sink.lock().unwrap().push(handshake.name.clone());
            handshake.name == "legacy"
        }));
        client.on_peer_connected(1, false);

        let legacy = VersionCheck::new("legacy").handshake().encode();
        let other = VersionCheck::new("other.mod")
            .with_current_version("3.1")
            .handshake()
            .encode();
        client.on_handshake(1, &legacy, false).unwrap();
        client.on_handshake(1, &other, false).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["legacy".to_string(), "other.mod".to_string()]);
        assert_eq!(client.not_processed().get("other.mod").map(String::as_str), Some("3.1"));

        client.add_check(VersionCheck::new("mine")).unwrap();
        let NegotiationState::Failed(failure) = client.evaluate(1, false, "server").clone() else {
            panic!("missing required check passed");
        };
        assert!(failure.message.ends_with("other.mod (Version: 3.1)"));
    }

    #[test]
    fn test_disconnect_clears_validation() {
        let mut server = VersionNegotiator::new();
        server.add_check(strict("1.0.0", "1.0.0")).unwrap();
        server.on_peer_connected(2, true);
        server
            .on_handshake(2, &strict("1.0.0", "1.0.0").handshake().encode(), true)
            .unwrap();
        assert!(server.check("mod").unwrap().is_validated(2));

        server.on_peer_disconnected(2);
        assert!(!server.check("mod").unwrap().is_validated(2));
        assert_eq!(server.state(2), None);
    }

    #[test]
    fn test_duplicate_check() {
        let mut negotiator = VersionNegotiator::new();
        negotiator.add_check(VersionCheck::new("a")).unwrap();
        assert_eq!(
            negotiator.add_check(VersionCheck::new("a")),
            Err(VersionError::DuplicateCheck("a".into()))
        );
    }
}
