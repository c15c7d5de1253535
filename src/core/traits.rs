//! Collaborator interfaces.
//!
//! The host owns the message transport and the peer list; this crate only needs
//! the narrow surface below. Everything is driven from the host's logic thread.

use std::fmt;

use super::constants::{CONFIG_SYNC_ROUTE_SUFFIX, VERSION_CHECK_ROUTE};

/// Identifier of a remote peer, assigned by the host transport.
pub type PeerId = u64;

/// Logical destination of a message on a peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// Config payloads for the named mod.
    ConfigSync(String),
    /// Version handshake.
    VersionCheck,
    /// Host traffic (entity state, peer info, ...), passed through the outbound gate.
    Host,
}

impl Route {
    /// Wire name of the route, as registered with the host's RPC layer.
    pub fn wire_name(&self) -> String {
        match self {
            Route::ConfigSync(name) => format!("{name}{CONFIG_SYNC_ROUTE_SUFFIX}"),
            Route::VersionCheck => VERSION_CHECK_ROUTE.to_string(),
            Route::Host => "Host".to_string(),
        }
    }

    /// Parse a wire name back into a route.
    pub fn from_wire_name(name: &str) -> Self {
        if name == VERSION_CHECK_ROUTE {
            Route::VersionCheck
        } else if let Some(mod_name) = name.strip_suffix(CONFIG_SYNC_ROUTE_SUFFIX) {
            Route::ConfigSync(mod_name.to_string())
        } else {
            Route::Host
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

/// Target of an outbound config payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every connected, ready peer.
    Everyone,
    /// A single peer.
    Peer(PeerId),
}

/// Unreliable, message-oriented transport supplied by the host.
pub trait Transport {
    /// Currently connected peers.
    fn peers(&self) -> Vec<PeerId>;

    /// Queue `payload` for delivery to `peer` on `route`.
    fn send(&mut self, peer: PeerId, route: &Route, payload: &[u8]);

    /// Whether the peer connection is still open.
    fn is_connected(&self, peer: PeerId) -> bool;

    /// Outbound queue depth for the peer, in transport units.
    fn send_queue_depth(&self, peer: PeerId) -> usize;

    /// Close the connection, surfacing `reason` to the remote side.
    fn disconnect(&mut self, peer: PeerId, reason: &str);

    /// Host name (platform account id, address, ...) used for allow-list lookups.
    fn host_name(&self, peer: PeerId) -> Option<String>;

    /// Whether the peer finished its login and may receive config payloads.
    fn is_ready(&self, peer: PeerId) -> bool {
        self.is_connected(peer)
    }

    /// Send to every connected peer.
    fn broadcast(&mut self, route: &Route, payload: &[u8]) {
        for peer in self.peers() {
            self.send(peer, route, payload);
        }
    }
}
