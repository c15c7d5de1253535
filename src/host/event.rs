//! Notifications surfaced to the embedding application.

use crate::core::PeerId;
use crate::sync::{ApplyReport, SyncEvent};
use crate::version::VersionFailure;

/// Event from a [`SyncHost`](super::SyncHost).
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// An engine changed a value, its authority role or a read-only flag.
    Sync {
        /// Mod the engine belongs to.
        mod_name: String,
        /// What changed.
        event: SyncEvent,
    },

    /// A config payload from a peer was processed.
    Applied {
        /// Mod the payload was for.
        mod_name: String,
        /// Sender.
        peer: PeerId,
        /// What was applied and skipped.
        report: ApplyReport,
    },

    /// The peer passed version negotiation. On a server this is delivered
    /// after the peer's initial snapshots, in order with held host traffic.
    VersionMatched {
        /// The peer.
        peer: PeerId,
    },

    /// The peer failed version negotiation. A server has disconnected it; a
    /// client should log out and show `failure.message`.
    VersionFailed {
        /// The peer.
        peer: PeerId,
        /// Failed checks and the text to show.
        failure: VersionFailure,
    },

    /// The peer was disconnected after its send queue stayed full too long.
    SendTimedOut {
        /// The peer.
        peer: PeerId,
    },
}
