//! Outbound gate for peers that are still receiving their initial snapshot.
//!
//! While a peer is gated, host traffic to it is held back so it cannot
//! overtake the config snapshot. Releasing the gate replays the held traffic
//! in its original order, including the position at which the version match
//! was signalled.

use std::collections::HashMap;

use crate::core::PeerId;

/// An item released from the gate, in original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateItem {
    /// A held host message.
    Message(Vec<u8>),
    /// The point at which the version match was signalled.
    VersionMatched,
}

#[derive(Debug, Default)]
struct HeldTraffic {
    messages: Vec<Vec<u8>>,
    version_match_at: Option<usize>,
}

/// Per-peer holding buffers.
#[derive(Debug, Default)]
pub struct OutboundGate {
    held: HashMap<PeerId, HeldTraffic>,
}

impl OutboundGate {
    /// Create an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start holding traffic for `peer`.
    pub fn close(&mut self, peer: PeerId) {
        self.held.entry(peer).or_default();
    }

    /// Whether traffic to `peer` is being held.
    pub fn is_closed(&self, peer: PeerId) -> bool {
        self.held.contains_key(&peer)
    }

    /// Hold `message` if the gate is closed for `peer`, otherwise hand it back.
    pub fn pass(&mut self, peer: PeerId, message: Vec<u8>) -> Option<Vec<u8>> {
        match self.held.get_mut(&peer) {
            Some(held) => {
                held.messages.push(message);
                None
            }
            None => Some(message),
        }
    }

    /// Signal the version match. Returns `true` if it may be delivered now.
    pub fn version_matched(&mut self, peer: PeerId) -> bool {
        match self.held.get_mut(&peer) {
            Some(held) => {
                held.version_match_at = Some(held.messages.len());
                false
            }
            None => true,
        }
    }

    /// Open the gate and return everything held, in order.
    pub fn open(&mut self, peer: PeerId) -> Vec<GateItem> {
        let Some(held) = self.held.remove(&peer) else {
            return Vec::new();
        };

        let count = held.messages.len();
        let mut items = Vec::with_capacity(count + 1);
        for (i, message) in held.messages.into_iter().enumerate() {
            if held.version_match_at == Some(i) {
                items.push(GateItem::VersionMatched);
            }
            items.push(GateItem::Message(message));
        }
        if held.version_match_at == Some(count) {
            items.push(GateItem::VersionMatched);
        }
        items
    }

    /// Discard held traffic for a disconnected peer.
    pub fn forget(&mut self, peer: PeerId) {
        self.held.remove(&peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_gate_passes_through() {
        let mut gate = OutboundGate::new();
        assert_eq!(gate.pass(1, vec![1]), Some(vec![1]));
        assert!(gate.version_matched(1));
    }

    #[test]
    fn test_replay_keeps_version_match_position() {
        let mut gate = OutboundGate::new();
        gate.close(1);
        assert_eq!(gate.pass(1, vec![1]), None);
        assert!(!gate.version_matched(1));
        assert_eq!(gate.pass(1, vec![2]), None);

        assert_eq!(
            gate.open(1),
            vec![
                GateItem::Message(vec![1]),
                GateItem::VersionMatched,
                GateItem::Message(vec![2]),
            ]
        );
        assert!(!gate.is_closed(1));
        assert_eq!(gate.pass(1, vec![3]), Some(vec![3]));
    }

    #[test]
    fn test_version_match_after_last_message() {
        let mut gate = OutboundGate::new();
        gate.close(1);
        gate.pass(1, vec![1]);
        gate.version_matched(1);
        assert_eq!(gate.open(1), vec![GateItem::Message(vec![1]), GateItem::VersionMatched]);

        gate.close(2);
        gate.version_matched(2);
        assert_eq!(gate.open(2), vec![GateItem::VersionMatched]);
    }

    #[test]
    fn test_forget() {
        let mut gate = OutboundGate::new();
        gate.close(1);
        gate.pass(1, vec![1]);
        gate.forget(1);
        assert!(gate.open(1).is_empty());
    }
}
