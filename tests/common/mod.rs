//! In-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};

use serversync::core::{PeerId, Route, SyncConfig, Transport};
use serversync::host::SyncHost;

/// Peer id under which a client sees its server.
pub const SERVER: PeerId = 0;

/// One message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub peer: PeerId,
    pub route: Route,
    pub data: Vec<u8>,
}

/// Records outbound traffic until a test moves it to the other side.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    pub connected: BTreeSet<PeerId>,
    pub queue_depth: HashMap<PeerId, usize>,
    pub host_names: HashMap<PeerId, String>,
    pub outgoing: Vec<Sent>,
    pub disconnects: Vec<(PeerId, String)>,
}

impl LoopbackTransport {
    pub fn with_peers(peers: &[PeerId]) -> Self {
        Self {
            connected: peers.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn take_outgoing(&mut self) -> Vec<Sent> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn sent_to(&self, peer: PeerId) -> usize {
        self.outgoing.iter().filter(|sent| sent.peer == peer).count()
    }
}

impl Transport for LoopbackTransport {
    fn peers(&self) -> Vec<PeerId> {
        self.connected.iter().copied().collect()
    }

    fn send(&mut self, peer: PeerId, route: &Route, payload: &[u8]) {
        self.outgoing.push(Sent {
            peer,
            route: route.clone(),
            data: payload.to_vec(),
        });
    }

    fn is_connected(&self, peer: PeerId) -> bool {
        self.connected.contains(&peer)
    }

    fn send_queue_depth(&self, peer: PeerId) -> usize {
        self.queue_depth.get(&peer).copied().unwrap_or(0)
    }

    fn disconnect(&mut self, peer: PeerId, reason: &str) {
        self.connected.remove(&peer);
        self.disconnects.push((peer, reason.to_string()));
    }

    fn host_name(&self, peer: PeerId) -> Option<String> {
        self.host_names.get(&peer).cloned()
    }
}

pub type TestHost = SyncHost<LoopbackTransport>;

pub fn host(peers: &[PeerId]) -> TestHost {
    SyncHost::new(LoopbackTransport::with_peers(peers), SyncConfig::default())
}

/// Move everything `from` sent to `to_id` into `to`, as coming from `from_id`.
///
/// Host traffic is returned instead of delivered.
pub fn deliver(from: &mut TestHost, from_id: PeerId, to: &mut TestHost, to_id: PeerId) -> Vec<Vec<u8>> {
    let outgoing = from.transport_mut().take_outgoing();
    let mut host_traffic = Vec::new();
    let mut kept = Vec::new();
    for sent in outgoing {
        if sent.peer != to_id {
            kept.push(sent);
            continue;
        }
        match sent.route {
            Route::Host => host_traffic.push(sent.data),
            route => to
                .on_message(from_id, &route, &sent.data)
                .unwrap_or_else(|err| panic!("delivery on {route} failed: {err}")),
        }
    }
    from.transport_mut().outgoing = kept;
    host_traffic
}

/// Tick `host` until its send queues are empty.
pub fn flush(host: &mut TestHost) {
    for _ in 0..64 {
        if host.is_idle() {
            return;
        }
        host.tick();
    }
    panic!("send queues did not drain");
}
