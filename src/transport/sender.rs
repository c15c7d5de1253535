//! Outbound send tasks.
//!
//! Each message bound for a peer becomes a resumable task: it waits while the
//! peer's send queue is over the limit, sends at most one fragment per tick,
//! and gives up (disconnecting the peer) if the queue does not drain in time.
//! Tasks for one peer run in FIFO order; peers never wait on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::compression::{CompressionError, Compressor};
use super::fragment::fragment_message;
use super::frame::encode_compressed;
use crate::core::{PeerId, Route, SyncConfig, Target, Transport};

/// Reason given to a peer dropped for backpressure.
pub const SEND_TIMEOUT_REASON: &str = "config sending timeout";

/// Identifies one queued message to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendTicket(u64);

/// A message ready for the wire: one frame, or the fragments of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    frames: Arc<[Vec<u8>]>,
    compressed: bool,
}

impl PreparedMessage {
    /// Frames in send order.
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Whether the message was fragmented.
    pub fn is_fragmented(&self) -> bool {
        self.frames.len() > 1
    }

    /// Whether the message was compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }
}

/// How a send task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Every frame was handed to the transport.
    Delivered,
    /// The peer disconnected before the task finished.
    Cancelled,
    /// The peer stayed over the queue limit for the whole timeout and was dropped.
    TimedOut,
}

/// Completion report for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Receiving peer.
    pub peer: PeerId,
    /// Route the message was sent on.
    pub route: Route,
    /// Ticket of the finished task.
    pub ticket: SendTicket,
    /// Outcome.
    pub result: SendResult,
}

/// Progress of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Yield until the next tick.
    Pending,
    /// Finished with the given result.
    Done(SendResult),
}

#[derive(Debug)]
struct PeerSendTask {
    ticket: SendTicket,
    route: Route,
    message: PreparedMessage,
    next_frame: usize,
    waiting_since: Option<Instant>,
}

impl PeerSendTask {
    fn poll<T: Transport + ?Sized>(
        &mut self,
        peer: PeerId,
        transport: &mut T,
        max_queue: usize,
        timeout: Duration,
        now: Instant,
    ) -> Step {
        if !transport.is_connected(peer) {
            return Step::Done(SendResult::Cancelled);
        }

        if transport.send_queue_depth(peer) > max_queue {
            let since = *self.waiting_since.get_or_insert(now);
            if now.duration_since(since) >= timeout {
                tracing::info!(peer, route = %self.route, "disconnecting peer after config sending timeout");
                transport.disconnect(peer, SEND_TIMEOUT_REASON);
                return Step::Done(SendResult::TimedOut);
            }
            return Step::Pending;
        }
        self.waiting_since = None;

        let frames = self.message.frames();
        transport.send(peer, &self.route, &frames[self.next_frame]);
        self.next_frame += 1;

        if self.next_frame == frames.len() {
            Step::Done(SendResult::Delivered)
        } else {
            Step::Pending
        }
    }
}

#[derive(Debug)]
struct PendingBroadcast {
    route: Route,
    message: PreparedMessage,
}

/// Outbound queue shared by every engine of a host.
#[derive(Debug)]
pub struct Outbox {
    compressor: Compressor,
    slice_size: usize,
    max_queue: usize,
    timeout: Duration,
    next_transfer_id: u64,
    next_ticket: u64,
    broadcasts: Vec<PendingBroadcast>,
    queues: HashMap<PeerId, VecDeque<PeerSendTask>>,
}

impl Outbox {
    /// Create an outbox.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            compressor: Compressor::from_config(config),
            slice_size: config.fragment_slice_size.max(1),
            max_queue: config.max_send_queue,
            timeout: config.send_queue_timeout,
            next_transfer_id: 0,
            next_ticket: 0,
            broadcasts: Vec::new(),
            queues: HashMap::new(),
        }
    }

    /// Compress and fragment a plain message as needed.
    pub fn prepare(&mut self, message: &[u8]) -> Result<PreparedMessage, CompressionError> {
        let result = self.compressor.compress(message)?;
        let compressed = result.is_compressed();
        let wire = if compressed {
            encode_compressed(result.data())
        } else {
            result.into_data()
        };

        let frames: Vec<Vec<u8>> = if wire.len() > self.slice_size {
            self.next_transfer_id += 1;
            fragment_message(&wire, self.next_transfer_id, self.slice_size)
        } else {
            vec![wire]
        };

        Ok(PreparedMessage {
            frames: frames.into(),
            compressed,
        })
    }

    /// Queue `message` for `target`.
    ///
    /// A single peer gets a ticket immediately; broadcasts are resolved against
    /// the ready peers at the next poll.
    pub fn send(&mut self, target: Target, route: Route, message: &[u8]) -> Result<Option<SendTicket>, CompressionError> {
        let prepared = self.prepare(message)?;
        Ok(self.send_prepared(target, route, prepared))
    }

    /// Queue `message` for a single peer.
    pub fn send_to(&mut self, peer: PeerId, route: Route, message: &[u8]) -> Result<SendTicket, CompressionError> {
        let prepared = self.prepare(message)?;
        Ok(self.enqueue(peer, route, prepared))
    }

    /// Queue an already prepared message.
    pub fn send_prepared(&mut self, target: Target, route: Route, message: PreparedMessage) -> Option<SendTicket> {
        match target {
            Target::Peer(peer) => Some(self.enqueue(peer, route, message)),
            Target::Everyone => {
                self.broadcasts.push(PendingBroadcast { route, message });
                None
            }
        }
    }

    fn enqueue(&mut self, peer: PeerId, route: Route, message: PreparedMessage) -> SendTicket {
        self.next_ticket += 1;
        let ticket = SendTicket(self.next_ticket);
        self.queues.entry(peer).or_default().push_back(PeerSendTask {
            ticket,
            route,
            message,
            next_frame: 0,
            waiting_since: None,
        });
        ticket
    }

    /// Whether nothing is queued for `peer`.
    pub fn is_idle(&self, peer: PeerId) -> bool {
        self.queues.get(&peer).is_none_or(VecDeque::is_empty)
    }

    /// Whether nothing is queued at all.
    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty() && self.queues.values().all(VecDeque::is_empty)
    }

    /// Drop everything queued for `peer`.
    pub fn cancel_peer(&mut self, peer: PeerId) -> Vec<SendTicket> {
        self.queues
            .remove(&peer)
            .map(|tasks| tasks.into_iter().map(|task| task.ticket).collect())
            .unwrap_or_default()
    }

    /// Advance every peer's queue by one tick.
    pub fn poll_at<T: Transport + ?Sized>(&mut self, transport: &mut T, now: Instant) -> Vec<SendReport> {
        if !self.broadcasts.is_empty() {
            let peers: Vec<PeerId> = transport
                .peers()
                .into_iter()
                .filter(|&peer| transport.is_ready(peer))
                .collect();
            for broadcast in std::mem::take(&mut self.broadcasts) {
                for &peer in &peers {
                    self.enqueue(peer, broadcast.route.clone(), broadcast.message.clone());
                }
            }
        }

        let mut reports = Vec::new();
        for (&peer, queue) in &mut self.queues {
            while let Some(task) = queue.front_mut() {
                match task.poll(peer, transport, self.max_queue, self.timeout, now) {
                    Step::Pending => break,
                    Step::Done(result) => {
                        let task = queue.pop_front();
                        if let Some(task) = task {
                            reports.push(SendReport {
                                peer,
                                route: task.route,
                                ticket: task.ticket,
                                result,
                            });
                        }
                        if result != SendResult::Delivered {
                            for task in queue.drain(..) {
                                reports.push(SendReport {
                                    peer,
                                    route: task.route,
                                    ticket: task.ticket,
                                    result: SendResult::Cancelled,
                                });
                            }
                        }
                    }
                }
            }
        }
        self.queues.retain(|_, queue| !queue.is_empty());
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SyncConfigBuilder;
    use crate::transport::frame::Envelope;
    use std::collections::HashSet;

    #[derive(Default)]
    struct MockTransport {
        connected: HashSet<PeerId>,
        depth: HashMap<PeerId, usize>,
        sent: Vec<(PeerId, Vec<u8>)>,
        disconnects: Vec<(PeerId, String)>,
    }

    impl MockTransport {
        fn with_peers(peers: &[PeerId]) -> Self {
            Self {
                connected: peers.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn sent_to(&self, peer: PeerId) -> usize {
            self.sent.iter().filter(|(p, _)| *p == peer).count()
        }
    }

    impl Transport for MockTransport {
        fn peers(&self) -> Vec<PeerId> {
            let mut peers: Vec<_> = self.connected.iter().copied().collect();
            peers.sort_unstable();
            peers
        }

        fn send(&mut self, peer: PeerId, _route: &Route, payload: &[u8]) {
            self.sent.push((peer, payload.to_vec()));
        }

        fn is_connected(&self, peer: PeerId) -> bool {
            self.connected.contains(&peer)
        }

        fn send_queue_depth(&self, peer: PeerId) -> usize {
            self.depth.get(&peer).copied().unwrap_or(0)
        }

        fn disconnect(&mut self, peer: PeerId, reason: &str) {
            self.connected.remove(&peer);
            self.disconnects.push((peer, reason.to_string()));
        }

        fn host_name(&self, _peer: PeerId) -> Option<String> {
            None
        }
    }

    fn route() -> Route {
        Route::ConfigSync("test".into())
    }

    fn small_outbox() -> Outbox {
        Outbox::new(&SyncConfigBuilder::new().fragment_slice_size(100).compress_min_size(1 << 20).build())
    }

    #[test]
    fn test_small_message_is_one_frame() {
        let mut outbox = Outbox::new(&SyncConfig::default());
        let prepared = outbox.prepare(&[0, 1, 0, 0, 0]).unwrap();
        assert!(!prepared.is_fragmented());
        assert!(!prepared.is_compressed());
        assert_eq!(prepared.frames()[0], vec![0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_large_message_is_compressed() {
        let mut outbox = Outbox::new(&SyncConfig::default());
        let message = vec![0u8; 20_000];
        let prepared = outbox.prepare(&message).unwrap();
        assert!(prepared.is_compressed());
        assert!(matches!(Envelope::parse(&prepared.frames()[0]).unwrap(), Envelope::Compressed(_)));
    }

    #[test]
    fn test_one_fragment_per_tick() {
        let mut outbox = small_outbox();
        let mut transport = MockTransport::with_peers(&[1]);
        let ticket = outbox.send(Target::Peer(1), route(), &[7u8; 250]).unwrap();
        let now = Instant::now();

        assert!(outbox.poll_at(&mut transport, now).is_empty());
        assert!(outbox.poll_at(&mut transport, now).is_empty());
        let reports = outbox.poll_at(&mut transport, now);
        assert_eq!(transport.sent_to(1), 3);
        assert_eq!(reports.len(), 1);
        assert_eq!(Some(reports[0].ticket), ticket);
        assert_eq!(reports[0].result, SendResult::Delivered);
        assert!(outbox.is_idle(1));
    }

    #[test]
    fn test_backpressure_timeout_disconnects_once() {
        let mut outbox = small_outbox();
        let mut transport = MockTransport::with_peers(&[1, 2]);
        transport.depth.insert(1, 25_000);
        outbox.send(Target::Everyone, route(), &[1u8; 10]).unwrap();
        let start = Instant::now();

        assert!(outbox.poll_at(&mut transport, start).iter().all(|r| r.peer == 2));
        assert_eq!(transport.sent_to(2), 1);

        let reports = outbox.poll_at(&mut transport, start + Duration::from_secs(29));
        assert!(reports.is_empty());

        let reports = outbox.poll_at(&mut transport, start + Duration::from_secs(30));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].result, SendResult::TimedOut);
        assert_eq!(transport.disconnects, vec![(1, SEND_TIMEOUT_REASON.to_string())]);

        outbox.poll_at(&mut transport, start + Duration::from_secs(60));
        assert_eq!(transport.disconnects.len(), 1);
        assert_eq!(transport.sent_to(1), 0);
    }

    #[test]
    fn test_queue_drains_before_timeout() {
        let mut outbox = small_outbox();
        let mut transport = MockTransport::with_peers(&[1]);
        transport.depth.insert(1, 25_000);
        outbox.send(Target::Peer(1), route(), &[1u8; 10]).unwrap();
        let start = Instant::now();

        outbox.poll_at(&mut transport, start);
        transport.depth.insert(1, 100);
        let reports = outbox.poll_at(&mut transport, start + Duration::from_secs(10));
        assert_eq!(reports[0].result, SendResult::Delivered);
        assert!(transport.disconnects.is_empty());
    }

    #[test]
    fn test_disconnect_cancels_remaining_fragments() {
        let mut outbox = small_outbox();
        let mut transport = MockTransport::with_peers(&[1]);
        outbox.send(Target::Peer(1), route(), &[7u8; 250]).unwrap();
        outbox.send(Target::Peer(1), route(), &[1u8; 5]).unwrap();
        let now = Instant::now();

        outbox.poll_at(&mut transport, now);
        transport.connected.remove(&1);
        let reports = outbox.poll_at(&mut transport, now);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.result == SendResult::Cancelled));
        assert_eq!(transport.sent_to(1), 1);
    }

    #[test]
    fn test_transfer_ids_increase() {
        let mut outbox = small_outbox();
        let first = outbox.prepare(&[0u8; 150]).unwrap();
        let second = outbox.prepare(&[0u8; 150]).unwrap();
        let id = |prepared: &PreparedMessage| match Envelope::parse(&prepared.frames()[0]).unwrap() {
            Envelope::Fragment(frame) => frame.transfer_id,
            other => panic!("expected fragment, got {other:?}"),
        };
        assert!(id(&second) > id(&first));
    }
}
