//! Host task and its command channel.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::{PeerId, Route, SessionRole, Transport};
use crate::host::{HostEvent, SyncHost};

/// Errors from a [`HostHandle`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The host task has stopped.
    #[error("host task shut down")]
    Shutdown,
}

/// Notification fed into the host task.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// Begin a session.
    Start(SessionRole),

    /// A connection opened.
    PeerConnected(PeerId),

    /// The peer sent its login info.
    PeerInfo(PeerId),

    /// A connection closed.
    PeerDisconnected(PeerId),

    /// An inbound message.
    Message {
        /// Sender.
        peer: PeerId,
        /// Route it arrived on.
        route: Route,
        /// Raw bytes.
        data: Vec<u8>,
    },

    /// Outbound host traffic, held while the peer's snapshots are in flight.
    HostMessage {
        /// Receiver.
        peer: PeerId,
        /// Raw bytes.
        data: Vec<u8>,
    },

    /// Replace the admin allow-list.
    SetAdminList(Vec<String>),

    /// End the session and restore local values.
    Shutdown,
}

/// Sending side of a running host task.
#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: mpsc::Sender<HostCommand>,
}

impl HostHandle {
    /// Feed a command to the host task.
    pub async fn send(&self, command: HostCommand) -> Result<(), RuntimeError> {
        self.tx.send(command).await.map_err(|_| RuntimeError::Shutdown)
    }

    /// Deliver an inbound message.
    pub async fn message(&self, peer: PeerId, route: Route, data: Vec<u8>) -> Result<(), RuntimeError> {
        self.send(HostCommand::Message { peer, route, data }).await
    }

    /// Whether the host task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn `host` on the tokio runtime, ticking every `tick`.
///
/// The task ends when every [`HostHandle`] is dropped and returns the host.
pub fn spawn_host<T>(
    host: SyncHost<T>,
    tick: Duration,
) -> (HostHandle, mpsc::Receiver<HostEvent>, JoinHandle<SyncHost<T>>)
where
    T: Transport + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(256);
    let task = tokio::spawn(run_host(host, command_rx, event_tx, tick));
    (HostHandle { tx: command_tx }, event_rx, task)
}

/// Drive `host` until `commands` closes.
///
/// Errors from individual messages are logged and do not stop the loop.
/// Events are dropped once the receiver is gone.
pub async fn run_host<T: Transport>(
    mut host: SyncHost<T>,
    mut commands: mpsc::Receiver<HostCommand>,
    events: mpsc::Sender<HostEvent>,
    tick: Duration,
) -> SyncHost<T> {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                apply_command(&mut host, command);
            }
            _ = ticker.tick() => host.tick(),
        }

        for event in host.drain_events() {
            if events.send(event).await.is_err() {
                break;
            }
        }
    }

    tracing::debug!("host command channel closed");
    host
}

fn apply_command<T: Transport>(host: &mut SyncHost<T>, command: HostCommand) {
    match command {
        HostCommand::Start(role) => host.start(role),
        HostCommand::PeerConnected(peer) => host.on_peer_connected(peer),
        HostCommand::PeerInfo(peer) => {
            if let Err(err) = host.on_peer_info(peer) {
                tracing::warn!(peer, error = %err, "cannot send initial config snapshot");
            }
        }
        HostCommand::PeerDisconnected(peer) => host.on_peer_disconnected(peer),
        HostCommand::Message { peer, route, data } => {
            if let Err(err) = host.on_message(peer, &route, &data) {
                tracing::warn!(peer, route = %route, error = %err, "dropping inbound message");
            }
        }
        HostCommand::HostMessage { peer, data } => host.send_host_message(peer, data),
        HostCommand::SetAdminList(names) => host.set_admin_list(names),
        HostCommand::Shutdown => host.shutdown(),
    }
}
