//! The sync host.
//!
//! Owns every config sync engine of the process, the version negotiator,
//! the shared outbox and the outbound gate, and turns host notifications
//! (connections, logins, messages, ticks) into protocol actions.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::admin::AdminList;
use super::event::HostEvent;
use crate::codec::Value;
use crate::core::{PeerId, Route, SessionContext, SessionRole, SyncConfig, SyncError, Target, Transport};
use crate::registry::{CustomValueHandle, SettingHandle};
use crate::sync::{ConfigSync, ReceiveOutcome, SyncEvent};
use crate::transport::{GateItem, OutboundGate, Outbox, SendResult, SendTicket};
use crate::version::{NegotiationState, VersionCheck, VersionNegotiator};

/// Drives config sync and version negotiation for one process.
#[derive(Debug)]
pub struct SyncHost<T: Transport> {
    transport: T,
    config: SyncConfig,
    ctx: SessionContext,
    engines: Vec<ConfigSync>,
    negotiator: VersionNegotiator,
    outbox: Outbox,
    gate: OutboundGate,
    admins: AdminList,
    /// Snapshot sends still in flight, per gated peer.
    pending_snapshots: HashMap<PeerId, HashSet<SendTicket>>,
    events: Vec<HostEvent>,
}

impl<T: Transport> SyncHost<T> {
    /// Create an offline host on top of `transport`.
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            outbox: Outbox::new(&config),
            admins: AdminList::new(config.admin_poll_interval),
            config,
            ctx: SessionContext::default(),
            engines: Vec::new(),
            negotiator: VersionNegotiator::new(),
            gate: OutboundGate::new(),
            pending_snapshots: HashMap::new(),
            events: Vec::new(),
        }
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Sync configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Register a config sync engine. Names must be unique.
    pub fn add_config_sync(&mut self, sync: ConfigSync) -> Result<(), SyncError> {
        if self.config_sync(sync.name()).is_some() {
            return Err(SyncError::Config(format!("config sync {} registered twice", sync.name())));
        }
        self.engines.push(sync);
        Ok(())
    }

    /// Register a version check.
    pub fn add_version_check(&mut self, check: VersionCheck) -> Result<(), SyncError> {
        Ok(self.negotiator.add_check(check)?)
    }

    /// Engine by mod name.
    pub fn config_sync(&self, name: &str) -> Option<&ConfigSync> {
        self.engines.iter().find(|sync| sync.name() == name)
    }

    fn engine_index(&self, name: &str) -> Result<usize, SyncError> {
        self.engines
            .iter()
            .position(|sync| sync.name() == name)
            .ok_or_else(|| SyncError::UnknownConfigSync(name.to_string()))
    }

    /// An engine together with the session context and outbox it needs for
    /// local writes.
    pub fn parts_mut(&mut self, name: &str) -> Option<(&mut ConfigSync, &SessionContext, &mut Outbox)> {
        let sync = self.engines.iter_mut().find(|sync| sync.name() == name)?;
        Some((sync, &self.ctx, &mut self.outbox))
    }

    /// Version negotiator.
    pub fn negotiator(&self) -> &VersionNegotiator {
        &self.negotiator
    }

    /// Mutable access to the negotiator, e.g. to install a fallback handler.
    pub fn negotiator_mut(&mut self) -> &mut VersionNegotiator {
        &mut self.negotiator
    }

    /// Session state.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Replace the admin allow-list (host names).
    pub fn set_admin_list(&mut self, host_names: impl IntoIterator<Item = String>) {
        self.admins.set(host_names);
    }

    fn is_admin(&self, peer: PeerId) -> bool {
        self.transport
            .host_name(peer)
            .is_some_and(|name| self.admins.contains(&name))
    }

    // =========================================================================
    // Local writes
    // =========================================================================

    /// Overwrite a setting and broadcast it.
    pub fn set_value(&mut self, name: &str, handle: SettingHandle, value: impl Into<Value>) -> Result<bool, SyncError> {
        let index = self.engine_index(name)?;
        self.engines[index].set_value(&self.ctx, &mut self.outbox, handle, value)
    }

    /// Record a user edit of a setting.
    pub fn assign_local_value(
        &mut self,
        name: &str,
        handle: SettingHandle,
        value: impl Into<Value>,
    ) -> Result<bool, SyncError> {
        let index = self.engine_index(name)?;
        self.engines[index].assign_local_value(&self.ctx, &mut self.outbox, handle, value)
    }

    /// Overwrite a custom value and broadcast it.
    pub fn set_custom_value(
        &mut self,
        name: &str,
        handle: CustomValueHandle,
        value: impl Into<Value>,
    ) -> Result<bool, SyncError> {
        let index = self.engine_index(name)?;
        self.engines[index].set_custom_value(&self.ctx, &mut self.outbox, handle, value)
    }

    /// Force locking for one engine.
    pub fn set_forced_lock(&mut self, name: &str, forced: Option<bool>) -> Result<(), SyncError> {
        let index = self.engine_index(name)?;
        self.engines[index].set_forced_lock(&self.ctx, forced);
        Ok(())
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Begin a session in `role`.
    pub fn start(&mut self, role: SessionRole) {
        self.ctx = SessionContext::new(role);
        self.admins.reset();
        for sync in &mut self.engines {
            sync.reset_to_local(&mut self.ctx);
        }
        if role == SessionRole::Server {
            for sync in &self.engines {
                tracing::info!(route = %sync.route(), "registered config sync; waiting for incoming connections");
            }
        }
    }

    /// End the session: every engine restores its local values and becomes
    /// authoritative again.
    pub fn shutdown(&mut self) {
        for sync in &mut self.engines {
            sync.reset_to_local(&mut self.ctx);
        }
        self.ctx = SessionContext::default();
        self.pending_snapshots.clear();
    }

    /// A connection opened: send our version handshakes.
    pub fn on_peer_connected(&mut self, peer: PeerId) {
        for check in self.negotiator.checks_mut() {
            if let Some(sync) = check
                .bound_to()
                .and_then(|name| self.engines.iter().find(|sync| sync.name() == name))
            {
                check.refresh_from(sync);
            }
        }
        let is_server = self.ctx.is_server();
        for message in self.negotiator.on_peer_connected(peer, is_server) {
            self.transport.send(peer, &Route::VersionCheck, &message);
        }
    }

    /// The peer sent its login info: take the version verdict and, on a
    /// server, start the initial snapshots.
    pub fn on_peer_info(&mut self, peer: PeerId) -> Result<(), SyncError> {
        let is_server = self.ctx.is_server();
        let host_name = self
            .transport
            .host_name(peer)
            .unwrap_or_else(|| peer.to_string());

        if let NegotiationState::Failed(failure) = self.negotiator.evaluate(peer, is_server, &host_name).clone() {
            self.transport.disconnect(peer, &failure.message);
            self.forget_peer(peer);
            self.events.push(HostEvent::VersionFailed { peer, failure });
            return Ok(());
        }

        if !is_server {
            self.events.push(HostEvent::VersionMatched { peer });
            return Ok(());
        }

        self.gate.close(peer);
        self.gate.version_matched(peer);

        let exempt = self.is_admin(peer);
        let mut tickets = HashSet::new();
        for sync in &self.engines {
            tickets.insert(sync.send_snapshot(&mut self.outbox, peer, exempt)?);
        }
        if tickets.is_empty() {
            self.release(peer);
        } else {
            self.pending_snapshots.insert(peer, tickets);
        }
        Ok(())
    }

    /// A connection closed.
    pub fn on_peer_disconnected(&mut self, peer: PeerId) {
        self.forget_peer(peer);
        if self.ctx.role == SessionRole::Client {
            self.ctx.lock_exempt = false;
            for sync in &mut self.engines {
                sync.reset_to_local(&mut self.ctx);
            }
        }
    }

    fn forget_peer(&mut self, peer: PeerId) {
        self.negotiator.on_peer_disconnected(peer);
        self.outbox.cancel_peer(peer);
        self.gate.forget(peer);
        self.pending_snapshots.remove(&peer);
        for sync in &mut self.engines {
            sync.forget_peer(peer);
        }
    }

    // =========================================================================
    // Traffic
    // =========================================================================

    /// Send host traffic to `peer`, held back while its snapshots are in flight.
    pub fn send_host_message(&mut self, peer: PeerId, message: Vec<u8>) {
        if let Some(message) = self.gate.pass(peer, message) {
            self.transport.send(peer, &Route::Host, &message);
        }
    }

    /// Handle an inbound message.
    pub fn on_message(&mut self, peer: PeerId, route: &Route, data: &[u8]) -> Result<(), SyncError> {
        self.on_message_at(peer, route, data, Instant::now())
    }

    /// Handle an inbound message at `now`.
    pub fn on_message_at(&mut self, peer: PeerId, route: &Route, data: &[u8], now: Instant) -> Result<(), SyncError> {
        match route {
            Route::VersionCheck => {
                let is_server = self.ctx.is_server();
                Ok(self.negotiator.on_handshake(peer, data, is_server)?)
            }
            Route::ConfigSync(name) => self.on_config_message(peer, name, data, now),
            Route::Host => Ok(()),
        }
    }

    fn on_config_message(&mut self, peer: PeerId, name: &str, data: &[u8], now: Instant) -> Result<(), SyncError> {
        let index = self.engine_index(name)?;
        let exempt = self.is_admin(peer);
        let sync = &mut self.engines[index];

        let outcome = match sync.on_receive_at(&mut self.ctx, peer, exempt, data, now) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(mod_name = %sync.display_name(), peer, error = %err, "dropping config message");
                return Err(err);
            }
        };
        let ReceiveOutcome::Applied(report) = outcome else {
            return Ok(());
        };

        // Relay what an admin changed to every other peer.
        if self.ctx.is_server() {
            let mut settings = Vec::new();
            let mut custom_values = Vec::new();
            for event in sync.drain_events() {
                match &event {
                    SyncEvent::SettingChanged(handle) => settings.push(*handle),
                    SyncEvent::CustomValueChanged(handle) => custom_values.push(*handle),
                    _ => {}
                }
                self.events.push(HostEvent::Sync {
                    mod_name: sync.name().to_string(),
                    event,
                });
            }
            sync.broadcast(&self.ctx, &mut self.outbox, Target::Everyone, &settings, &custom_values)?;
        }

        self.events.push(HostEvent::Applied {
            mod_name: name.to_string(),
            peer,
            report,
        });
        Ok(())
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Advance timers and send queues.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Advance timers and send queues at `now`.
    pub fn tick_at(&mut self, now: Instant) {
        for sync in &mut self.engines {
            sync.expire_at(now);
        }

        if self.ctx.is_server() && self.admins.poll_changed_at(now) {
            self.announce_admins();
        }

        for report in self.outbox.poll_at(&mut self.transport, now) {
            if report.result == SendResult::TimedOut {
                self.events.push(HostEvent::SendTimedOut { peer: report.peer });
            }
            let Some(tickets) = self.pending_snapshots.get_mut(&report.peer) else {
                continue;
            };
            if !tickets.remove(&report.ticket) {
                continue;
            }
            if report.result != SendResult::Delivered {
                self.pending_snapshots.remove(&report.peer);
                self.gate.forget(report.peer);
            } else if tickets.is_empty() {
                self.pending_snapshots.remove(&report.peer);
                self.release(report.peer);
            }
        }
    }

    fn announce_admins(&mut self) {
        let Some(first) = self.engines.first() else {
            return;
        };
        for peer in self.transport.peers() {
            let exempt = self
                .transport
                .host_name(peer)
                .is_some_and(|name| self.admins.contains(&name));
            if let Err(err) = first.send_lock_exempt(&mut self.outbox, peer, exempt) {
                tracing::warn!(peer, error = %err, "cannot announce admin status");
            }
        }
    }

    fn release(&mut self, peer: PeerId) {
        for item in self.gate.open(peer) {
            match item {
                GateItem::Message(message) => self.transport.send(peer, &Route::Host, &message),
                GateItem::VersionMatched => self.events.push(HostEvent::VersionMatched { peer }),
            }
        }
    }

    /// Whether traffic to `peer` is still held for its snapshots.
    pub fn is_gated(&self, peer: PeerId) -> bool {
        self.gate.is_closed(peer)
    }

    /// Whether every send queue is empty.
    pub fn is_idle(&self) -> bool {
        self.outbox.is_empty()
    }

    /// Take pending events, host events first, then engine events.
    pub fn drain_events(&mut self) -> Vec<HostEvent> {
        let mut events = std::mem::take(&mut self.events);
        for sync in &mut self.engines {
            let mod_name = sync.name().to_string();
            events.extend(sync.drain_events().into_iter().map(|event| HostEvent::Sync {
                mod_name: mod_name.clone(),
                event,
            }));
        }
        events
    }
}
