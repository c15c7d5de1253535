//! Config sync engine
//!
//! One `ConfigSync` per mod. It owns the mod's settings and decides, for every
//! inbound payload, what gets applied and in which authority role.
//!
//! The engine holds no transport. Outbound payloads go through the host's
//! shared [`Outbox`], inbound ones arrive through [`ConfigSync::on_receive_at`].

use std::time::Instant;

use super::event::{ApplyReport, ReceiveOutcome, SkipReason, SkippedEntry, SyncEvent};
use crate::codec::{CodecError, ConfigPayload, Entry, RawEntry, RawPayload, SchemaRegistry, Value, ValueType};
use crate::core::constants::{INTERNAL_SECTION, KEY_LOCK_EXEMPT, KEY_SERVER_VERSION};
use crate::core::{PeerId, Route, SessionContext, SyncConfig, SyncError, Target};
use crate::registry::{CustomValueHandle, RegistryError, Restored, SettingHandle, SettingRegistry};
use crate::transport::{InboundAssembler, Outbox, SendTicket};

/// Configuration synchronizer for one mod.
#[derive(Debug)]
pub struct ConfigSync {
    /// Mod identifier; also names the route.
    name: String,

    /// Human-readable name for log lines and error texts.
    display_name: Option<String>,

    /// Version sent to peers as `serverversion`.
    current_version: Option<String>,

    /// Version peers must at least run.
    minimum_required_version: Option<String>,

    /// Whether peers must run this mod at all.
    mod_required: bool,

    registry: SettingRegistry,
    schemas: SchemaRegistry,
    inbound: InboundAssembler,
    events: Vec<SyncEvent>,
}

impl ConfigSync {
    /// Create an engine for the mod `name`.
    pub fn new(name: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            current_version: None,
            minimum_required_version: None,
            mod_required: false,
            registry: SettingRegistry::new(),
            schemas: SchemaRegistry::new(),
            inbound: InboundAssembler::new(config),
            events: Vec::new(),
        }
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

    /// Require peers to have the mod installed.
    pub fn with_mod_required(mut self, required: bool) -> Self {
        self.mod_required = required;
        self
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Mod identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Current version, if set.
    pub fn current_version(&self) -> Option<&str> {
        self.current_version.as_deref()
    }

    /// Minimum required version, if set.
    pub fn minimum_required_version(&self) -> Option<&str> {
        self.minimum_required_version.as_deref()
    }

    /// Whether peers must run this mod.
    pub fn mod_required(&self) -> bool {
        self.mod_required
    }

    /// Route config payloads for this mod travel on.
    pub fn route(&self) -> Route {
        Route::ConfigSync(self.name.clone())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registered settings and custom values.
    pub fn registry(&self) -> &SettingRegistry {
        &self.registry
    }

    /// Struct schemas known to this engine.
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Mutable access for registering struct schemas.
    pub fn schemas_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.schemas
    }

    /// Register a synchronized setting.
    pub fn add_setting(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        ty: ValueType,
        value: impl Into<Value>,
    ) -> Result<SettingHandle, RegistryError> {
        self.registry.register(section, key, ty, value.into())
    }

    /// Register the locking setting.
    pub fn add_locking_setting(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        ty: ValueType,
        value: impl Into<Value>,
    ) -> Result<SettingHandle, RegistryError> {
        self.registry.register_locking(section, key, ty, value.into())
    }

    /// Register a custom synced value.
    pub fn add_custom_value(
        &mut self,
        identifier: impl Into<String>,
        ty: ValueType,
        value: impl Into<Value>,
    ) -> Result<CustomValueHandle, RegistryError> {
        self.registry.register_custom(identifier, ty, value.into())
    }

    /// Include or exclude a setting from synchronization.
    pub fn mark_synchronized(&mut self, ctx: &SessionContext, handle: SettingHandle, synchronized: bool) {
        self.registry.mark_synchronized(handle, synchronized);
        self.refresh_writability(ctx);
    }

    /// Live value of a setting.
    pub fn value(&self, handle: SettingHandle) -> &Value {
        self.registry.setting(handle).value()
    }

    /// Live value of a custom value.
    pub fn custom_value(&self, handle: CustomValueHandle) -> &Value {
        self.registry.custom_value(handle).value()
    }

    // =========================================================================
    // Authority and locking
    // =========================================================================

    /// Whether this process is the source of truth for this mod.
    pub fn is_source_of_truth(&self) -> bool {
        self.registry.is_source_of_truth()
    }

    /// Whether synchronized settings are locked for this process.
    pub fn is_locked(&self, ctx: &SessionContext) -> bool {
        self.registry.is_locked(ctx)
    }

    /// Whether a setting may be edited locally right now.
    pub fn is_writable(&self, ctx: &SessionContext, handle: SettingHandle) -> bool {
        self.registry.is_writable(handle, ctx)
    }

    /// Override the locking setting; `None` defers to it again.
    pub fn set_forced_lock(&mut self, ctx: &SessionContext, forced: Option<bool>) {
        self.registry.set_forced_lock(forced);
        self.refresh_writability(ctx);
    }

    fn set_authority(&mut self, source_of_truth: bool) {
        if self.registry.set_source_of_truth(source_of_truth) {
            self.events.push(SyncEvent::AuthorityChanged { source_of_truth });
        }
    }

    /// Recompute read-only flags and emit a notification per change.
    pub fn refresh_writability(&mut self, ctx: &SessionContext) {
        for (handle, read_only) in self.registry.refresh_writability(ctx) {
            self.events.push(SyncEvent::WritabilityChanged { handle, read_only });
        }
    }

    /// Take the pending notifications.
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    // =========================================================================
    // Local writes
    // =========================================================================

    /// Overwrite a setting's live value and broadcast the change.
    pub fn set_value(
        &mut self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        handle: SettingHandle,
        value: impl Into<Value>,
    ) -> Result<bool, SyncError> {
        let changed = self.registry.set_value(handle, value.into())?;
        if changed {
            self.setting_changed(ctx, outbox, handle)?;
        }
        Ok(changed)
    }

    /// Record a user edit. While shadowed by the authority only the local
    /// override changes.
    pub fn assign_local_value(
        &mut self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        handle: SettingHandle,
        value: impl Into<Value>,
    ) -> Result<bool, SyncError> {
        let changed = self.registry.assign_local_value(handle, value.into())?;
        if changed {
            self.setting_changed(ctx, outbox, handle)?;
        }
        Ok(changed)
    }

    /// Overwrite a custom value and broadcast the change.
    pub fn set_custom_value(
        &mut self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        handle: CustomValueHandle,
        value: impl Into<Value>,
    ) -> Result<bool, SyncError> {
        let changed = self.registry.set_custom_value(handle, value.into())?;
        if changed {
            self.custom_value_changed(ctx, outbox, handle)?;
        }
        Ok(changed)
    }

    /// Record a local edit of a custom value; kept aside while not authoritative.
    pub fn assign_custom_local_value(
        &mut self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        handle: CustomValueHandle,
        value: impl Into<Value>,
    ) -> Result<bool, SyncError> {
        let changed = self.registry.assign_custom_local_value(handle, value.into())?;
        if changed {
            self.custom_value_changed(ctx, outbox, handle)?;
        }
        Ok(changed)
    }

    fn setting_changed(
        &mut self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        handle: SettingHandle,
    ) -> Result<(), SyncError> {
        self.events.push(SyncEvent::SettingChanged(handle));
        if self.registry.locking_setting() == Some(handle) {
            self.refresh_writability(ctx);
        }
        if !ctx.processing_update && self.registry.setting(handle).is_synchronized() {
            self.broadcast(ctx, outbox, Target::Everyone, &[handle], &[])?;
        }
        Ok(())
    }

    fn custom_value_changed(
        &mut self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        handle: CustomValueHandle,
    ) -> Result<(), SyncError> {
        self.events.push(SyncEvent::CustomValueChanged(handle));
        if !ctx.processing_update {
            self.broadcast(ctx, outbox, Target::Everyone, &[], &[handle])?;
        }
        Ok(())
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    fn setting_entry(&self, handle: SettingHandle) -> Entry {
        let setting = self.registry.setting(handle);
        Entry::new(
            setting.id().section.clone(),
            setting.id().key.clone(),
            setting.ty().clone(),
            setting.value().clone(),
        )
    }

    fn custom_entry(&self, handle: CustomValueHandle) -> Entry {
        let custom = self.registry.custom_value(handle);
        Entry::new(
            INTERNAL_SECTION,
            custom.identifier(),
            custom.ty().clone(),
            custom.value().clone(),
        )
    }

    /// Send a partial payload with the given entries.
    ///
    /// Does nothing on a locked-out client. Unsynchronized settings are left out.
    pub fn broadcast(
        &self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        target: Target,
        settings: &[SettingHandle],
        custom_values: &[CustomValueHandle],
    ) -> Result<Option<SendTicket>, SyncError> {
        if self.is_locked(ctx) && !ctx.is_server() {
            return Ok(None);
        }

        let mut payload = ConfigPayload::partial();
        for &handle in custom_values {
            payload.push(self.custom_entry(handle));
        }
        for &handle in settings {
            if self.registry.setting(handle).is_synchronized() {
                payload.push(self.setting_entry(handle));
            }
        }
        if payload.entries.is_empty() {
            return Ok(None);
        }

        let message = payload.encode()?;
        Ok(outbox.send(target, self.route(), &message)?)
    }

    /// Full snapshot for a connecting peer.
    ///
    /// Order: `serverversion` (when set), `lockexempt`, custom values, then
    /// every synchronized setting.
    pub fn snapshot(&self, lock_exempt: bool) -> ConfigPayload {
        let mut payload = ConfigPayload::full();
        if let Some(version) = &self.current_version {
            payload.push(Entry::new(
                INTERNAL_SECTION,
                KEY_SERVER_VERSION,
                ValueType::String,
                Value::from(version.as_str()),
            ));
        }
        payload.push(Entry::new(
            INTERNAL_SECTION,
            KEY_LOCK_EXEMPT,
            ValueType::Bool,
            Value::Bool(lock_exempt),
        ));
        for (handle, _) in self.registry.custom_values() {
            payload.push(self.custom_entry(handle));
        }
        for (handle, setting) in self.registry.settings() {
            if setting.is_synchronized() {
                payload.push(self.setting_entry(handle));
            }
        }
        payload
    }

    /// Queue the full snapshot for `peer`.
    pub fn send_snapshot(&self, outbox: &mut Outbox, peer: PeerId, lock_exempt: bool) -> Result<SendTicket, SyncError> {
        let message = self.snapshot(lock_exempt).encode()?;
        Ok(outbox.send_to(peer, self.route(), &message)?)
    }

    /// Queue a partial payload that only updates the peer's admin exemption.
    pub fn send_lock_exempt(&self, outbox: &mut Outbox, peer: PeerId, lock_exempt: bool) -> Result<SendTicket, SyncError> {
        let mut payload = ConfigPayload::partial();
        payload.push(Entry::new(
            INTERNAL_SECTION,
            KEY_LOCK_EXEMPT,
            ValueType::Bool,
            Value::Bool(lock_exempt),
        ));
        let message = payload.encode()?;
        Ok(outbox.send_to(peer, self.route(), &message)?)
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Handle one raw message from `sender`.
    ///
    /// `sender_exempt` tells whether the sender is on the admin allow-list; a
    /// locked server ignores everyone else. Transport-level failures (bad
    /// envelope, failed decompression, rejected fragment) are returned as
    /// errors; entry-level problems are reported in the [`ApplyReport`].
    pub fn on_receive_at(
        &mut self,
        ctx: &mut SessionContext,
        sender: PeerId,
        sender_exempt: bool,
        data: &[u8],
        now: Instant,
    ) -> Result<ReceiveOutcome, SyncError> {
        if ctx.is_server() && self.is_locked(ctx) && !sender_exempt {
            tracing::debug!(mod_name = %self.display_name(), peer = sender, "ignoring config change from non-admin peer while locked");
            return Ok(ReceiveOutcome::Rejected);
        }

        self.inbound.expire_at(now);
        let Some(inbound) = self.inbound.receive_at(sender, data, now)? else {
            return Ok(ReceiveOutcome::Incomplete);
        };

        ctx.processing_update = true;
        let report = self.apply_message(ctx, inbound.partial, &inbound.message);
        ctx.processing_update = false;
        Ok(ReceiveOutcome::Applied(report))
    }

    fn apply_message(&mut self, ctx: &mut SessionContext, partial: bool, message: &[u8]) -> ApplyReport {
        if !partial {
            self.restore_overrides();
        }
        if !ctx.is_server() {
            self.set_authority(false);
        }

        let mut report = ApplyReport {
            partial,
            ..ApplyReport::default()
        };
        match RawPayload::decode(message, &self.schemas) {
            Ok(payload) => {
                for entry in payload.entries {
                    self.apply_entry(ctx, entry, &mut report);
                }
            }
            Err(err) => {
                tracing::warn!(mod_name = %self.display_name(), error = %err, "abort reading of received configs");
                report.aborted = Some(err);
            }
        }

        if !ctx.is_server() {
            tracing::info!(
                mod_name = %self.display_name(),
                configs = report.settings,
                custom_values = report.custom_values,
                "received configs from the server"
            );
            self.refresh_writability(ctx);
        }
        report
    }

    fn apply_entry(&mut self, ctx: &mut SessionContext, entry: RawEntry, report: &mut ApplyReport) {
        if entry.section == INTERNAL_SECTION {
            match entry.key.as_str() {
                KEY_SERVER_VERSION => {
                    self.check_server_version(entry);
                    return;
                }
                KEY_LOCK_EXEMPT => {
                    if let Ok(Value::Bool(exempt)) = entry.into_typed(&ValueType::Bool) {
                        ctx.lock_exempt = exempt;
                    }
                    return;
                }
                _ => {}
            }

            let Some(handle) = self.registry.find_custom(&entry.key) else {
                self.skip_unknown(entry, report);
                return;
            };
            let ty = self.registry.custom_value(handle).ty().clone();
            let (section, key) = (entry.section.clone(), entry.key.clone());
            match entry.into_typed(&ty) {
                Ok(value) => {
                    if self.registry.apply_inbound_custom(handle, value) {
                        self.events.push(SyncEvent::CustomValueChanged(handle));
                    }
                    report.custom_values += 1;
                }
                Err(err) => self.skip_mismatch(section, key, err, report),
            }
            return;
        }

        let handle = self
            .registry
            .find(&entry.section, &entry.key)
            .filter(|&handle| self.registry.setting(handle).is_synchronized());
        let Some(handle) = handle else {
            self.skip_unknown(entry, report);
            return;
        };
        let ty = self.registry.setting(handle).ty().clone();
        let (section, key) = (entry.section.clone(), entry.key.clone());
        match entry.into_typed(&ty) {
            Ok(value) => {
                if self.registry.apply_inbound(handle, value) {
                    self.events.push(SyncEvent::SettingChanged(handle));
                }
                report.settings += 1;
            }
            Err(err) => self.skip_mismatch(section, key, err, report),
        }
    }

    fn check_server_version(&self, entry: RawEntry) {
        let received = entry.into_typed(&ValueType::String).ok();
        let received = received.as_ref().and_then(Value::as_str);
        if received != self.current_version.as_deref() {
            tracing::warn!(
                mod_name = %self.display_name(),
                server_version = received.unwrap_or("none"),
                local_version = self.current_version.as_deref().unwrap_or("none"),
                "received server version is not equal"
            );
        }
    }

    fn skip_unknown(&self, entry: RawEntry, report: &mut ApplyReport) {
        tracing::warn!(
            mod_name = %self.display_name(),
            section = %entry.section,
            key = %entry.key,
            "received unknown config entry; client and server versions of the mod may not match"
        );
        report.skipped.push(SkippedEntry {
            section: entry.section,
            key: entry.key,
            reason: SkipReason::UnknownEntry,
        });
    }

    fn skip_mismatch(&self, section: String, key: String, err: CodecError, report: &mut ApplyReport) {
        match &err {
            CodecError::SchemaMismatch {
                schema,
                field,
                expected,
                received,
            } => tracing::warn!(
                mod_name = %self.display_name(),
                %section,
                %key,
                schema = %schema,
                field = field.as_deref().unwrap_or("count"),
                %expected,
                %received,
                "got unexpected struct field type"
            ),
            _ => tracing::warn!(
                mod_name = %self.display_name(),
                %section,
                %key,
                error = %err,
                "got unexpected type"
            ),
        }
        report.skipped.push(SkippedEntry {
            section,
            key,
            reason: SkipReason::Codec(err),
        });
    }

    fn restore_overrides(&mut self) -> Restored {
        let restored = self.registry.restore_local_overrides();
        for &handle in &restored.settings {
            self.events.push(SyncEvent::SettingChanged(handle));
        }
        for &handle in &restored.custom_values {
            self.events.push(SyncEvent::CustomValueChanged(handle));
        }
        restored
    }

    /// Drop the remote authority: restore local overrides without echoing
    /// them, become authoritative, and re-evaluate writability.
    pub fn reset_to_local(&mut self, ctx: &mut SessionContext) -> Restored {
        let was_processing = ctx.processing_update;
        ctx.processing_update = true;
        let restored = self.restore_overrides();
        self.set_authority(true);
        self.refresh_writability(ctx);
        ctx.processing_update = was_processing;
        restored
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    /// Drop expired fragmented transfers.
    pub fn expire_at(&mut self, now: Instant) -> usize {
        self.inbound.expire_at(now)
    }

    /// Drop reassembly state for a disconnected peer.
    pub fn forget_peer(&mut self, peer: PeerId) {
        self.inbound.forget_peer(peer);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Value to persist instead of the live value, when the setting is locked.
    pub fn on_before_persist_write(&self, ctx: &SessionContext, handle: SettingHandle) -> Option<Value> {
        self.registry.on_before_persist_write(handle, ctx)
    }

    /// Apply a value read from the settings file.
    ///
    /// A shadowed setting only updates its local override; otherwise this is
    /// an ordinary local write.
    pub fn load_persisted(
        &mut self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        handle: SettingHandle,
        value: Value,
    ) -> Result<bool, SyncError> {
        if self.registry.on_persist_read(handle, value.clone())? {
            return Ok(false);
        }
        self.set_value(ctx, outbox, handle, value)
    }
}
