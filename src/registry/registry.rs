//! The setting registry.

use std::collections::HashMap;

use super::error::RegistryError;
use super::setting::{CustomValue, CustomValueHandle, Setting, SettingHandle, SettingId};
use crate::codec::{Value, ValueType};
use crate::core::SessionContext;
use crate::core::constants::KEY_SERVER_VERSION;

/// Handles whose live value changed while restoring local overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restored {
    /// Settings written back.
    pub settings: Vec<SettingHandle>,
    /// Custom values written back.
    pub custom_values: Vec<CustomValueHandle>,
}

impl Restored {
    /// Whether nothing was restored.
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.custom_values.is_empty()
    }
}

/// Settings and custom values tracked by one sync engine.
///
/// Also carries the engine's authority role: while this process is not the
/// source of truth, inbound values shadow local ones and the shadowed local
/// value is kept as the setting's local override.
#[derive(Debug, Clone)]
pub struct SettingRegistry {
    settings: Vec<Setting>,
    index: HashMap<SettingId, SettingHandle>,
    custom: Vec<CustomValue>,
    custom_index: HashMap<String, CustomValueHandle>,
    locking: Option<SettingHandle>,
    forced_lock: Option<bool>,
    source_of_truth: bool,
}

impl Default for SettingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn coerce_checked(name: impl FnOnce() -> String, ty: &ValueType, value: Value) -> Result<Value, RegistryError> {
    let value = value.coerce(ty);
    if value.conforms_to(ty) {
        Ok(value)
    } else {
        Err(RegistryError::WrongType {
            name: name(),
            expected: ty.descriptor(),
        })
    }
}

impl SettingRegistry {
    /// Create an empty registry that is its own source of truth.
    pub fn new() -> Self {
        Self {
            settings: Vec::new(),
            index: HashMap::new(),
            custom: Vec::new(),
            custom_index: HashMap::new(),
            locking: None,
            forced_lock: None,
            source_of_truth: true,
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a synchronized setting with its current value.
    pub fn register(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        ty: ValueType,
        value: Value,
    ) -> Result<SettingHandle, RegistryError> {
        let id = SettingId::new(section, key);
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateSetting {
                section: id.section,
                key: id.key,
            });
        }
        let value = coerce_checked(|| id.to_string(), &ty, value)?;

        let handle = SettingHandle(self.settings.len());
        self.index.insert(id.clone(), handle);
        self.settings.push(Setting::new(id, ty, value));
        Ok(handle)
    }

    /// Register the setting whose truthy value locks synchronized settings.
    pub fn register_locking(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        ty: ValueType,
        value: Value,
    ) -> Result<SettingHandle, RegistryError> {
        if self.locking.is_some() {
            return Err(RegistryError::LockingAlreadySet);
        }
        if !ty.is_truthy_type() {
            return Err(RegistryError::InvalidLockingType(ty.descriptor()));
        }
        let handle = self.register(section, key, ty, value)?;
        self.locking = Some(handle);
        Ok(handle)
    }

    /// Register an internal value. `serverversion` is reserved.
    pub fn register_custom(
        &mut self,
        identifier: impl Into<String>,
        ty: ValueType,
        value: Value,
    ) -> Result<CustomValueHandle, RegistryError> {
        let identifier = identifier.into();
        if identifier == KEY_SERVER_VERSION || self.custom_index.contains_key(&identifier) {
            return Err(RegistryError::DuplicateCustomValue(identifier));
        }
        let value = coerce_checked(|| identifier.clone(), &ty, value)?;

        let handle = CustomValueHandle(self.custom.len());
        self.custom_index.insert(identifier.clone(), handle);
        self.custom.push(CustomValue {
            identifier,
            ty,
            value,
            local_base: None,
        });
        Ok(handle)
    }

    /// Include or exclude a setting from future payloads.
    pub fn mark_synchronized(&mut self, handle: SettingHandle, synchronized: bool) {
        self.settings[handle.0].synchronized = synchronized;
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Setting by handle.
    pub fn setting(&self, handle: SettingHandle) -> &Setting {
        &self.settings[handle.0]
    }

    /// Custom value by handle.
    pub fn custom_value(&self, handle: CustomValueHandle) -> &CustomValue {
        &self.custom[handle.0]
    }

    /// Find a setting by identity.
    pub fn find(&self, section: &str, key: &str) -> Option<SettingHandle> {
        self.index.get(&SettingId::new(section, key)).copied()
    }

    /// Find a custom value by identifier.
    pub fn find_custom(&self, identifier: &str) -> Option<CustomValueHandle> {
        self.custom_index.get(identifier).copied()
    }

    /// All settings in registration order.
    pub fn settings(&self) -> impl Iterator<Item = (SettingHandle, &Setting)> {
        self.settings.iter().enumerate().map(|(i, s)| (SettingHandle(i), s))
    }

    /// All custom values in registration order.
    pub fn custom_values(&self) -> impl Iterator<Item = (CustomValueHandle, &CustomValue)> {
        self.custom.iter().enumerate().map(|(i, c)| (CustomValueHandle(i), c))
    }

    /// The locking setting, if registered.
    pub fn locking_setting(&self) -> Option<SettingHandle> {
        self.locking
    }

    // =========================================================================
    // Authority
    // =========================================================================

    /// Whether this process is the source of truth for these settings.
    pub fn is_source_of_truth(&self) -> bool {
        self.source_of_truth
    }

    /// Change the authority role. Returns whether it changed.
    pub fn set_source_of_truth(&mut self, source_of_truth: bool) -> bool {
        let changed = self.source_of_truth != source_of_truth;
        self.source_of_truth = source_of_truth;
        changed
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Overwrite a setting's live value. Returns whether it changed.
    pub fn set_value(&mut self, handle: SettingHandle, value: Value) -> Result<bool, RegistryError> {
        let setting = &mut self.settings[handle.0];
        let value = coerce_checked(|| setting.id.to_string(), &setting.ty, value)?;
        if setting.value == value {
            return Ok(false);
        }
        setting.value = value;
        Ok(true)
    }

    /// Overwrite a custom value's live value. Returns whether it changed.
    pub fn set_custom_value(&mut self, handle: CustomValueHandle, value: Value) -> Result<bool, RegistryError> {
        let custom = &mut self.custom[handle.0];
        let value = coerce_checked(|| custom.identifier.clone(), &custom.ty, value)?;
        if custom.value == value {
            return Ok(false);
        }
        custom.value = value;
        Ok(true)
    }

    /// Record a local edit.
    ///
    /// Without a local override the live value is written. While shadowed by
    /// the authority only the override changes, so the edit takes effect when
    /// the session ends. Returns whether the live value changed.
    pub fn assign_local_value(&mut self, handle: SettingHandle, value: Value) -> Result<bool, RegistryError> {
        let setting = &mut self.settings[handle.0];
        let value = coerce_checked(|| setting.id.to_string(), &setting.ty, value)?;
        match &mut setting.local_base {
            Some(base) => {
                *base = value;
                Ok(false)
            }
            None if setting.value == value => Ok(false),
            None => {
                setting.value = value;
                Ok(true)
            }
        }
    }

    /// Record a local edit of a custom value.
    ///
    /// The live value is written only while this process owns it.
    pub fn assign_custom_local_value(
        &mut self,
        handle: CustomValueHandle,
        value: Value,
    ) -> Result<bool, RegistryError> {
        if self.source_of_truth {
            return self.set_custom_value(handle, value);
        }
        let custom = &mut self.custom[handle.0];
        custom.local_base = Some(coerce_checked(|| custom.identifier.clone(), &custom.ty, value)?);
        Ok(false)
    }

    /// Apply a value received from the authority.
    ///
    /// When this process is not the source of truth, the current value is
    /// saved as the local override first (once). Unsynchronized settings are
    /// left alone. Returns whether the live value changed.
    pub fn apply_inbound(&mut self, handle: SettingHandle, value: Value) -> bool {
        let source_of_truth = self.source_of_truth;
        let setting = &mut self.settings[handle.0];
        if !setting.synchronized {
            return false;
        }
        if !source_of_truth && setting.local_base.is_none() {
            setting.local_base = Some(setting.value.clone());
        }
        let changed = setting.value != value;
        setting.value = value;
        changed
    }

    /// Apply a custom value received from the authority.
    pub fn apply_inbound_custom(&mut self, handle: CustomValueHandle, value: Value) -> bool {
        let source_of_truth = self.source_of_truth;
        let custom = &mut self.custom[handle.0];
        if !source_of_truth && custom.local_base.is_none() {
            custom.local_base = Some(custom.value.clone());
        }
        let changed = custom.value != value;
        custom.value = value;
        changed
    }

    /// Write every saved local override back and clear it.
    pub fn restore_local_overrides(&mut self) -> Restored {
        let mut restored = Restored::default();
        for (i, setting) in self.settings.iter_mut().enumerate() {
            if let Some(base) = setting.local_base.take() {
                if setting.value != base {
                    setting.value = base;
                    restored.settings.push(SettingHandle(i));
                }
            }
        }
        for (i, custom) in self.custom.iter_mut().enumerate() {
            if let Some(base) = custom.local_base.take() {
                if custom.value != base {
                    custom.value = base;
                    restored.custom_values.push(CustomValueHandle(i));
                }
            }
        }
        restored
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Force locking on or off regardless of the locking setting; `None` defers
    /// to the setting again.
    pub fn set_forced_lock(&mut self, forced: Option<bool>) {
        self.forced_lock = forced;
    }

    /// Forced locking state.
    pub fn forced_lock(&self) -> Option<bool> {
        self.forced_lock
    }

    /// Whether local edits of synchronized settings are locked out.
    pub fn is_locked(&self, ctx: &SessionContext) -> bool {
        let locked = self.forced_lock.unwrap_or_else(|| {
            self.locking
                .is_some_and(|handle| self.settings[handle.0].value.is_truthy())
        });
        locked && !ctx.lock_exempt
    }

    /// Whether the setting may be written locally right now.
    pub fn is_writable(&self, handle: SettingHandle, ctx: &SessionContext) -> bool {
        let setting = &self.settings[handle.0];
        self.source_of_truth
            || !setting.synchronized
            || setting.local_base.is_none()
            || (!self.is_locked(ctx) && (self.locking != Some(handle) || ctx.lock_exempt))
    }

    /// Recompute every read-only flag. Returns the settings whose flag changed.
    pub fn refresh_writability(&mut self, ctx: &SessionContext) -> Vec<(SettingHandle, bool)> {
        let read_only: Vec<bool> = (0..self.settings.len())
            .map(|i| !self.is_writable(SettingHandle(i), ctx))
            .collect();

        let mut changed = Vec::new();
        for (i, (setting, read_only)) in self.settings.iter_mut().zip(read_only).enumerate() {
            if setting.read_only != read_only {
                setting.read_only = read_only;
                changed.push((SettingHandle(i), read_only));
            }
        }
        changed
    }

    // =========================================================================
    // Persistence hooks
    // =========================================================================

    /// Value to persist instead of the live one, when the setting is not writable.
    pub fn on_before_persist_write(&self, handle: SettingHandle, ctx: &SessionContext) -> Option<Value> {
        if self.is_writable(handle, ctx) {
            return None;
        }
        self.settings[handle.0].local_base.clone()
    }

    /// Route a value re-read from the settings file.
    ///
    /// While the setting is shadowed by the authority the override absorbs the
    /// value and `true` is returned; otherwise the caller applies it normally.
    pub fn on_persist_read(&mut self, handle: SettingHandle, value: Value) -> Result<bool, RegistryError> {
        let setting = &mut self.settings[handle.0];
        if setting.local_base.is_none() {
            return Ok(false);
        }
        setting.local_base = Some(coerce_checked(|| setting.id.to_string(), &setting.ty, value)?);
        Ok(true)
    }
}
