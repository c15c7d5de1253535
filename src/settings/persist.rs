//! Moving values between a config sync and its settings store.

use super::error::SettingsError;
use super::store::SettingsStore;
use crate::core::SessionContext;
use crate::registry::SettingHandle;
use crate::sync::ConfigSync;
use crate::transport::Outbox;

/// Apply stored values to every registered setting.
///
/// Settings shadowed by the authority only update their local override.
/// Unparseable text is logged and skipped. Returns how many live values changed.
pub fn load_settings(
    sync: &mut ConfigSync,
    ctx: &SessionContext,
    outbox: &mut Outbox,
    store: &dyn SettingsStore,
) -> Result<usize, SettingsError> {
    let stored = store.load()?;
    let targets: Vec<_> = sync
        .registry()
        .settings()
        .filter_map(|(handle, setting)| {
            stored
                .get(setting.id())
                .map(|text| (handle, setting.ty().clone(), text))
        })
        .collect();

    let mut changed = 0;
    for (handle, ty, text) in targets {
        match ty.parse_setting_string(text) {
            Ok(value) => {
                if sync.load_persisted(ctx, outbox, handle, value)? {
                    changed += 1;
                }
            }
            Err(err) => {
                let id = sync.registry().setting(handle).id();
                tracing::warn!(
                    mod_name = %sync.display_name(),
                    section = %id.section,
                    key = %id.key,
                    error = %err,
                    "ignoring unreadable stored setting"
                );
            }
        }
    }
    Ok(changed)
}

/// Write one setting to the store.
///
/// A setting that is currently not writable persists its local override
/// instead of the live value.
pub fn persist_setting(
    sync: &ConfigSync,
    ctx: &SessionContext,
    store: &mut dyn SettingsStore,
    handle: SettingHandle,
) -> Result<(), SettingsError> {
    let setting = sync.registry().setting(handle);
    let value = sync
        .on_before_persist_write(ctx, handle)
        .unwrap_or_else(|| setting.value().clone());
    let text = value.to_setting_string(setting.ty())?;
    store.write(&setting.id().section, &setting.id().key, &text)
}

/// Write every setting to the store.
pub fn persist_all(sync: &ConfigSync, ctx: &SessionContext, store: &mut dyn SettingsStore) -> Result<(), SettingsError> {
    let handles: Vec<_> = sync.registry().settings().map(|(handle, _)| handle).collect();
    for handle in handles {
        persist_setting(sync, ctx, store, handle)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Value, ValueType};
    use crate::core::{SessionRole, SyncConfig};
    use crate::settings::MemorySettingsStore;
    use std::time::Instant;

    #[test]
    fn test_load_and_persist() {
        let mut sync = ConfigSync::new("mod", &SyncConfig::default());
        let speed = sync.add_setting("Monsters", "Speed", ValueType::Float, 1.0).unwrap();
        let name = sync.add_setting("Monsters", "Name", ValueType::String, "troll").unwrap();
        let ctx = SessionContext::new(SessionRole::Offline);
        let mut outbox = Outbox::new(&SyncConfig::default());

        let mut store = MemorySettingsStore::new();
        store.write("Monsters", "Speed", "2.5").unwrap();
        store.write("Monsters", "Name", "draugr").unwrap();
        store.write("Other", "Unused", "x").unwrap();

        assert_eq!(load_settings(&mut sync, &ctx, &mut outbox, &store).unwrap(), 2);
        assert_eq!(sync.value(speed), &Value::Float(2.5));
        assert_eq!(sync.value(name), &Value::from("draugr"));

        let mut written = MemorySettingsStore::new();
        persist_all(&sync, &ctx, &mut written).unwrap();
        assert_eq!(written.get("Monsters", "Speed"), Some("2.5"));
    }

    #[test]
    fn test_unreadable_value_is_skipped() {
        let mut sync = ConfigSync::new("mod", &SyncConfig::default());
        let speed = sync.add_setting("Monsters", "Speed", ValueType::Float, 1.0).unwrap();
        let ctx = SessionContext::new(SessionRole::Offline);
        let mut outbox = Outbox::new(&SyncConfig::default());

        let mut store = MemorySettingsStore::new();
        store.write("Monsters", "Speed", "fast").unwrap();
        assert_eq!(load_settings(&mut sync, &ctx, &mut outbox, &store).unwrap(), 0);
        assert_eq!(sync.value(speed), &Value::Float(1.0));
    }

    #[test]
    fn test_locked_setting_persists_override() {
        let mut sync = ConfigSync::new("mod", &SyncConfig::default());
        sync.add_locking_setting("General", "Lock", ValueType::Bool, true).unwrap();
        let speed = sync.add_setting("Monsters", "Speed", ValueType::Float, 1.0).unwrap();
        let mut ctx = SessionContext::new(SessionRole::Client);

        let mut payload = crate::codec::ConfigPayload::full();
        payload.push(crate::codec::Entry::new("Monsters", "Speed", ValueType::Float, Value::Float(9.0)));
        let data = payload.encode().unwrap();
        sync.on_receive_at(&mut ctx, 1, false, &data, Instant::now()).unwrap();
        assert_eq!(sync.value(speed), &Value::Float(9.0));

        let mut store = MemorySettingsStore::new();
        persist_setting(&sync, &ctx, &mut store, speed).unwrap();
        assert_eq!(store.get("Monsters", "Speed"), Some("1"));
    }
}
