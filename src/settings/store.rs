//! Settings stores.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::SettingsError;
use crate::registry::SettingId;

/// Persisted `(section, key) -> text` pairs.
pub trait SettingsStore {
    /// Read every stored pair.
    fn load(&self) -> Result<HashMap<SettingId, String>, SettingsError>;

    /// Store one pair.
    fn write(&mut self, section: &str, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// In-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySettingsStore {
    values: HashMap<SettingId, String>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored text for a setting.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.values.get(&SettingId::new(section, key)).map(String::as_str)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<HashMap<SettingId, String>, SettingsError> {
        Ok(self.values.clone())
    }

    fn write(&mut self, section: &str, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values.insert(SettingId::new(section, key), value.to_string());
        Ok(())
    }
}

/// On-disk layout: one table per section.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(flatten)]
    sections: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

/// Store backed by a TOML file whose tables are sections.
///
/// Values are written as strings. Hand-edited scalars (`speed = 1.5`) are
/// read back as their TOML text.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    /// Use the file at `path`. It is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<SettingsFile, SettingsError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(SettingsFile::default()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> Result<HashMap<SettingId, String>, SettingsError> {
        let file = self.read_file()?;
        let mut values = HashMap::new();
        for (section, entries) in file.sections {
            for (key, value) in entries {
                let text = match value {
                    toml::Value::String(text) => text,
                    other => other.to_string(),
                };
                values.insert(SettingId::new(section.clone(), key), text);
            }
        }
        Ok(values)
    }

    fn write(&mut self, section: &str, key: &str, value: &str) -> Result<(), SettingsError> {
        let mut file = self.read_file()?;
        file.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        let text = toml::to_string(&file)?;
        fs::write(&self.path, text).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let mut store = MemorySettingsStore::new();
        store.write("General", "Lock", "true").unwrap();
        assert_eq!(store.get("General", "Lock"), Some("true"));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_toml_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TomlSettingsStore::new(dir.path().join("mod.toml"));
        assert!(store.load().unwrap().is_empty());

        store.write("Monsters", "Speed", "1.5").unwrap();
        store.write("Monsters", "Name", "troll").unwrap();
        store.write("General", "Lock", "false").unwrap();

        let values = store.load().unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[&SettingId::new("Monsters", "Speed")], "1.5");

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("[Monsters]"));
    }

    #[test]
    fn test_toml_store_reads_hand_edited_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.toml");
        fs::write(&path, "[Monsters]\nSpeed = 2.5\nEnabled = true\n").unwrap();

        let values = TomlSettingsStore::new(&path).load().unwrap();
        assert_eq!(values[&SettingId::new("Monsters", "Speed")], "2.5");
        assert_eq!(values[&SettingId::new("Monsters", "Enabled")], "true");
    }

    #[test]
    fn test_toml_store_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.toml");
        fs::write(&path, "[Monsters\n").unwrap();
        assert!(matches!(
            TomlSettingsStore::new(&path).load(),
            Err(SettingsError::Parse { .. })
        ));
    }
}
