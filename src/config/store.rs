use anyhow::{Context, Result};
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use super::AiConfig;

/// Key the serialized configuration record lives under.
pub const CONFIG_KEY: &str = "stockwise_ai_config";

/// Process-wide key-value store for settings records. The assistant only
/// ever uses one key, but the seam keeps persistence out of the core and
/// lets tests run in memory.
pub trait SettingsStore {
    /// Returns the raw stored value, or None when the key is absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Overwrites the value for a key in one shot.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Loads the configuration record, falling back to the documented defaults
/// when the record is absent or unreadable.
pub fn load_config(store: &dyn SettingsStore) -> AiConfig {
    match store.get(CONFIG_KEY) {
        None => AiConfig::default(),
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("stored AI config is malformed ({err}); using defaults");
            AiConfig::default()
        }),
    }
}

/// Serializes and writes the full configuration record.
pub fn save_config(store: &mut dyn SettingsStore, config: &AiConfig) -> Result<()> {
    let raw = serde_json::to_string(config).context("serialize AI config")?;
    store.set(CONFIG_KEY, &raw)
}

/// Store backed by one JSON file per key inside a directory, normally the
/// user config dir.
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new(dir: PathBuf) -> Self {
        FileSettingsStore { dir }
    }

    /// Default location under the platform config directory, e.g.
    /// `~/.config/stockwise` on Linux.
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stockwise"))
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path(key)) {
            Ok(raw) => Some(raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!("could not read settings file for '{key}': {err}");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create settings dir {}", self.dir.display()))?;
        let path = self.path(key);
        fs::write(&path, value).with_context(|| format!("write {}", path.display()))
    }
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
