//! Key-value state backends.
//!
//! The store persists through a [`StateBackend`]. Two implementations exist:
//! - [`JsonFileState`]: a JSON object on disk in the per-user config directory
//! - [`MemoryState`]: process-local, for tests and throwaway sessions

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use directories::ProjectDirs;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;

/// State file name inside the config directory.
pub const STATE_FILE: &str = "state.json";

/// Durable key-value state.
pub trait StateBackend: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value, replacing any previous one.
    fn update(&self, key: &str, value: Value) -> Result<(), ConfigError>;
}

/// Receives every key-value change made by the store.
///
/// This is how UI layers observe the node address and the
/// "connection configured" flag without polling the store.
pub trait Publisher: Send + Sync {
    fn publish(&self, key: &str, value: &Value);
}

/// Default per-user config directory.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("dev", "pyrsia", "pyrsia-panel")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(ConfigError::NoConfigDir)
}

/// State persisted as a single JSON object.
pub struct JsonFileState {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileState {
    /// Open the state file in the default per-user config directory.
    pub fn open_default() -> Result<Self, ConfigError> {
        Self::open(config_dir()?.join(STATE_FILE))
    }

    /// Open (or lazily create) the state file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        let values = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| ConfigError::io(&path, e))?;
            if contents.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            Map::new()
        };

        debug!(path = ?path, keys = values.len(), "Loaded node state");

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &Map<String, Value>) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| ConfigError::io(dir, e))?;
        }

        let contents = serde_json::to_string_pretty(values)?;

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .map_err(|e| ConfigError::io(&self.path, e))?;
            file.write_all(contents.as_bytes())
                .map_err(|e| ConfigError::io(&self.path, e))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.path, contents).map_err(|e| ConfigError::io(&self.path, e))?;
        }

        Ok(())
    }
}

impl StateBackend for JsonFileState {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn update(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = values.clone();
        next.insert(key.to_string(), value);
        self.save(&next)?;
        *values = next;
        Ok(())
    }
}

/// In-memory state.
#[derive(Default)]
pub struct MemoryState {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a value (e.g. a previously stored address).
    pub fn with(self, key: &str, value: Value) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        self
    }
}

impl StateBackend for MemoryState {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn update(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        Ok(())
    }
}
