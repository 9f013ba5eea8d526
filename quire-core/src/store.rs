use fs2::FileExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::filesystem::write_atomic;

/// Durable key-value slots shared by the host session and the view layout.
///
/// Values live in a single JSON object on disk. Every mutation re-reads the
/// file under an advisory lock, merges its one slot and writes the result
/// back through an atomic replace, so stores sharing the file (in one process
/// or several) never drop each other's slots. A store without a backing file
/// keeps its values in memory only.
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl StateStore {
    /// Open (or lazily create) the store at `path`. A missing or unreadable
    /// file starts empty; nothing is written until the first mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = read_map(&path);
        StateStore {
            path: Some(path),
            values: Mutex::new(values),
        }
    }

    pub fn in_memory() -> Self {
        StateStore {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    /// `<data dir>/quire/state.json`
    pub fn default_location() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("quire").join("state.json"))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read a slot. Missing slots and values of the wrong shape read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.lock();
        let value = values.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                log::debug!("State slot '{}' has unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), String> {
        let value = serde_json::to_value(value)
            .map_err(|e| format!("Failed to encode state slot '{}': {}", key, e))?;
        self.update(key, Some(value))
    }

    pub fn remove(&self, key: &str) -> Result<(), String> {
        self.update(key, None)
    }

    /// Apply one slot change. With a backing file, the change is merged into
    /// what is on disk now, so slots written by other stores survive. The
    /// in-memory copy only changes once the write succeeded.
    fn update(&self, key: &str, value: Option<Value>) -> Result<(), String> {
        let mut values = self.values.lock();
        let Some(path) = &self.path else {
            apply(&mut values, key, value);
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
        }
        let lock_path = path.with_extension("lock");
        let lock_file = File::create(&lock_path)
            .map_err(|e| format!("Failed to create lock file '{}': {}", lock_path.display(), e))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| format!("Failed to acquire state lock: {}", e))?;

        let mut merged = read_map(path);
        let changed = apply(&mut merged, key, value);
        if changed {
            let json = serde_json::to_string_pretty(&merged)
                .map_err(|e| format!("Failed to encode state: {}", e))?;
            write_atomic(path, |file| file.write_all(json.as_bytes()))?;
        }
        *values = merged;
        Ok(())
    }
}

/// Returns whether `map` changed.
fn apply(map: &mut Map<String, Value>, key: &str, value: Option<Value>) -> bool {
    match value {
        Some(v) => map.insert(key.to_string(), v.clone()).as_ref() != Some(&v),
        None => map.remove(key).is_some(),
    }
}

fn read_map(path: &Path) -> Map<String, Value> {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Map<String, Value>>(&contents) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("Ignoring corrupt state file {}: {}", path.display(), e);
                Map::new()
            }
        },
        Err(_) => Map::new(),
    }
}
