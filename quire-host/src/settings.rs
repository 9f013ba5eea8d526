use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Host settings, persisted to `<config dir>/quire/settings.json`.
///
/// `#[serde(default)]` fills fields missing from an older file with their
/// defaults, so new fields can be added without breaking existing configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Argv of the external directory chooser. Empty disables `openWorkspace`.
    pub picker_command: Vec<String>,
    /// Depth of the listing sent after a workspace opens.
    pub list_depth: u32,
    /// File I/O worker lanes; `0` runs file work on the message thread.
    pub io_workers: usize,
    /// Overrides `<data dir>/quire/state.json`.
    pub state_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            picker_command: vec![
                String::from("zenity"),
                String::from("--file-selection"),
                String::from("--directory"),
            ],
            list_depth: 2,
            io_workers: 4,
            state_file: None,
        }
    }
}

impl Settings {
    pub fn state_path(&self) -> Option<PathBuf> {
        self.state_file
            .clone()
            .or_else(quire_core::store::StateStore::default_location)
    }
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("quire").join("settings.json"))
}

pub fn load() -> Settings {
    match settings_path() {
        Some(path) => load_from(&path),
        None => {
            log::warn!("No config directory; using default settings");
            Settings::default()
        }
    }
}

pub fn load_from(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Ignoring invalid settings file '{}': {}", path.display(), e);
            Settings::default()
        }),
        Err(_) => Settings::default(),
    }
}

pub fn save(settings: &Settings) -> Result<(), String> {
    let path = settings_path().ok_or_else(|| "No config directory".to_string())?;
    save_to(settings, &path)
}

pub fn save_to(settings: &Settings, path: &Path) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create '{}': {}", dir.display(), e))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, json)
        .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))
}
