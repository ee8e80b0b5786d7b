use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Engine tunables, persisted as `settings.json` in the platform config dir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Quiet period before an edit becomes an undo snapshot.
    pub history_debounce_ms: u64,
    pub history_capacity: usize,
    /// How long changes are treated as the echo of an undo/redo.
    pub history_apply_window_ms: u64,
    pub autosave_interval_secs: u64,
    pub backup_max_age_hours: i64,
    pub max_versions: usize,
    pub toast_ms: u64,
    pub save_toast_ms: u64,
    pub error_toast_ms: u64,
    pub projects_dir: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_debounce_ms: 1000,
            history_capacity: 50,
            history_apply_window_ms: 100,
            autosave_interval_secs: 15,
            backup_max_age_hours: 24,
            max_versions: 30,
            toast_ms: 2500,
            save_toast_ms: 2000,
            error_toast_ms: 3000,
            projects_dir: None,
            storage_dir: None,
        }
    }
}

impl Settings {
    pub fn load() -> Option<Self> {
        let path = Self::config_path()?;
        let contents = fs::read_to_string(&path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(Error::NoConfigDir)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents).map_err(|e| Error::io(&path, e))
    }

    /// Where the file-backed project store keeps its documents.
    pub fn projects_dir(&self) -> Option<PathBuf> {
        self.projects_dir
            .clone()
            .or_else(|| Some(Self::dirs()?.data_dir().join("projects")))
    }

    /// Where the local key/value storage (backup slot, flags) lives.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.storage_dir
            .clone()
            .or_else(|| Some(Self::dirs()?.data_local_dir().join("local")))
    }

    fn dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "corkboard")
    }

    pub fn config_path() -> Option<PathBuf> {
        Some(Self::dirs()?.config_dir().join("settings.json"))
    }
}
