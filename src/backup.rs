//! Local key/value storage and the two things kept in it: the single
//! emergency backup slot and the onboarding-seen flag.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::document::{EmergencyBackup, ProjectDocument};
use crate::error::{Error, Result};

pub const BACKUP_KEY: &str = "corkboard-backup";
pub const ONBOARDING_KEY: &str = "corkboard-onboarding-complete";

pub trait LocalStorage {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::open(settings.storage_dir().ok_or(Error::NoConfigDir)?)
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::Storage(format!("invalid key '{}'", key)));
        }
        Ok(self.dir.join(key))
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key)?;
        fs::write(&path, value).map_err(|e| Error::io(path, e))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

/// In-memory storage with an optional byte quota, mirroring a browser's
/// limited local storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: HashMap::new(),
            quota: Some(quota),
        }
    }

    fn used_without(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            if self.used_without(key) + key.len() + value.len() > quota {
                return Err(Error::Storage("quota exceeded".into()));
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// The single emergency backup slot.
#[derive(Debug, Clone)]
pub struct BackupSlot {
    max_age: Duration,
}

impl Default for BackupSlot {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl BackupSlot {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(Duration::hours(settings.backup_max_age_hours))
    }

    /// Overwrites the slot with `document` stamped at `now`.
    pub fn write(
        &self,
        storage: &mut dyn LocalStorage,
        document: &ProjectDocument,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let backup = EmergencyBackup {
            document: document.clone(),
            timestamp: now,
        };
        let json = serde_json::to_string(&backup)?;
        storage.set(BACKUP_KEY, &json)?;
        debug!(nodes = document.nodes.len(), "emergency backup written");
        Ok(())
    }

    /// Returns the stored backup if it is readable, non-empty and younger
    /// than the maximum age. Anything else is deleted and `None` returned.
    pub fn recover(&self, storage: &mut dyn LocalStorage, now: DateTime<Utc>) -> Option<EmergencyBackup> {
        let raw = match storage.get(BACKUP_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("backup slot unreadable: {}", e);
                return None;
            }
        };
        let backup: EmergencyBackup = match serde_json::from_str(&raw) {
            Ok(backup) => backup,
            Err(e) => {
                warn!("discarding corrupt backup: {}", e);
                self.clear(storage);
                return None;
            }
        };
        if backup.document.is_empty() {
            debug!("discarding empty backup");
            self.clear(storage);
            return None;
        }
        if now - backup.timestamp > self.max_age {
            info!(saved = %backup.timestamp, "discarding stale backup");
            self.clear(storage);
            return None;
        }
        Some(backup)
    }

    pub fn clear(&self, storage: &mut dyn LocalStorage) {
        if let Err(e) = storage.remove(BACKUP_KEY) {
            warn!("failed to clear backup slot: {}", e);
        }
    }
}

pub fn should_show_onboarding(storage: &dyn LocalStorage) -> bool {
    !matches!(storage.get(ONBOARDING_KEY), Ok(Some(v)) if v == "true")
}

pub fn mark_onboarding_seen(storage: &mut dyn LocalStorage) -> Result<()> {
    storage.set(ONBOARDING_KEY, "true")
}

pub fn reset_onboarding(storage: &mut dyn LocalStorage) -> Result<()> {
    storage.remove(ONBOARDING_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::node::{Node, NodeType};
    use pretty_assertions::assert_eq;

    fn document(nodes: usize) -> ProjectDocument {
        let mut doc = ProjectDocument::new("Untitled Project");
        for _ in 0..nodes {
            doc.nodes.push(Node::new(NodeType::Text, Point::ORIGIN));
        }
        doc
    }

    #[test]
    fn fresh_backup_is_recovered_and_kept() {
        let mut storage = MemoryStorage::new();
        let slot = BackupSlot::default();
        let now = Utc::now();
        slot.write(&mut storage, &document(2), now).unwrap();

        let backup = slot.recover(&mut storage, now + Duration::hours(1)).unwrap();
        assert_eq!(backup.document.nodes.len(), 2);
        // Recovery only reads; accepting or discarding clears the slot
        assert!(storage.get(BACKUP_KEY).unwrap().is_some());
    }

    #[test]
    fn stale_backup_is_deleted() {
        let mut storage = MemoryStorage::new();
        let slot = BackupSlot::default();
        let now = Utc::now();
        slot.write(&mut storage, &document(1), now).unwrap();
        assert!(slot.recover(&mut storage, now + Duration::hours(25)).is_none());
        assert_eq!(storage.get(BACKUP_KEY).unwrap(), None);
    }

    #[test]
    fn empty_backup_is_deleted() {
        let mut storage = MemoryStorage::new();
        let slot = BackupSlot::default();
        let now = Utc::now();
        slot.write(&mut storage, &document(0), now).unwrap();
        assert!(slot.recover(&mut storage, now).is_none());
        assert_eq!(storage.get(BACKUP_KEY).unwrap(), None);
    }

    #[test]
    fn corrupt_backup_is_deleted() {
        let mut storage = MemoryStorage::new();
        storage.set(BACKUP_KEY, "{not json").unwrap();
        assert!(BackupSlot::default().recover(&mut storage, Utc::now()).is_none());
        assert_eq!(storage.get(BACKUP_KEY).unwrap(), None);
    }

    #[test]
    fn quota_rejects_large_writes() {
        let mut storage = MemoryStorage::with_quota(64);
        let err = BackupSlot::default().write(&mut storage, &document(3), Utc::now());
        assert!(matches!(err, Err(Error::Storage(_))));
    }

    #[test]
    fn onboarding_flag_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(tmp.path()).unwrap();
        assert!(should_show_onboarding(&storage));
        mark_onboarding_seen(&mut storage).unwrap();
        assert!(!should_show_onboarding(&storage));
        reset_onboarding(&mut storage).unwrap();
        assert!(should_show_onboarding(&storage));
    }

    #[test]
    fn file_storage_rejects_path_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(tmp.path()).unwrap();
        assert!(storage.set("../x", "v").is_err());
        assert_eq!(storage.get("missing").unwrap(), None);
        storage.remove("missing").unwrap();
    }
}
