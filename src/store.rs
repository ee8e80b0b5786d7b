//! Persistence backends. Each save stamps the document, overwrites the
//! project and appends an immutable version; versions past the cap are
//! evicted oldest first.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::document::{ProjectDocument, ProjectSummary, VersionInfo};
use crate::error::{Error, Result};

pub trait ProjectStore {
    /// Persists `document` and returns it as stored, with its id and
    /// timestamps filled in.
    fn save(&mut self, document: &ProjectDocument) -> Result<ProjectDocument>;
    fn load(&self, id: &str) -> Result<ProjectDocument>;
    /// All projects, most recently updated first.
    fn list(&self) -> Result<Vec<ProjectSummary>>;
    /// Version history, newest first.
    fn list_versions(&self, id: &str) -> Result<Vec<VersionInfo>>;
    fn load_version(&self, id: &str, version: u64) -> Result<ProjectDocument>;
    /// Removes the project and its whole version history.
    fn delete(&mut self, id: &str) -> Result<()>;
}

/// Fills in id and timestamps for a save. `createdAt` survives from the
/// stored copy and `updatedAt` never goes backwards.
fn stamp(
    document: &ProjectDocument,
    existing: Option<&ProjectDocument>,
    now: DateTime<Utc>,
) -> Result<ProjectDocument> {
    if document.name.trim().is_empty() {
        return Err(Error::InvalidProject("project name is required".into()));
    }
    let mut stored = document.clone();
    let id = match &document.id {
        Some(id) => id.clone(),
        None => Uuid::new_v4().to_string(),
    };
    check_id(&id)?;
    stored.id = Some(id);
    stored.created_at = existing.and_then(|e| e.created_at).or(Some(now));
    let floor = existing
        .and_then(|e| e.updated_at)
        .map(|t| t + Duration::milliseconds(1));
    stored.updated_at = Some(match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    });
    Ok(stored)
}

/// Version id for a save at `now`, strictly above the last one.
fn next_version_id(now: DateTime<Utc>, last: Option<u64>) -> u64 {
    let millis = now.timestamp_millis().max(0) as u64;
    match last {
        Some(last) if last >= millis => last + 1,
        _ => millis,
    }
}

/// Ids become file names, so only a conservative alphabet is accepted.
fn check_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidProject(format!("invalid project id '{}'", id)))
    }
}

fn sort_summaries(summaries: &mut [ProjectSummary]) {
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Stores each project as `<dir>/<id>.json` with its versions under
/// `<dir>/<id>_versions/<version>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    max_versions: usize,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>, max_versions: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self {
            dir,
            max_versions: max_versions.max(1),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let dir = settings.projects_dir().ok_or(Error::NoConfigDir)?;
        Self::open(dir, settings.max_versions)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn project_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn versions_dir(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}_versions", id))
    }

    fn read_document(path: &Path) -> Result<ProjectDocument> {
        let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_document(path: &Path, document: &ProjectDocument) -> Result<()> {
        let contents = serde_json::to_string_pretty(document)?;
        fs::write(path, contents).map_err(|e| Error::io(path, e))
    }

    /// Stored version ids, oldest first.
    fn version_ids(&self, id: &str) -> Result<Vec<u64>> {
        let dir = self.versions_dir(id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<u64> = fs::read_dir(&dir)
            .map_err(|e| Error::io(&dir, e))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != "json" {
                    return None;
                }
                path.file_stem()?.to_str()?.parse().ok()
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn append_version(&self, id: &str, document: &ProjectDocument, now: DateTime<Utc>) -> Result<u64> {
        let dir = self.versions_dir(id);
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let existing = self.version_ids(id)?;
        let version = next_version_id(now, existing.last().copied());
        Self::write_document(&dir.join(format!("{}.json", version)), document)?;

        let total = existing.len() + 1;
        if total > self.max_versions {
            for old in existing.iter().take(total - self.max_versions) {
                let path = dir.join(format!("{}.json", old));
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), "failed to prune version: {}", e);
                }
            }
        }
        Ok(version)
    }
}

impl ProjectStore for FileStore {
    fn save(&mut self, document: &ProjectDocument) -> Result<ProjectDocument> {
        if let Some(id) = &document.id {
            check_id(id)?;
        }
        let existing = match &document.id {
            Some(id) if self.project_path(id).is_file() => {
                Some(Self::read_document(&self.project_path(id))?)
            }
            _ => None,
        };
        let now = Utc::now();
        let stored = stamp(document, existing.as_ref(), now)?;
        let id = stored.id.clone().unwrap_or_default();

        Self::write_document(&self.project_path(&id), &stored)?;
        let version = self.append_version(&id, &stored, now)?;
        info!(project = %id, version, "project saved");
        Ok(stored)
    }

    fn load(&self, id: &str) -> Result<ProjectDocument> {
        check_id(id)?;
        let path = self.project_path(id);
        if !path.is_file() {
            return Err(Error::ProjectNotFound(id.to_string()));
        }
        Self::read_document(&path)
    }

    fn list(&self) -> Result<Vec<ProjectSummary>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let mut summaries = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::read_document(&path) {
                Ok(document) => {
                    let id = document.id.clone().unwrap_or_else(|| stem.to_string());
                    summaries.push(ProjectSummary::describe(id, &document));
                }
                Err(e) => warn!(path = %path.display(), "skipping unreadable project: {}", e),
            }
        }
        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    fn list_versions(&self, id: &str) -> Result<Vec<VersionInfo>> {
        check_id(id)?;
        let dir = self.versions_dir(id);
        let mut versions = Vec::new();
        for version in self.version_ids(id)?.into_iter().rev() {
            let document = Self::read_document(&dir.join(format!("{}.json", version)))?;
            versions.push(VersionInfo::describe(version, &document));
        }
        Ok(versions)
    }

    fn load_version(&self, id: &str, version: u64) -> Result<ProjectDocument> {
        check_id(id)?;
        let path = self.versions_dir(id).join(format!("{}.json", version));
        if !path.is_file() {
            return Err(Error::VersionNotFound {
                project: id.to_string(),
                version,
            });
        }
        Self::read_document(&path)
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        check_id(id)?;
        let path = self.project_path(id);
        if !path.is_file() {
            return Err(Error::ProjectNotFound(id.to_string()));
        }
        fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        let versions = self.versions_dir(id);
        if versions.is_dir() {
            fs::remove_dir_all(&versions).map_err(|e| Error::io(&versions, e))?;
        }
        debug!(project = %id, "project deleted");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryProject {
    current: Option<ProjectDocument>,
    versions: BTreeMap<u64, ProjectDocument>,
}

/// In-process backend with the same contract as [`FileStore`].
#[derive(Debug)]
pub struct MemoryStore {
    projects: HashMap<String, MemoryProject>,
    max_versions: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Settings::default().max_versions)
    }
}

impl MemoryStore {
    pub fn new(max_versions: usize) -> Self {
        Self {
            projects: HashMap::new(),
            max_versions: max_versions.max(1),
        }
    }

    fn project(&self, id: &str) -> Result<&MemoryProject> {
        self.projects
            .get(id)
            .filter(|p| p.current.is_some())
            .ok_or_else(|| Error::ProjectNotFound(id.to_string()))
    }
}

impl ProjectStore for MemoryStore {
    fn save(&mut self, document: &ProjectDocument) -> Result<ProjectDocument> {
        let existing = document
            .id
            .as_ref()
            .and_then(|id| self.projects.get(id))
            .and_then(|p| p.current.as_ref());
        let now = Utc::now();
        let stored = stamp(document, existing, now)?;
        let id = stored.id.clone().unwrap_or_default();

        let max_versions = self.max_versions;
        let project = self.projects.entry(id).or_default();
        let last = project.versions.keys().next_back().copied();
        project.versions.insert(next_version_id(now, last), stored.clone());
        while project.versions.len() > max_versions {
            project.versions.pop_first();
        }
        project.current = Some(stored.clone());
        Ok(stored)
    }

    fn load(&self, id: &str) -> Result<ProjectDocument> {
        let project = self.project(id)?;
        project
            .current
            .clone()
            .ok_or_else(|| Error::ProjectNotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<ProjectSummary>> {
        let mut summaries: Vec<ProjectSummary> = self
            .projects
            .iter()
            .filter_map(|(id, p)| p.current.as_ref().map(|d| ProjectSummary::describe(id.clone(), d)))
            .collect();
        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    fn list_versions(&self, id: &str) -> Result<Vec<VersionInfo>> {
        Ok(self
            .projects
            .get(id)
            .map(|p| {
                p.versions
                    .iter()
                    .rev()
                    .map(|(v, d)| VersionInfo::describe(*v, d))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn load_version(&self, id: &str, version: u64) -> Result<ProjectDocument> {
        self.projects
            .get(id)
            .and_then(|p| p.versions.get(&version))
            .cloned()
            .ok_or_else(|| Error::VersionNotFound {
                project: id.to_string(),
                version,
            })
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        self.project(id)?;
        self.projects.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::node::{Node, NodeType};
    use pretty_assertions::assert_eq;

    fn draft() -> ProjectDocument {
        let mut doc = ProjectDocument::new("Draft");
        doc.nodes.push(Node::new(NodeType::Text, Point::new(10.0, 20.0)));
        doc
    }

    #[test]
    fn stamp_keeps_created_and_advances_updated() {
        let t0 = Utc::now();
        let first = stamp(&draft(), None, t0).unwrap();
        assert_eq!(first.created_at, Some(t0));
        assert_eq!(first.updated_at, Some(t0));

        // Same instant again: updatedAt still moves forward
        let second = stamp(&first, Some(&first), t0).unwrap();
        assert_eq!(second.created_at, Some(t0));
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.id, first.id);
    }

    #[test]
    fn empty_name_is_rejected() {
        let doc = ProjectDocument::new("  ");
        assert!(matches!(stamp(&doc, None, Utc::now()), Err(Error::InvalidProject(_))));
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let mut doc = draft();
        doc.id = Some("../escape".into());
        assert!(matches!(stamp(&doc, None, Utc::now()), Err(Error::InvalidProject(_))));
    }

    #[test]
    fn version_ids_strictly_increase() {
        let now = DateTime::from_timestamp_millis(5_000).unwrap();
        assert_eq!(next_version_id(now, None), 5_000);
        assert_eq!(next_version_id(now, Some(4_000)), 5_000);
        assert_eq!(next_version_id(now, Some(5_000)), 5_001);
        assert_eq!(next_version_id(now, Some(9_000)), 9_001);
    }

    #[test]
    fn file_store_round_trip_and_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(tmp.path(), 30).unwrap();
        let saved = store.save(&draft()).unwrap();
        let id = saved.id.clone().unwrap();

        assert_eq!(store.load(&id).unwrap(), saved);
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.list_versions(&id).unwrap().len(), 1);

        store.delete(&id).unwrap();
        assert!(matches!(store.load(&id), Err(Error::ProjectNotFound(_))));
        assert!(store.list_versions(&id).unwrap().is_empty());
        assert!(!tmp.path().join(format!("{}_versions", id)).exists());
    }

    #[test]
    fn file_store_prunes_oldest_versions() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(tmp.path(), 3).unwrap();
        let mut doc = store.save(&draft()).unwrap();
        let first_version = store.list_versions(doc.id.as_ref().unwrap()).unwrap()[0].id;
        for i in 0..4 {
            doc.name = format!("Draft {}", i);
            doc = store.save(&doc).unwrap();
        }
        let id = doc.id.clone().unwrap();
        let versions = store.list_versions(&id).unwrap();
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[0].name, "Draft 3");
        assert!(matches!(
            store.load_version(&id, first_version),
            Err(Error::VersionNotFound { .. })
        ));
    }

    #[test]
    fn memory_store_lists_newest_project_first() {
        let mut store = MemoryStore::default();
        let a = store.save(&ProjectDocument::new("a")).unwrap();
        let b = store.save(&ProjectDocument::new("b")).unwrap();
        // touching a again makes it the most recent
        store.save(&a).unwrap();
        let names: Vec<String> = store.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn file_store_refuses_ids_that_leave_its_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let inner = tmp.path().join("projects");
        std::fs::write(tmp.path().join("outside.json"), "not a project").unwrap();
        let mut store = FileStore::open(&inner, 30).unwrap();

        let mut doc = draft();
        doc.id = Some("../outside".into());
        // The stray file is never parsed, so the error is about the id
        assert!(matches!(store.save(&doc), Err(Error::InvalidProject(_))));
        assert_eq!(std::fs::read_dir(&inner).unwrap().count(), 0);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("outside.json")).unwrap(),
            "not a project"
        );
    }
}
