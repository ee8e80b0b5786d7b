use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backup::{self, BackupSlot, LocalStorage};
use crate::config::Settings;
use crate::document::{
    ChatMessage, EmergencyBackup, ProjectDocument, VersionInfo, Viewport, VoiceToneSettings,
};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::store::ProjectStore;
use crate::timer::Interval;

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";

/// Canvas state that is saved alongside the graph but owned elsewhere:
/// the chat transcript, the viewport and the voice settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub chat_messages: Vec<ChatMessage>,
    pub viewport: Viewport,
    pub voice_tone_settings: VoiceToneSettings,
}

/// Bridges the live canvas and the persistence backend: manual save,
/// silent autosave, the unload-time backup and version restore.
pub struct PersistenceCoordinator {
    store: Box<dyn ProjectStore>,
    storage: Box<dyn LocalStorage>,
    backup: BackupSlot,
    autosave: Interval,
    project_id: Option<String>,
    project_name: String,
}

impl PersistenceCoordinator {
    pub fn new(
        store: Box<dyn ProjectStore>,
        storage: Box<dyn LocalStorage>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            storage,
            backup: BackupSlot::from_settings(settings),
            autosave: Interval::new(Duration::from_secs(settings.autosave_interval_secs)),
            project_id: None,
            project_name: DEFAULT_PROJECT_NAME.to_string(),
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn set_project_name(&mut self, name: impl Into<String>) {
        self.project_name = name.into();
    }

    /// Document for the current canvas. Nodes carry only persistent
    /// content, so this is a plain copy.
    pub fn serialize(&self, graph: &GraphStore, session: &Session) -> ProjectDocument {
        let name = if self.project_name.trim().is_empty() {
            DEFAULT_PROJECT_NAME.to_string()
        } else {
            self.project_name.clone()
        };
        ProjectDocument {
            id: self.project_id.clone(),
            name,
            nodes: graph.nodes().to_vec(),
            edges: graph.edges().to_vec(),
            chat_messages: session.chat_messages.clone(),
            viewport: session.viewport,
            voice_tone_settings: session.voice_tone_settings.clone(),
            created_at: None,
            updated_at: None,
        }
    }

    fn submit(&mut self, graph: &GraphStore, session: &Session) -> Result<String> {
        let document = self.serialize(graph, session);
        let stored = self.store.save(&document)?;
        let id = stored
            .id
            .ok_or_else(|| Error::Storage("backend returned no project id".into()))?;
        self.project_id = Some(id.clone());
        self.backup.clear(self.storage.as_mut());
        Ok(id)
    }

    /// User-initiated save. On failure the canvas is left untouched and the
    /// error is returned for display.
    pub fn manual_save(&mut self, graph: &GraphStore, session: &Session) -> Result<String> {
        match self.submit(graph, session) {
            Ok(id) => {
                info!(project = %id, nodes = graph.nodes().len(), "project saved");
                Ok(id)
            }
            Err(e) => {
                warn!("save failed: {}", e);
                Err(e)
            }
        }
    }

    /// Background save; failures are logged and swallowed.
    pub fn silent_save(&mut self, graph: &GraphStore, session: &Session) -> bool {
        match self.submit(graph, session) {
            Ok(id) => {
                debug!(project = %id, "autosaved");
                true
            }
            Err(e) => {
                debug!("autosave failed: {}", e);
                false
            }
        }
    }

    pub fn start_autosave(&mut self, now: Instant) {
        self.autosave.schedule(now);
    }

    pub fn autosave_running(&self) -> bool {
        self.autosave.is_running()
    }

    /// Runs the autosave when its interval elapsed and there is something
    /// worth saving. Returns whether a save succeeded.
    pub fn tick(&mut self, now: Instant, graph: &GraphStore, session: &Session) -> bool {
        if !self.autosave.poll(now) {
            return false;
        }
        if graph.is_empty() && self.project_id.is_none() {
            return false;
        }
        self.silent_save(graph, session)
    }

    /// Unload-time backup. Best effort: nothing is written for an empty,
    /// never-saved canvas and storage failures are swallowed.
    pub fn emergency_backup(&mut self, graph: &GraphStore, session: &Session, now: DateTime<Utc>) -> bool {
        if graph.is_empty() && self.project_id.is_none() {
            return false;
        }
        let document = self.serialize(graph, session);
        match self.backup.write(self.storage.as_mut(), &document, now) {
            Ok(()) => true,
            Err(e) => {
                debug!("emergency backup skipped: {}", e);
                false
            }
        }
    }

    /// A recoverable backup, if one is waiting. Stale or empty backups are
    /// deleted on the way.
    pub fn pending_backup(&mut self, now: DateTime<Utc>) -> Option<EmergencyBackup> {
        self.backup.recover(self.storage.as_mut(), now)
    }

    /// Replaces the canvas with the pending backup and deletes the slot.
    pub fn accept_backup(&mut self, now: DateTime<Utc>, graph: &mut GraphStore, session: &mut Session) -> bool {
        let Some(backup) = self.pending_backup(now) else {
            return false;
        };
        let document = backup.document;
        self.project_id = document.id.clone();
        self.project_name = document.name.clone();
        graph.set_nodes(document.nodes);
        graph.set_edges(document.edges);
        session.chat_messages = document.chat_messages;
        self.backup.clear(self.storage.as_mut());
        info!(nodes = graph.nodes().len(), "backup restored");
        true
    }

    pub fn discard_backup(&mut self) {
        self.backup.clear(self.storage.as_mut());
        debug!("backup discarded");
    }

    /// Loads a saved project into the canvas and makes it the current one.
    pub fn open_project(&mut self, id: &str, graph: &mut GraphStore, session: &mut Session) -> Result<()> {
        let document = self.store.load(id)?;
        self.project_name = document.name.clone();
        self.project_id = Some(document.id.clone().unwrap_or_else(|| id.to_string()));
        session.voice_tone_settings = document.voice_tone_settings.clone();
        replace_canvas(document, graph, session);
        info!(project = %id, "project opened");
        Ok(())
    }

    pub fn list_versions(&self) -> Result<Vec<VersionInfo>> {
        match &self.project_id {
            Some(id) => self.store.list_versions(id),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces nodes, edges, viewport and chat with a saved version.
    pub fn restore_version(&mut self, version: u64, graph: &mut GraphStore, session: &mut Session) -> Result<()> {
        let id = self
            .project_id
            .clone()
            .ok_or_else(|| Error::InvalidProject("project has not been saved yet".into()))?;
        let document = self.store.load_version(&id, version)?;
        replace_canvas(document, graph, session);
        info!(project = %id, version, "version restored");
        Ok(())
    }

    pub fn should_show_onboarding(&self) -> bool {
        backup::should_show_onboarding(self.storage.as_ref())
    }

    pub fn mark_onboarding_seen(&mut self) {
        if let Err(e) = backup::mark_onboarding_seen(self.storage.as_mut()) {
            warn!("could not store onboarding flag: {}", e);
        }
    }

    pub fn teardown(&mut self) {
        self.autosave.flush_on_teardown();
    }
}

fn replace_canvas(document: ProjectDocument, graph: &mut GraphStore, session: &mut Session) {
    graph.set_nodes(document.nodes);
    graph.set_edges(document.edges);
    session.viewport = document.viewport;
    session.chat_messages = document.chat_messages;
}
