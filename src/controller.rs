//! Canvas workspace controller.
//!
//! Owns the graph, its history, the persistence coordinator and all
//! transient UI state. The host feeds it [`Message`]s and runs the
//! [`Effect`]s it returns; collaborator results come back as messages.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::capabilities::{Capabilities, Capability, NodeStatus};
use crate::chat::{self, CanvasContext};
use crate::config::Settings;
use crate::document::{ChatMessage, EmergencyBackup, Viewport, VoiceToneSettings};
use crate::export;
use crate::geometry::{Point, Size};
use crate::graph::GraphStore;
use crate::groups::{self, MembershipChange};
use crate::history::History;
use crate::layout::LayoutKind;
use crate::node::{EdgeId, Node, NodeFields, NodeId, NodeType};
use crate::persistence::{PersistenceCoordinator, Session};
use crate::search::{self, NodeQuery};
use crate::toast::{ToastKind, ToastSlot, Toasts};

const DEFAULT_SCREEN: Size = Size {
    width: 1200.0,
    height: 800.0,
};
const NOTES_SIZE: Size = Size {
    width: 400.0,
    height: 500.0,
};
const MIN_TRANSCRIPT_CHARS: usize = 20;
const MAX_TRANSCRIPT_CHARS: usize = 12_000;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv"];
const CODE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "rb", "go", "rs", "java", "c", "cpp", "h", "css", "html",
    "xml", "json",
];

/// A key event as the host saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyPress {
    pub key: char,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
    /// Focus is inside a text input; bare keys belong to it.
    pub in_text_field: bool,
}

impl KeyPress {
    pub fn bare(key: char) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    pub fn ctrl(key: char) -> Self {
        Self {
            key,
            ctrl: true,
            ..Default::default()
        }
    }

    pub fn ctrl_shift(key: char) -> Self {
        Self {
            key,
            ctrl: true,
            shift: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Save,
    ToggleSearch,
    Undo,
    Redo,
    Export,
    QuickAdd(NodeType),
}

impl Shortcut {
    pub fn from_key(press: &KeyPress) -> Option<Shortcut> {
        let key = press.key.to_ascii_lowercase();
        if press.ctrl || press.meta {
            return match key {
                's' => Some(Shortcut::Save),
                'f' => Some(Shortcut::ToggleSearch),
                'z' if press.shift => Some(Shortcut::Redo),
                'z' => Some(Shortcut::Undo),
                'e' => Some(Shortcut::Export),
                _ => None,
            };
        }
        if press.alt || press.in_text_field {
            return None;
        }
        NodeType::from_digit(key).map(Shortcut::QuickAdd)
    }
}

/// A file dropped onto the canvas. Text files arrive with their contents
/// already read; binary files are uploaded by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedFile {
    pub name: String,
    pub mime: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DropKind {
    Image,
    Pdf,
    Text,
    Code { language: String },
}

impl DroppedFile {
    fn extension(&self) -> Option<String> {
        let (_, ext) = self.name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }

    fn kind(&self) -> Option<DropKind> {
        if self.mime.starts_with("image/") {
            return Some(DropKind::Image);
        }
        if self.mime == "application/pdf" {
            return Some(DropKind::Pdf);
        }
        let ext = self.extension();
        if let Some(ext) = ext.as_deref().filter(|e| CODE_EXTENSIONS.contains(e)) {
            return Some(DropKind::Code {
                language: ext.to_string(),
            });
        }
        let textual = self.mime.starts_with("text/")
            || ext.as_deref().is_some_and(|e| TEXT_EXTENSIONS.contains(&e));
        textual.then_some(DropKind::Text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    AddNode {
        node_type: NodeType,
        position: Option<Point>,
        fields: NodeFields,
    },
    UpdateNodeData {
        node: NodeId,
        patch: NodeFields,
    },
    DeleteNode(NodeId),
    Connect {
        source: NodeId,
        target: NodeId,
    },
    DeleteEdge(EdgeId),
    Drag {
        node: NodeId,
        position: Point,
    },
    DragStop(NodeId),
    ToggleLock(NodeId),
    ClearCanvas,
    Undo,
    Redo,
    AutoLayout(LayoutKind),
    Save,
    Key(KeyPress),
    ViewportChanged(Viewport),
    ScreenResized(Size),
    Rename(String),
    VoiceToneChanged(VoiceToneSettings),
    // Search
    SearchToggle,
    SearchInput { text: String },
    SearchRegex(bool),
    SearchClear,
    SearchCommit,
    ExportDocument,
    ExportChat,
    // Collaborator requests
    FileDropped {
        file: DroppedFile,
        position: Point,
    },
    UploadFile {
        node: NodeId,
        file_name: String,
    },
    SubmitYouTube {
        node: NodeId,
        url: String,
    },
    SubmitUrl {
        node: NodeId,
        url: String,
    },
    SendChat {
        text: String,
        /// Let the chat service search the web before answering.
        web_search: bool,
    },
    AiAction {
        node: NodeId,
        prompt: String,
        web_search: bool,
    },
    GenerateNotes(NodeId),
    GenerateImage {
        node: NodeId,
        prompt: String,
    },
    DismissError(NodeId),
    // Collaborator results
    Resolved {
        node: NodeId,
        result: Result<NodeFields, String>,
    },
    ChatReplied(Result<String, String>),
    NotesGenerated {
        node: NodeId,
        result: Result<String, String>,
    },
    // Project
    OpenProject(String),
    RestoreVersion(u64),
    OnboardingSeen,
}

/// Work the host performs on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Upload {
        node: NodeId,
        file_name: String,
    },
    FetchYouTube {
        node: NodeId,
        url: String,
    },
    Scrape {
        node: NodeId,
        url: String,
    },
    Chat {
        messages: Vec<ChatMessage>,
        context: CanvasContext,
        voice_tone: VoiceToneSettings,
        web_search: bool,
    },
    GenerateNotes {
        node: NodeId,
        prompt: String,
    },
    /// Result comes back as [`Message::Resolved`] with an `image_url`.
    GenerateImage {
        node: NodeId,
        prompt: String,
    },
    Download {
        file_name: String,
        mime: &'static str,
        contents: String,
    },
    FitView,
}

#[derive(Debug, Default)]
struct SearchState {
    open: bool,
    query: String,
    use_regex: bool,
    results: Vec<NodeId>,
    error: Option<String>,
}

pub struct Controller {
    settings: Settings,
    graph: GraphStore,
    history: History,
    persistence: PersistenceCoordinator,
    session: Session,
    capabilities: Capabilities,
    toasts: Toasts,
    search: SearchState,
    screen: Size,
    /// Graph revision last reported to the history.
    seen_revision: u64,
    /// Node a pending chat request was started from.
    chat_origin: Option<NodeId>,
    chat_pending: bool,
}

impl Controller {
    pub fn new(settings: Settings, persistence: PersistenceCoordinator, now: Instant) -> Self {
        let mut controller = Self {
            history: History::from_settings(&settings),
            settings,
            graph: GraphStore::new(),
            persistence,
            session: Session::default(),
            capabilities: Capabilities::new(),
            toasts: Toasts::new(),
            search: SearchState::default(),
            screen: DEFAULT_SCREEN,
            seen_revision: 0,
            chat_origin: None,
            chat_pending: false,
        };
        controller.seen_revision = controller.graph.revision();
        // The starting canvas becomes the first undo entry
        controller.history.record_change(now);
        controller.persistence.start_autosave(now);
        controller
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn persistence(&self) -> &PersistenceCoordinator {
        &self.persistence
    }

    pub fn toasts(&self) -> &Toasts {
        &self.toasts
    }

    pub fn status(&self, node: &NodeId) -> NodeStatus {
        self.capabilities.status(node)
    }

    pub fn drop_target(&self) -> Option<&NodeId> {
        self.capabilities.drop_target()
    }

    pub fn supports(&self, node: &NodeId, capability: Capability) -> bool {
        self.capabilities.supports(&self.graph, node, capability)
    }

    pub fn search_open(&self) -> bool {
        self.search.open
    }

    pub fn search_results(&self) -> &[NodeId] {
        &self.search.results
    }

    pub fn search_error(&self) -> Option<&str> {
        self.search.error.as_deref()
    }

    pub fn chat_pending(&self) -> bool {
        self.chat_pending
    }

    /// Canvas point under the middle of the screen.
    pub fn canvas_center(&self) -> Point {
        let vp = self.session.viewport;
        let zoom = if vp.zoom > 0.0 { vp.zoom } else { 1.0 };
        Point::new(
            (self.screen.width / 2.0 - vp.x) / zoom,
            (self.screen.height / 2.0 - vp.y) / zoom,
        )
    }

    fn toast(&mut self, slot: ToastSlot, kind: ToastKind, message: impl Into<String>, now: Instant) {
        let ms = match (slot, kind) {
            (_, ToastKind::Error) => self.settings.error_toast_ms,
            (ToastSlot::Save, _) => self.settings.save_toast_ms,
            _ => self.settings.toast_ms,
        };
        self.toasts.show(slot, kind, message, now, Duration::from_millis(ms));
    }

    pub fn update(&mut self, message: Message, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        match message {
            Message::AddNode {
                node_type,
                position,
                fields,
            } => {
                self.add_node(node_type, position, &fields);
            }
            Message::UpdateNodeData { node, patch } => {
                if self.supports(&node, Capability::Edit) {
                    self.graph.update_node_data(&node, &patch);
                }
            }
            Message::DeleteNode(node) => {
                if self.supports(&node, Capability::Delete) {
                    self.graph.delete_node(&node);
                }
            }
            Message::Connect { source, target } => {
                self.graph.add_edge(&source, &target);
            }
            Message::DeleteEdge(edge) => {
                self.graph.delete_edge(&edge);
            }
            Message::Drag { node, position } => {
                let position = groups::constrain_to_parent(&self.graph, &node, position);
                if self.graph.move_node(&node, position) {
                    let hover = groups::hover_target(&self.graph, &node);
                    self.capabilities.set_drop_target(hover);
                }
            }
            Message::DragStop(node) => {
                self.capabilities.set_drop_target(None);
                if let Some(change) = groups::commit_drop(&mut self.graph, &node) {
                    let kind = match change {
                        MembershipChange::Added { .. } => ToastKind::Success,
                        MembershipChange::Removed { .. } => ToastKind::Info,
                    };
                    self.toast(ToastSlot::Group, kind, change.message(), now);
                }
            }
            Message::ToggleLock(node) => {
                if let Some(locked) = self.graph.toggle_lock(&node) {
                    debug!(node = %node, locked, "lock toggled");
                }
            }
            Message::ClearCanvas => {
                self.graph.clear();
            }
            Message::Undo => {
                self.history.undo(&mut self.graph, now);
            }
            Message::Redo => {
                self.history.redo(&mut self.graph, now);
            }
            Message::AutoLayout(kind) => {
                if !self.graph.is_empty() {
                    let positions = kind.run(self.graph.nodes(), self.graph.edges(), self.canvas_center());
                    self.graph.apply_positions(&positions);
                    effects.push(Effect::FitView);
                }
            }
            Message::Save => self.save(now),
            Message::Key(press) => {
                if let Some(shortcut) = Shortcut::from_key(&press) {
                    effects.extend(self.shortcut(shortcut, now));
                }
            }
            Message::ViewportChanged(viewport) => {
                self.session.viewport = viewport;
            }
            Message::ScreenResized(size) => {
                self.screen = size;
            }
            Message::Rename(name) => {
                self.persistence.set_project_name(name);
                self.persistence.start_autosave(now);
            }
            Message::VoiceToneChanged(settings) => {
                self.session.voice_tone_settings = settings;
            }
            Message::SearchToggle => {
                self.search = SearchState {
                    open: !self.search.open,
                    use_regex: self.search.use_regex,
                    ..Default::default()
                };
            }
            Message::SearchInput { text } => {
                self.search.open = true;
                self.search.query = text;
                self.refresh_search();
            }
            Message::SearchRegex(enabled) => {
                self.search.use_regex = enabled;
                self.refresh_search();
            }
            Message::SearchClear => {
                self.search = SearchState {
                    use_regex: self.search.use_regex,
                    ..Default::default()
                };
            }
            Message::SearchCommit => {
                self.refresh_search();
                if let Some(first) = self.search.results.first() {
                    if let Some(viewport) =
                        search::focus_viewport(&self.graph, first, self.screen.width, self.screen.height)
                    {
                        self.session.viewport = viewport;
                    }
                }
                self.search = SearchState {
                    use_regex: self.search.use_regex,
                    ..Default::default()
                };
            }
            Message::ExportDocument => effects.extend(self.export_document(now)),
            Message::ExportChat => effects.extend(self.export_chat(now)),
            Message::FileDropped { file, position } => {
                effects.extend(self.drop_file(file, position));
            }
            Message::UploadFile { node, file_name } => {
                if self.supports(&node, Capability::UploadFile) {
                    self.capabilities.begin_loading(&node);
                    effects.push(Effect::Upload { node, file_name });
                }
            }
            Message::SubmitYouTube { node, url } => {
                if self.supports(&node, Capability::SubmitYouTube) {
                    self.capabilities.begin_loading(&node);
                    effects.push(Effect::FetchYouTube { node, url });
                }
            }
            Message::SubmitUrl { node, url } => {
                if self.supports(&node, Capability::SubmitUrl) {
                    self.capabilities.begin_loading(&node);
                    effects.push(Effect::Scrape { node, url });
                }
            }
            Message::SendChat { text, web_search } => {
                effects.extend(self.send_chat(text, None, web_search));
            }
            Message::AiAction {
                node,
                prompt,
                web_search,
            } => {
                if self.supports(&node, Capability::AiAction) {
                    effects.extend(self.send_chat(prompt, Some(node), web_search));
                }
            }
            Message::GenerateNotes(node) => {
                effects.extend(self.generate_notes(node));
            }
            Message::GenerateImage { node, prompt } => {
                let prompt = prompt.trim().to_string();
                if !prompt.is_empty() && self.supports(&node, Capability::GenerateImage) {
                    self.capabilities.begin_loading(&node);
                    effects.push(Effect::GenerateImage { node, prompt });
                }
            }
            Message::DismissError(node) => self.capabilities.clear_error(&node),
            Message::Resolved { node, result } => self.resolved(node, result, now),
            Message::ChatReplied(result) => self.chat_replied(result, now),
            Message::NotesGenerated { node, result } => self.notes_generated(node, result, now),
            Message::OpenProject(id) => {
                match self.persistence.open_project(&id, &mut self.graph, &mut self.session) {
                    Ok(()) => effects.push(Effect::FitView),
                    Err(e) => self.toast(ToastSlot::General, ToastKind::Error, format!("Open failed: {}", e), now),
                }
            }
            Message::RestoreVersion(version) => {
                match self
                    .persistence
                    .restore_version(version, &mut self.graph, &mut self.session)
                {
                    Ok(()) => self.toast(ToastSlot::General, ToastKind::Success, "Version restored", now),
                    Err(e) => {
                        self.toast(ToastSlot::General, ToastKind::Error, format!("Restore failed: {}", e), now)
                    }
                }
            }
            Message::OnboardingSeen => self.persistence.mark_onboarding_seen(),
        }
        self.after_update(now);
        effects
    }

    /// Reports graph changes to the history, restarts the autosave period
    /// and forgets status of nodes that are gone.
    fn after_update(&mut self, now: Instant) {
        let revision = self.graph.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.history.record_change(now);
            self.persistence.start_autosave(now);
            self.capabilities.retain_existing(&self.graph);
            if self.chat_origin.as_ref().is_some_and(|id| self.graph.node(id).is_none()) {
                self.chat_origin = None;
            }
        }
    }

    /// Drives the timers: history capture, autosave and toast expiry.
    pub fn tick(&mut self, now: Instant) {
        self.history.tick(now, &self.graph);
        self.persistence.tick(now, &self.graph, &self.session);
        self.toasts.expire(now);
    }

    /// Unload-time backup.
    pub fn unload(&mut self, at: DateTime<Utc>) -> bool {
        self.persistence.emergency_backup(&self.graph, &self.session, at)
    }

    pub fn pending_backup(&mut self, at: DateTime<Utc>) -> Option<EmergencyBackup> {
        self.persistence.pending_backup(at)
    }

    pub fn accept_backup(&mut self, at: DateTime<Utc>, now: Instant) -> bool {
        let restored = self
            .persistence
            .accept_backup(at, &mut self.graph, &mut self.session);
        self.after_update(now);
        restored
    }

    pub fn discard_backup(&mut self) {
        self.persistence.discard_backup();
    }

    pub fn should_show_onboarding(&self) -> bool {
        self.persistence.should_show_onboarding()
    }

    /// Stops every timer. A history capture still waiting on its quiet
    /// period is taken now.
    pub fn teardown(&mut self) {
        self.history.flush_on_teardown(&self.graph);
        self.persistence.teardown();
    }

    fn add_node(&mut self, node_type: NodeType, position: Option<Point>, fields: &NodeFields) -> Node {
        let position = position.unwrap_or_else(|| self.graph.find_free_position(self.canvas_center()));
        let node = self.graph.add_node(node_type, position, fields);
        debug!(node = %node.id, kind = %node_type, "node added");
        node
    }

    fn save(&mut self, now: Instant) {
        match self.persistence.manual_save(&self.graph, &self.session) {
            Ok(_) => self.toast(ToastSlot::Save, ToastKind::Success, "Project saved", now),
            Err(e) => self.toast(ToastSlot::Save, ToastKind::Error, format!("Save failed: {}", e), now),
        }
    }

    fn shortcut(&mut self, shortcut: Shortcut, now: Instant) -> Vec<Effect> {
        let message = match shortcut {
            Shortcut::Save => Message::Save,
            Shortcut::ToggleSearch => Message::SearchToggle,
            Shortcut::Undo => Message::Undo,
            Shortcut::Redo => Message::Redo,
            Shortcut::Export => Message::ExportDocument,
            Shortcut::QuickAdd(node_type) => Message::AddNode {
                node_type,
                position: None,
                fields: NodeFields::default(),
            },
        };
        self.update(message, now)
    }

    fn refresh_search(&mut self) {
        self.search.error = None;
        self.search.results = match NodeQuery::new(&self.search.query, self.search.use_regex) {
            Ok(query) => query.run(&self.graph).into_iter().map(|n| n.id.clone()).collect(),
            Err(e) => {
                self.search.error = Some(e.to_string());
                Vec::new()
            }
        };
    }

    fn file_stem(&self) -> String {
        let name = self.persistence.project_name().trim();
        if name.is_empty() {
            "corkboard".to_string()
        } else {
            name.to_string()
        }
    }

    fn export_document(&mut self, now: Instant) -> Option<Effect> {
        if self.graph.is_empty() {
            self.toast(ToastSlot::General, ToastKind::Info, "Canvas is empty, nothing to export", now);
            return None;
        }
        let contents = export::canvas_markdown(
            self.persistence.project_name(),
            &self.graph,
            &self.session.chat_messages,
        );
        Some(Effect::Download {
            file_name: format!("{}-export.md", self.file_stem()),
            mime: "text/markdown",
            contents,
        })
    }

    fn export_chat(&mut self, now: Instant) -> Option<Effect> {
        if self.session.chat_messages.is_empty() {
            self.toast(ToastSlot::General, ToastKind::Info, "No chat messages to export", now);
            return None;
        }
        Some(Effect::Download {
            file_name: format!("{}-chat.txt", self.file_stem()),
            mime: "text/plain",
            contents: export::chat_transcript(&self.session.chat_messages),
        })
    }

    fn drop_file(&mut self, file: DroppedFile, position: Point) -> Option<Effect> {
        let Some(kind) = file.kind() else {
            debug!(file = %file.name, mime = %file.mime, "ignoring unsupported drop");
            return None;
        };
        match kind {
            DropKind::Image | DropKind::Pdf => {
                let node_type = if kind == DropKind::Image {
                    NodeType::Image
                } else {
                    NodeType::Pdf
                };
                let node = self.add_node(node_type, Some(position), &NodeFields::default());
                self.capabilities.begin_loading(&node.id);
                Some(Effect::Upload {
                    node: node.id,
                    file_name: file.name,
                })
            }
            DropKind::Text | DropKind::Code { .. } => {
                let mut fields = NodeFields::label(file.name.clone())
                    .with_content(file.text.clone().unwrap_or_default());
                let node_type = match kind {
                    DropKind::Code { language } => {
                        fields.language = Some(language);
                        NodeType::Code
                    }
                    _ => NodeType::Text,
                };
                self.add_node(node_type, Some(position), &fields);
                None
            }
        }
    }

    fn send_chat(&mut self, text: String, origin: Option<NodeId>, web_search: bool) -> Option<Effect> {
        let text = text.trim().to_string();
        if text.is_empty() || self.chat_pending {
            return None;
        }
        self.session.chat_messages.push(ChatMessage::user(text));
        self.chat_pending = true;
        self.chat_origin = origin;
        Some(Effect::Chat {
            messages: self.session.chat_messages.clone(),
            context: CanvasContext::build(&self.graph),
            voice_tone: self.session.voice_tone_settings.clone(),
            web_search,
        })
    }

    fn chat_replied(&mut self, result: Result<String, String>, now: Instant) {
        self.chat_pending = false;
        let origin = self.chat_origin.take();
        match result {
            Ok(text) => {
                let reply = chat::parse_reply(&text);
                self.session.chat_messages.push(ChatMessage::assistant(reply.message));
                if let Some(creation) = reply.create_node {
                    let fallback = self.graph.find_free_position(self.canvas_center());
                    chat::apply_creation(&mut self.graph, &creation, origin.as_ref(), fallback);
                }
            }
            Err(e) => {
                warn!("chat failed: {}", e);
                self.toast(ToastSlot::General, ToastKind::Error, format!("Chat failed: {}", e), now);
            }
        }
    }

    fn generate_notes(&mut self, node: NodeId) -> Option<Effect> {
        if !self.supports(&node, Capability::GenerateNotes) || self.capabilities.status(&node).generating {
            return None;
        }
        let fields = self.graph.node(&node)?.data.fields();
        let transcript = fields.transcript.unwrap_or_default();
        if transcript.trim().chars().count() < MIN_TRANSCRIPT_CHARS {
            return None;
        }
        let cut = transcript.char_indices().nth(MAX_TRANSCRIPT_CHARS).map(|(i, _)| i);
        let trimmed = match cut {
            Some(cut) => format!("{}\n\n[Transcript truncated...]", &transcript[..cut]),
            None => transcript,
        };
        let about = fields
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\" ", t))
            .unwrap_or_default();
        let prompt = format!(
            "Generate structured notes from this {}transcript: an overview, key takeaways, detailed notes by topic and action items.\n\nTranscript:\n{}",
            about, trimmed
        );
        self.capabilities.set_generating(&node, true);
        Some(Effect::GenerateNotes { node, prompt })
    }

    fn notes_generated(&mut self, source: NodeId, result: Result<String, String>, now: Instant) {
        // Late result for a node deleted meanwhile
        let Some(src) = self.graph.node(&source).cloned() else {
            return;
        };
        self.capabilities.set_generating(&source, false);
        match result {
            Ok(content) => {
                let label = match src.data.fields().title.filter(|t| !t.is_empty()) {
                    Some(title) => format!("Notes: {}", title),
                    None => "AI Notes".to_string(),
                };
                let mut notes = Node::new(NodeType::Text, chat::spawn_beside(&self.graph, &src));
                notes.size = NOTES_SIZE;
                notes.data.merge(&NodeFields::label(label).with_content(content));
                let notes_id = notes.id.clone();
                self.graph.insert_node(notes);
                self.graph
                    .push_edge(EdgeId::between(&source, &notes_id), &source, &notes_id);
                info!(source = %source, notes = %notes_id, "notes generated");
            }
            Err(e) => {
                self.capabilities.fail(&source, e.clone());
                self.toast(
                    ToastSlot::General,
                    ToastKind::Error,
                    format!("Failed to generate notes: {}", e),
                    now,
                );
            }
        }
    }

    fn resolved(&mut self, node: NodeId, result: Result<NodeFields, String>, now: Instant) {
        if self.graph.node(&node).is_none() {
            debug!(node = %node, "dropping result for removed node");
            return;
        }
        match result {
            Ok(fields) => {
                self.graph.update_node_data(&node, &fields);
                self.capabilities.finish_loading(&node);
            }
            Err(e) => {
                warn!(node = %node, "collaborator failed: {}", e);
                self.capabilities.fail(&node, e.clone());
                self.toast(ToastSlot::General, ToastKind::Error, e, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::MemoryStorage;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn controller(now: Instant) -> Controller {
        let settings = Settings::default();
        let persistence = PersistenceCoordinator::new(
            Box::new(MemoryStore::default()),
            Box::new(MemoryStorage::new()),
            &settings,
        );
        Controller::new(settings, persistence, now)
    }

    fn add(c: &mut Controller, node_type: NodeType, at: Point, label: &str, now: Instant) -> NodeId {
        c.update(
            Message::AddNode {
                node_type,
                position: Some(at),
                fields: NodeFields::label(label),
            },
            now,
        );
        c.graph().nodes().iter().find(|n| n.label() == label).unwrap().id.clone()
    }

    #[test]
    fn shortcuts_map_like_the_toolbar() {
        assert_eq!(Shortcut::from_key(&KeyPress::ctrl('s')), Some(Shortcut::Save));
        assert_eq!(Shortcut::from_key(&KeyPress::ctrl_shift('Z')), Some(Shortcut::Redo));
        assert_eq!(Shortcut::from_key(&KeyPress::ctrl('z')), Some(Shortcut::Undo));
        assert_eq!(
            Shortcut::from_key(&KeyPress::bare('0')),
            Some(Shortcut::QuickAdd(NodeType::Group))
        );
        // Digits with a modifier, or typed into a field, are not shortcuts
        assert_eq!(Shortcut::from_key(&KeyPress::ctrl('1')), None);
        let typing = KeyPress {
            in_text_field: true,
            ..KeyPress::bare('1')
        };
        assert_eq!(Shortcut::from_key(&typing), None);
    }

    #[test]
    fn quick_add_places_node_at_screen_center() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        c.update(Message::Key(KeyPress::bare('8')), t0);
        let node = &c.graph().nodes()[0];
        assert_eq!(node.node_type(), NodeType::Sticky);
        assert_eq!(node.position, Point::new(600.0, 400.0));

        // A second one cascades off the first
        c.update(Message::Key(KeyPress::bare('8')), t0);
        assert_eq!(c.graph().nodes()[1].position, Point::new(630.0, 430.0));
    }

    #[test]
    fn edits_are_undoable_after_quiet_period() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        c.tick(t0 + Duration::from_millis(1000));
        assert_eq!(c.history().len(), 1);

        add(&mut c, NodeType::Text, Point::ORIGIN, "A", t0 + Duration::from_millis(1100));
        c.tick(t0 + Duration::from_millis(2200));
        assert_eq!(c.history().len(), 2);
        assert!(c.history().can_undo());

        c.update(Message::Undo, t0 + Duration::from_millis(3000));
        assert!(c.graph().is_empty());
        assert!(!c.history().can_undo());
        // The undo's own change is not captured
        c.tick(t0 + Duration::from_millis(5000));
        assert_eq!(c.history().len(), 2);

        c.update(Message::Redo, t0 + Duration::from_millis(6000));
        assert_eq!(c.graph().nodes().len(), 1);
    }

    #[test]
    fn drag_into_group_highlights_then_commits() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let g = add(&mut c, NodeType::Group, Point::ORIGIN, "Research", t0);
        let a = add(&mut c, NodeType::Text, Point::new(900.0, 900.0), "A", t0);

        c.update(
            Message::Drag {
                node: a.clone(),
                position: Point::new(40.0, 60.0),
            },
            t0,
        );
        assert_eq!(c.drop_target(), Some(&g));

        c.update(Message::DragStop(a.clone()), t0);
        assert_eq!(c.drop_target(), None);
        assert_eq!(c.graph().node(&a).unwrap().parent_id.as_ref(), Some(&g));
        let toast = c.toasts().get(ToastSlot::Group).unwrap();
        assert_eq!(toast.message, "\"A\" added to \"Research\"");

        c.tick(t0 + Duration::from_millis(2600));
        assert!(c.toasts().get(ToastSlot::Group).is_none());
    }

    #[test]
    fn upload_round_trip_clears_loading() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let effects = c.update(
            Message::FileDropped {
                file: DroppedFile {
                    name: "cat.png".into(),
                    mime: "image/png".into(),
                    text: None,
                },
                position: Point::new(10.0, 10.0),
            },
            t0,
        );
        let Some(Effect::Upload { node, file_name }) = effects.first().cloned() else {
            panic!("expected upload effect, got {:?}", effects);
        };
        assert_eq!(file_name, "cat.png");
        assert!(c.status(&node).loading);

        c.update(
            Message::Resolved {
                node: node.clone(),
                result: Ok(NodeFields {
                    image_url: Some("/uploads/cat.png".into()),
                    filename: Some("cat.png".into()),
                    ..Default::default()
                }),
            },
            t0,
        );
        assert_eq!(c.status(&node), NodeStatus::default());
        let fields = c.graph().node(&node).unwrap().data.fields();
        assert_eq!(fields.image_url.as_deref(), Some("/uploads/cat.png"));
    }

    #[test]
    fn image_generation_loads_until_resolved() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let image = add(&mut c, NodeType::Image, Point::ORIGIN, "Pic", t0);
        let note = add(&mut c, NodeType::Text, Point::new(300.0, 0.0), "Note", t0);

        let blank = Message::GenerateImage {
            node: image.clone(),
            prompt: "   ".into(),
        };
        assert!(c.update(blank, t0).is_empty());
        let wrong_type = Message::GenerateImage {
            node: note.clone(),
            prompt: "a cat".into(),
        };
        assert!(c.update(wrong_type, t0).is_empty());
        assert!(!c.status(&note).loading);

        let effects = c.update(
            Message::GenerateImage {
                node: image.clone(),
                prompt: " a cat ".into(),
            },
            t0,
        );
        assert_eq!(
            effects,
            vec![Effect::GenerateImage {
                node: image.clone(),
                prompt: "a cat".into(),
            }]
        );
        assert!(c.status(&image).loading);

        c.update(
            Message::Resolved {
                node: image.clone(),
                result: Ok(NodeFields {
                    image_url: Some("/generated/cat.png".into()),
                    ..Default::default()
                }),
            },
            t0,
        );
        assert!(!c.status(&image).loading);
        let fields = c.graph().node(&image).unwrap().data.fields();
        assert_eq!(fields.image_url.as_deref(), Some("/generated/cat.png"));
    }

    #[test]
    fn failed_scrape_records_error_without_touching_graph() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let web = add(&mut c, NodeType::Web, Point::ORIGIN, "Site", t0);
        let before = c.graph().node(&web).cloned();
        let effects = c.update(
            Message::SubmitUrl {
                node: web.clone(),
                url: "https://example.com".into(),
            },
            t0,
        );
        assert_eq!(effects.len(), 1);
        c.update(
            Message::Resolved {
                node: web.clone(),
                result: Err("403".into()),
            },
            t0,
        );
        assert_eq!(c.status(&web).error.as_deref(), Some("403"));
        assert!(!c.status(&web).loading);
        assert_eq!(c.graph().node(&web).cloned(), before);

        c.update(Message::DismissError(web.clone()), t0);
        assert_eq!(c.status(&web), NodeStatus::default());
    }

    #[test]
    fn dropped_code_file_records_language() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let effects = c.update(
            Message::FileDropped {
                file: DroppedFile {
                    name: "main.RS".into(),
                    mime: String::new(),
                    text: Some("fn main() {}".into()),
                },
                position: Point::ORIGIN,
            },
            t0,
        );
        assert!(effects.is_empty());
        let fields = c.graph().nodes()[0].data.fields();
        assert_eq!(c.graph().nodes()[0].node_type(), NodeType::Code);
        assert_eq!(fields.language.as_deref(), Some("rs"));
        assert_eq!(fields.content.as_deref(), Some("fn main() {}"));
    }

    #[test]
    fn chat_reply_can_create_connected_node() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let idea = add(&mut c, NodeType::Text, Point::ORIGIN, "Idea", t0);
        let effects = c.update(
            Message::AiAction {
                node: idea.clone(),
                prompt: "expand this".into(),
                web_search: false,
            },
            t0,
        );
        assert!(matches!(effects.as_slice(), [Effect::Chat { .. }]));
        assert!(c.chat_pending());

        let reply = "Sure.\n```__CREATE_NODE__\n{\"type\":\"text\",\"label\":\"More\",\"content\":\"...\"}\n```";
        c.update(Message::ChatReplied(Ok(reply.into())), t0);
        assert!(!c.chat_pending());
        assert_eq!(c.session().chat_messages.last().unwrap().content, "Sure.");
        let more = c.graph().nodes().iter().find(|n| n.label() == "More").unwrap();
        assert_eq!(c.graph().edges()[0].source, idea);
        assert_eq!(c.graph().edges()[0].target, more.id);
    }

    #[test]
    fn web_search_flag_reaches_chat_request() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let effects = c.update(
            Message::SendChat {
                text: "latest rust release?".into(),
                web_search: true,
            },
            t0,
        );
        let [Effect::Chat { messages, web_search, .. }] = effects.as_slice() else {
            panic!("expected chat effect, got {:?}", effects);
        };
        assert!(*web_search);
        assert_eq!(messages.last().unwrap().content, "latest rust release?");

        c.update(Message::ChatReplied(Ok("1.90".into())), t0);
        let effects = c.update(
            Message::SendChat {
                text: "thanks".into(),
                web_search: false,
            },
            t0,
        );
        assert!(matches!(effects.as_slice(), [Effect::Chat { web_search: false, .. }]));
    }

    #[test]
    fn generated_notes_sit_right_of_source() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let video = add(&mut c, NodeType::YouTube, Point::new(100.0, 100.0), "Talk", t0);
        c.update(
            Message::UpdateNodeData {
                node: video.clone(),
                patch: NodeFields {
                    title: Some("Rust talk".into()),
                    transcript: Some("a long enough transcript for notes".into()),
                    ..Default::default()
                },
            },
            t0,
        );
        let effects = c.update(Message::GenerateNotes(video.clone()), t0);
        assert_eq!(effects.len(), 1);
        assert!(c.status(&video).generating);

        c.update(
            Message::NotesGenerated {
                node: video.clone(),
                result: Ok("<h2>Overview</h2>".into()),
            },
            t0,
        );
        assert!(!c.status(&video).generating);
        let notes = c.graph().nodes().iter().find(|n| n.label() == "Notes: Rust talk").unwrap();
        assert_eq!(notes.size, NOTES_SIZE);
        assert_eq!(notes.position, Point::new(100.0 + 320.0 + 40.0, 100.0));
        assert_eq!(c.graph().edges()[0].id, EdgeId::between(&video, &notes.id));
    }

    #[test]
    fn short_transcript_generates_nothing() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let video = add(&mut c, NodeType::YouTube, Point::ORIGIN, "Clip", t0);
        assert!(c.update(Message::GenerateNotes(video), t0).is_empty());
    }

    #[test]
    fn search_commit_centers_first_hit() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        add(&mut c, NodeType::Sticky, Point::new(1000.0, 1000.0), "needle", t0);
        c.update(Message::SearchToggle, t0);
        c.update(Message::SearchInput { text: "NEED".into() }, t0);
        assert_eq!(c.search_results().len(), 1);
        c.update(Message::SearchCommit, t0);
        assert!(!c.search_open());
        let vp = c.session().viewport;
        assert_eq!(vp.zoom, search::FOCUS_ZOOM);
        // Node center (1100, 1090) lands on screen center (600, 400)
        assert!((vp.x + 1100.0 * vp.zoom - 600.0).abs() < 1e-9);
        assert!((vp.y + 1090.0 * vp.zoom - 400.0).abs() < 1e-9);
    }

    #[test]
    fn save_toasts_and_backup_round_trip() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        add(&mut c, NodeType::Text, Point::ORIGIN, "A", t0);
        c.update(Message::Save, t0);
        assert_eq!(c.toasts().get(ToastSlot::Save).unwrap().kind, ToastKind::Success);
        assert!(c.persistence().project_id().is_some());

        let at = Utc::now();
        assert!(c.unload(at));
        assert!(c.pending_backup(at).is_some());
        c.discard_backup();
        assert!(c.pending_backup(at).is_none());
    }

    #[test]
    fn autosave_waits_for_quiet_after_last_edit() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        add(&mut c, NodeType::Text, Point::ORIGIN, "A", t0 + Duration::from_secs(14));

        c.tick(t0 + Duration::from_secs(15));
        assert_eq!(c.persistence().project_id(), None);

        c.tick(t0 + Duration::from_secs(29));
        assert!(c.persistence().project_id().is_some());
    }

    #[test]
    fn rename_pushes_autosave_back() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        add(&mut c, NodeType::Text, Point::ORIGIN, "A", t0);
        c.update(Message::Rename("Plans".into()), t0 + Duration::from_secs(10));

        c.tick(t0 + Duration::from_secs(16));
        assert_eq!(c.persistence().project_id(), None);
        c.tick(t0 + Duration::from_secs(25));
        assert!(c.persistence().project_id().is_some());
    }

    #[test]
    fn export_of_empty_canvas_only_toasts() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        assert!(c.update(Message::Key(KeyPress::ctrl('e')), t0).is_empty());
        assert_eq!(c.toasts().get(ToastSlot::General).unwrap().kind, ToastKind::Info);
    }

    #[test]
    fn layout_keeps_group_membership() {
        let t0 = Instant::now();
        let mut c = controller(t0);
        let g = add(&mut c, NodeType::Group, Point::ORIGIN, "G", t0);
        let a = add(&mut c, NodeType::Text, Point::new(100.0, 100.0), "A", t0);
        c.update(Message::DragStop(a.clone()), t0);
        assert_eq!(c.graph().node(&a).unwrap().parent_id.as_ref(), Some(&g));

        let effects = c.update(Message::AutoLayout(LayoutKind::Grid), t0);
        assert_eq!(effects, vec![Effect::FitView]);
        let graph = c.graph();
        let node = graph.node(&a).unwrap();
        assert_eq!(node.parent_id.as_ref(), Some(&g));
        let expected = crate::layout::grid(graph.nodes(), c.canvas_center());
        let abs = graph.absolute_position(node);
        assert_eq!(expected.iter().find(|(id, _)| id == &a).unwrap().1, abs);
    }
}
