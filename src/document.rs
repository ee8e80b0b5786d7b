//! Persisted shapes: the project document, its version listing and the
//! emergency backup record. Field names follow the JSON wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::{Edge, Node};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Writing-voice preferences handed to the chat service untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceToneSettings {
    pub preset: Vec<String>,
    pub custom_description: String,
    pub writing_samples: String,
}

impl VoiceToneSettings {
    pub fn is_active(&self) -> bool {
        !self.preset.is_empty()
            || !self.custom_description.trim().is_empty()
            || !self.writing_samples.trim().is_empty()
    }
}

/// The persisted unit. `id` is `None` until the backend assigns one on the
/// first save; the timestamps are owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub chat_messages: Vec<ChatMessage>,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub voice_tone_settings: VoiceToneSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProjectDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            chat_messages: Vec::new(),
            viewport: Viewport::default(),
            voice_tone_settings: VoiceToneSettings::default(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One entry of a project's version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Save time in epoch milliseconds; unique and increasing per project.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub name: String,
}

impl VersionInfo {
    pub fn describe(id: u64, document: &ProjectDocument) -> Self {
        let timestamp = DateTime::from_timestamp_millis(id as i64).unwrap_or_default();
        Self {
            id,
            timestamp,
            node_count: document.nodes.len(),
            edge_count: document.edges.len(),
            name: document.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub node_count: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProjectSummary {
    pub fn describe(id: impl Into<String>, document: &ProjectDocument) -> Self {
        Self {
            id: id.into(),
            name: document.name.clone(),
            node_count: document.nodes.len(),
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

/// Unload-time copy of the canvas kept in the local backup slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyBackup {
    #[serde(flatten)]
    pub document: ProjectDocument,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::node::NodeType;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_fields_take_defaults() {
        let doc: ProjectDocument = serde_json::from_str(r#"{"name": "Old"}"#).unwrap();
        assert_eq!(doc.id, None);
        assert_eq!(doc.viewport, Viewport::default());
        assert!(doc.chat_messages.is_empty());
        assert!(!doc.voice_tone_settings.is_active());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let mut doc = ProjectDocument::new("Draft");
        doc.chat_messages.push(ChatMessage::user("hi"));
        doc.voice_tone_settings.custom_description = "dry".into();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["chatMessages"][0]["role"], "user");
        assert_eq!(json["voiceToneSettings"]["customDescription"], "dry");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn backup_is_flat_document_plus_timestamp() {
        let mut doc = ProjectDocument::new("Scratch");
        doc.id = Some("p1".into());
        doc.nodes.push(Node::new(NodeType::Sticky, Point::new(5.0, 5.0)));
        let backup = EmergencyBackup {
            document: doc,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&backup).unwrap();
        assert_eq!(json["id"], "p1");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["nodes"].as_array().unwrap().len(), 1);

        let back: EmergencyBackup = serde_json::from_value(json).unwrap();
        assert_eq!(back, backup);
    }

    #[test]
    fn version_info_counts() {
        let mut doc = ProjectDocument::new("v");
        doc.nodes.push(Node::new(NodeType::Text, Point::ORIGIN));
        let info = VersionInfo::describe(1_700_000_000_000, &doc);
        assert_eq!(info.node_count, 1);
        assert_eq!(info.edge_count, 0);
        assert_eq!(info.timestamp.timestamp_millis(), 1_700_000_000_000);
    }
}
