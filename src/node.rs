use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::geometry::{Point, Rect, Size};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Id used for edges the engine derives from a source/target pair.
    pub fn between(source: &NodeId, target: &NodeId) -> Self {
        Self(format!("e-{}-{}", source, target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Text,
    Image,
    Pdf,
    #[serde(rename = "youtube")]
    YouTube,
    Voice,
    Web,
    Code,
    Sticky,
    Embed,
    Group,
}

impl NodeType {
    pub const ALL: [NodeType; 10] = [
        NodeType::Text,
        NodeType::Image,
        NodeType::Pdf,
        NodeType::YouTube,
        NodeType::Voice,
        NodeType::Web,
        NodeType::Code,
        NodeType::Sticky,
        NodeType::Embed,
        NodeType::Group,
    ];

    pub fn default_size(self) -> Size {
        match self {
            NodeType::Text => Size::new(320.0, 280.0),
            NodeType::Image => Size::new(320.0, 320.0),
            NodeType::Pdf => Size::new(320.0, 300.0),
            NodeType::YouTube => Size::new(320.0, 360.0),
            NodeType::Voice => Size::new(320.0, 260.0),
            NodeType::Web => Size::new(320.0, 300.0),
            NodeType::Code => Size::new(380.0, 320.0),
            NodeType::Sticky => Size::new(200.0, 180.0),
            NodeType::Embed => Size::new(420.0, 380.0),
            NodeType::Group => Size::new(500.0, 400.0),
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            NodeType::Text => "Text Note",
            NodeType::Image => "Image",
            NodeType::Pdf => "PDF Document",
            NodeType::YouTube => "YouTube Video",
            NodeType::Voice => "Voice Note",
            NodeType::Web => "Web Page",
            NodeType::Code => "Code",
            NodeType::Sticky => "Sticky Note",
            NodeType::Embed => "Embed",
            NodeType::Group => "Group",
        }
    }

    /// Toolbar digit shortcut: 1..9 map to the content types in order, 0 is a group.
    pub fn from_digit(digit: char) -> Option<NodeType> {
        match digit {
            '0' => Some(NodeType::Group),
            '1'..='9' => {
                let idx = digit as usize - '1' as usize;
                Some(Self::ALL[idx])
            }
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Text => "text",
            NodeType::Image => "image",
            NodeType::Pdf => "pdf",
            NodeType::YouTube => "youtube",
            NodeType::Voice => "voice",
            NodeType::Web => "web",
            NodeType::Code => "code",
            NodeType::Sticky => "sticky",
            NodeType::Embed => "embed",
            NodeType::Group => "group",
        }
    }

    /// Parses the lowercase wire name, as found in chat instructions.
    pub fn parse(name: &str) -> Option<NodeType> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdfData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YouTubeData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StickyData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupData {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Type-specific content of a node. Only persistent content lives here;
/// loading flags and handlers are tracked by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Text(TextData),
    Image(ImageData),
    Pdf(PdfData),
    YouTube(YouTubeData),
    Voice(VoiceData),
    Web(WebData),
    Code(CodeData),
    Sticky(StickyData),
    Embed(EmbedData),
    Group(GroupData),
}

impl NodeData {
    /// Empty content for `node_type` carrying its default label.
    pub fn new(node_type: NodeType) -> Self {
        let label = node_type.default_label().to_string();
        match node_type {
            NodeType::Text => NodeData::Text(TextData { label, ..Default::default() }),
            NodeType::Image => NodeData::Image(ImageData { label, ..Default::default() }),
            NodeType::Pdf => NodeData::Pdf(PdfData { label, ..Default::default() }),
            NodeType::YouTube => NodeData::YouTube(YouTubeData { label, ..Default::default() }),
            NodeType::Voice => NodeData::Voice(VoiceData { label, ..Default::default() }),
            NodeType::Web => NodeData::Web(WebData { label, ..Default::default() }),
            NodeType::Code => NodeData::Code(CodeData { label, ..Default::default() }),
            NodeType::Sticky => NodeData::Sticky(StickyData { label, ..Default::default() }),
            NodeType::Embed => NodeData::Embed(EmbedData { label, ..Default::default() }),
            NodeType::Group => NodeData::Group(GroupData { label, ..Default::default() }),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeData::Text(_) => NodeType::Text,
            NodeData::Image(_) => NodeType::Image,
            NodeData::Pdf(_) => NodeType::Pdf,
            NodeData::YouTube(_) => NodeType::YouTube,
            NodeData::Voice(_) => NodeType::Voice,
            NodeData::Web(_) => NodeType::Web,
            NodeData::Code(_) => NodeType::Code,
            NodeData::Sticky(_) => NodeType::Sticky,
            NodeData::Embed(_) => NodeType::Embed,
            NodeData::Group(_) => NodeType::Group,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NodeData::Text(d) => &d.label,
            NodeData::Image(d) => &d.label,
            NodeData::Pdf(d) => &d.label,
            NodeData::YouTube(d) => &d.label,
            NodeData::Voice(d) => &d.label,
            NodeData::Web(d) => &d.label,
            NodeData::Code(d) => &d.label,
            NodeData::Sticky(d) => &d.label,
            NodeData::Embed(d) => &d.label,
            NodeData::Group(d) => &d.label,
        }
    }

    fn label_mut(&mut self) -> &mut String {
        match self {
            NodeData::Text(d) => &mut d.label,
            NodeData::Image(d) => &mut d.label,
            NodeData::Pdf(d) => &mut d.label,
            NodeData::YouTube(d) => &mut d.label,
            NodeData::Voice(d) => &mut d.label,
            NodeData::Web(d) => &mut d.label,
            NodeData::Code(d) => &mut d.label,
            NodeData::Sticky(d) => &mut d.label,
            NodeData::Embed(d) => &mut d.label,
            NodeData::Group(d) => &mut d.label,
        }
    }

    /// Flattened view of every content field this variant carries.
    pub fn fields(&self) -> NodeFields {
        let mut f = NodeFields {
            label: Some(self.label().to_string()),
            ..Default::default()
        };
        match self {
            NodeData::Text(d) => {
                f.content = d.content.clone();
            }
            NodeData::Image(d) => {
                f.image_url = d.image_url.clone();
                f.filename = d.filename.clone();
                f.description = d.description.clone();
            }
            NodeData::Pdf(d) => {
                f.filename = d.filename.clone();
                f.parsed_text = d.parsed_text.clone();
                f.page_count = d.page_count;
            }
            NodeData::YouTube(d) => {
                f.url = d.url.clone();
                f.thumbnail = d.thumbnail.clone();
                f.title = d.title.clone();
                f.transcript = d.transcript.clone();
            }
            NodeData::Voice(d) => {
                f.transcript = d.transcript.clone();
            }
            NodeData::Web(d) => {
                f.url = d.url.clone();
                f.title = d.title.clone();
                f.description = d.description.clone();
                f.content = d.content.clone();
                f.favicon = d.favicon.clone();
            }
            NodeData::Code(d) => {
                f.content = d.content.clone();
                f.language = d.language.clone();
            }
            NodeData::Sticky(d) => {
                f.content = d.content.clone();
                f.color = d.color.clone();
            }
            NodeData::Embed(d) => {
                f.url = d.url.clone();
            }
            NodeData::Group(d) => {
                f.color = d.color.clone();
            }
        }
        f
    }

    /// Shallow merge: every `Some` field the variant carries overwrites the
    /// current value. Fields the variant has no slot for are ignored.
    pub fn merge(&mut self, patch: &NodeFields) {
        if let Some(label) = &patch.label {
            *self.label_mut() = label.clone();
        }
        match self {
            NodeData::Text(d) => {
                set(&mut d.content, &patch.content);
            }
            NodeData::Image(d) => {
                set(&mut d.image_url, &patch.image_url);
                set(&mut d.filename, &patch.filename);
                set(&mut d.description, &patch.description);
            }
            NodeData::Pdf(d) => {
                set(&mut d.filename, &patch.filename);
                set(&mut d.parsed_text, &patch.parsed_text);
                if patch.page_count.is_some() {
                    d.page_count = patch.page_count;
                }
            }
            NodeData::YouTube(d) => {
                set(&mut d.url, &patch.url);
                set(&mut d.thumbnail, &patch.thumbnail);
                set(&mut d.title, &patch.title);
                set(&mut d.transcript, &patch.transcript);
            }
            NodeData::Voice(d) => {
                set(&mut d.transcript, &patch.transcript);
            }
            NodeData::Web(d) => {
                set(&mut d.url, &patch.url);
                set(&mut d.title, &patch.title);
                set(&mut d.description, &patch.description);
                set(&mut d.content, &patch.content);
                set(&mut d.favicon, &patch.favicon);
            }
            NodeData::Code(d) => {
                set(&mut d.content, &patch.content);
                set(&mut d.language, &patch.language);
            }
            NodeData::Sticky(d) => {
                set(&mut d.content, &patch.content);
                set(&mut d.color, &patch.color);
            }
            NodeData::Embed(d) => {
                set(&mut d.url, &patch.url);
            }
            NodeData::Group(d) => {
                set(&mut d.color, &patch.color);
            }
        }
    }

    fn from_value(node_type: NodeType, value: serde_json::Value) -> serde_json::Result<Self> {
        // A null/missing bag is treated as empty content
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };
        Ok(match node_type {
            NodeType::Text => NodeData::Text(serde_json::from_value(value)?),
            NodeType::Image => NodeData::Image(serde_json::from_value(value)?),
            NodeType::Pdf => NodeData::Pdf(serde_json::from_value(value)?),
            NodeType::YouTube => NodeData::YouTube(serde_json::from_value(value)?),
            NodeType::Voice => NodeData::Voice(serde_json::from_value(value)?),
            NodeType::Web => NodeData::Web(serde_json::from_value(value)?),
            NodeType::Code => NodeData::Code(serde_json::from_value(value)?),
            NodeType::Sticky => NodeData::Sticky(serde_json::from_value(value)?),
            NodeType::Embed => NodeData::Embed(serde_json::from_value(value)?),
            NodeType::Group => NodeData::Group(serde_json::from_value(value)?),
        })
    }
}

impl Serialize for NodeData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeData::Text(d) => d.serialize(serializer),
            NodeData::Image(d) => d.serialize(serializer),
            NodeData::Pdf(d) => d.serialize(serializer),
            NodeData::YouTube(d) => d.serialize(serializer),
            NodeData::Voice(d) => d.serialize(serializer),
            NodeData::Web(d) => d.serialize(serializer),
            NodeData::Code(d) => d.serialize(serializer),
            NodeData::Sticky(d) => d.serialize(serializer),
            NodeData::Embed(d) => d.serialize(serializer),
            NodeData::Group(d) => d.serialize(serializer),
        }
    }
}

fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}

/// Flat record of every content field any node type can carry. Used both
/// as a read view over `NodeData` and as a partial update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeFields {
    pub label: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon: Option<String>,
    pub thumbnail: Option<String>,
    pub transcript: Option<String>,
    pub image_url: Option<String>,
    pub filename: Option<String>,
    pub parsed_text: Option<String>,
    pub page_count: Option<u32>,
    pub language: Option<String>,
    pub color: Option<String>,
}

impl NodeFields {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

/// A content card on the canvas.
///
/// `position` is absolute when `parent_id` is `None`, otherwise relative to
/// the parent group's origin. Groups never have a parent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawNode")]
pub struct Node {
    pub id: NodeId,
    pub position: Point,
    pub size: Size,
    pub parent_id: Option<NodeId>,
    pub data: NodeData,
    pub locked: bool,
    pub z_index: i32,
}

impl Node {
    pub fn new(node_type: NodeType, position: Point) -> Self {
        Self {
            id: NodeId::new(),
            position,
            size: node_type.default_size(),
            parent_id: None,
            data: NodeData::new(node_type),
            locked: false,
            z_index: if node_type == NodeType::Group { -1 } else { 0 },
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.data.node_type()
    }

    pub fn is_group(&self) -> bool {
        matches!(self.data, NodeData::Group(_))
    }

    pub fn label(&self) -> &str {
        self.data.label()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position, self.size)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Node", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.node_type())?;
        state.serialize_field("position", &self.position)?;
        state.serialize_field("size", &self.size)?;
        if let Some(parent) = &self.parent_id {
            state.serialize_field("parentId", parent)?;
        } else {
            state.skip_field("parentId")?;
        }
        state.serialize_field("data", &self.data)?;
        state.serialize_field("locked", &self.locked)?;
        state.serialize_field("zIndex", &self.z_index)?;
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    position: Point,
    #[serde(default)]
    size: Option<Size>,
    #[serde(default)]
    parent_id: Option<NodeId>,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    z_index: Option<i32>,
}

impl TryFrom<RawNode> for Node {
    type Error = serde_json::Error;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let data = NodeData::from_value(raw.node_type, raw.data)?;
        let is_group = raw.node_type == NodeType::Group;
        Ok(Node {
            id: raw.id,
            position: raw.position,
            size: raw.size.unwrap_or_else(|| raw.node_type.default_size()),
            // Groups never nest
            parent_id: if is_group { None } else { raw.parent_id },
            data,
            locked: raw.locked,
            z_index: raw.z_index.unwrap_or(if is_group { -1 } else { 0 }),
        })
    }
}
