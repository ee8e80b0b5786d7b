//! What the chat service sees of the canvas, and the node-creation block it
//! may append to a reply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::Point;
use crate::graph::GraphStore;
use crate::node::{EdgeId, Node, NodeFields, NodeId, NodeType};

const CREATE_MARKER: &str = "```__CREATE_NODE__";
const FENCE: &str = "```";
const GENERATED_LABEL: &str = "AI Generated";
/// Horizontal gap between an originating node and a node created from it.
const SPAWN_GAP: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(flatten)]
    pub fields: NodeFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextGroup {
    pub id: NodeId,
    pub label: String,
}

/// A connection as the model reads it: labels, not ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CanvasContext {
    pub nodes: Vec<ContextNode>,
    pub groups: Vec<ContextGroup>,
    pub edges: Vec<ContextEdge>,
}

impl CanvasContext {
    /// Non-group nodes with their group's label, the groups themselves, and
    /// every edge as a label pair (falling back to the id for unlabeled
    /// nodes).
    pub fn build(graph: &GraphStore) -> Self {
        let labels: HashMap<&NodeId, &str> = graph
            .nodes()
            .iter()
            .map(|n| (&n.id, n.label()))
            .collect();
        let name_of = |id: &NodeId| -> String {
            match labels.get(id) {
                Some(label) if !label.is_empty() => label.to_string(),
                _ => id.to_string(),
            }
        };

        let groups = graph
            .nodes()
            .iter()
            .filter(|n| n.is_group())
            .map(|g| ContextGroup {
                id: g.id.clone(),
                label: g.label().to_string(),
            })
            .collect();

        let nodes = graph
            .nodes()
            .iter()
            .filter(|n| !n.is_group())
            .map(|n| ContextNode {
                id: n.id.clone(),
                node_type: n.node_type(),
                fields: n.data.fields(),
                group_id: n.parent_id.clone(),
                group_label: n
                    .parent_id
                    .as_ref()
                    .and_then(|p| labels.get(p))
                    .map(|l| l.to_string()),
            })
            .collect();

        let edges = graph
            .edges()
            .iter()
            .map(|e| ContextEdge {
                from: name_of(&e.source),
                to: name_of(&e.target),
            })
            .collect();

        Self { nodes, groups, edges }
    }
}

/// "Create a node" instruction found at the end of an assistant reply.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct NodeCreation {
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub label: Option<String>,
    pub content: Option<String>,
}

impl NodeCreation {
    /// Unknown or missing types become text notes.
    pub fn resolved_type(&self) -> NodeType {
        self.node_type
            .as_deref()
            .and_then(NodeType::parse)
            .unwrap_or(NodeType::Text)
    }

    pub fn fields(&self) -> NodeFields {
        let label = match self.label.as_deref() {
            Some(l) if !l.trim().is_empty() => l.to_string(),
            _ => GENERATED_LABEL.to_string(),
        };
        NodeFields::label(label).with_content(self.content.clone().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// Reply text without the instruction block.
    pub message: String,
    pub create_node: Option<NodeCreation>,
}

/// Splits a reply into its visible text and an optional creation block.
/// A malformed block leaves the reply untouched.
pub fn parse_reply(text: &str) -> ParsedReply {
    let Some(idx) = text.find(CREATE_MARKER) else {
        return ParsedReply {
            message: text.to_string(),
            create_node: None,
        };
    };
    let body_start = idx + CREATE_MARKER.len();
    let body = match text[body_start..].find(FENCE) {
        Some(end) => &text[body_start..body_start + end],
        None => &text[body_start..],
    };
    match serde_json::from_str::<NodeCreation>(body.trim()) {
        Ok(creation) => ParsedReply {
            message: text[..idx].trim().to_string(),
            create_node: Some(creation),
        },
        Err(e) => {
            warn!("ignoring malformed node creation block: {}", e);
            ParsedReply {
                message: text.to_string(),
                create_node: None,
            }
        }
    }
}

/// Adds the requested node. With an originating node it is placed to that
/// node's right and connected from it; otherwise it lands at `fallback`.
pub fn apply_creation(
    graph: &mut GraphStore,
    creation: &NodeCreation,
    origin: Option<&NodeId>,
    fallback: Point,
) -> Node {
    let source = origin.and_then(|id| graph.node(id)).cloned();
    let position = match &source {
        Some(src) => spawn_beside(graph, src),
        None => graph.find_free_position(fallback),
    };
    let node = graph.add_node(creation.resolved_type(), position, &creation.fields());
    if let Some(src) = source {
        graph.push_edge(EdgeId::between(&src.id, &node.id), &src.id, &node.id);
    }
    debug!(node = %node.id, kind = %node.node_type(), "node created from chat");
    node
}

/// Absolute spot just right of `source`, top-aligned.
pub(crate) fn spawn_beside(graph: &GraphStore, source: &Node) -> Point {
    let abs = graph.absolute_position(source);
    Point::new(abs.x + source.size.width + SPAWN_GAP, abs.y)
}
