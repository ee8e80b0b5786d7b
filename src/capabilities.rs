//! Per-node actions and transient UI status, keyed by node id.
//!
//! Nothing in here is persisted or undone: a node's loading spinner or
//! drop-target highlight lives beside the graph, never inside it.

use std::collections::HashMap;

use crate::graph::GraphStore;
use crate::node::{NodeId, NodeType};

/// Something the UI can ask the controller to do for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Edit,
    Delete,
    ToggleLock,
    AiAction,
    UploadFile,
    SubmitYouTube,
    SubmitUrl,
    GenerateNotes,
    GenerateImage,
}

impl Capability {
    pub fn for_type(node_type: NodeType) -> &'static [Capability] {
        use Capability::*;
        match node_type {
            NodeType::Text | NodeType::Sticky | NodeType::Code | NodeType::Voice => {
                &[Edit, Delete, ToggleLock, AiAction]
            }
            NodeType::Image => &[Edit, Delete, ToggleLock, AiAction, UploadFile, GenerateImage],
            NodeType::Pdf => &[Edit, Delete, ToggleLock, AiAction, UploadFile],
            NodeType::YouTube => &[Edit, Delete, ToggleLock, AiAction, SubmitYouTube, GenerateNotes],
            NodeType::Web => &[Edit, Delete, ToggleLock, AiAction, SubmitUrl],
            NodeType::Embed | NodeType::Group => &[Edit, Delete, ToggleLock],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStatus {
    pub loading: bool,
    pub generating: bool,
    pub error: Option<String>,
}

impl NodeStatus {
    fn is_idle(&self) -> bool {
        !self.loading && !self.generating && self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct Capabilities {
    status: HashMap<NodeId, NodeStatus>,
    drop_target: Option<NodeId>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` exists and its type offers `capability`. Locked nodes
    /// only offer unlocking.
    pub fn supports(&self, graph: &GraphStore, id: &NodeId, capability: Capability) -> bool {
        let Some(node) = graph.node(id) else {
            return false;
        };
        if node.locked && capability != Capability::ToggleLock {
            return false;
        }
        Capability::for_type(node.node_type()).contains(&capability)
    }

    pub fn status(&self, id: &NodeId) -> NodeStatus {
        self.status.get(id).cloned().unwrap_or_default()
    }

    fn update(&mut self, id: &NodeId, f: impl FnOnce(&mut NodeStatus)) {
        let entry = self.status.entry(id.clone()).or_default();
        f(entry);
        if entry.is_idle() {
            self.status.remove(id);
        }
    }

    /// Marks a collaborator call as started; clears any earlier error.
    pub fn begin_loading(&mut self, id: &NodeId) {
        self.update(id, |s| {
            s.loading = true;
            s.error = None;
        });
    }

    pub fn finish_loading(&mut self, id: &NodeId) {
        self.update(id, |s| s.loading = false);
    }

    pub fn fail(&mut self, id: &NodeId, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |s| {
            s.loading = false;
            s.generating = false;
            s.error = Some(message);
        });
    }

    pub fn set_generating(&mut self, id: &NodeId, generating: bool) {
        self.update(id, |s| s.generating = generating);
    }

    pub fn clear_error(&mut self, id: &NodeId) {
        self.update(id, |s| s.error = None);
    }

    pub fn drop_target(&self) -> Option<&NodeId> {
        self.drop_target.as_ref()
    }

    pub fn set_drop_target(&mut self, group: Option<NodeId>) {
        self.drop_target = group;
    }

    /// Forgets status for nodes no longer in the graph. Late results for
    /// them become no-ops.
    pub fn retain_existing(&mut self, graph: &GraphStore) {
        self.status.retain(|id, _| graph.node(id).is_some());
        if self.drop_target.as_ref().is_some_and(|g| !graph.is_group(g)) {
            self.drop_target = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::node::NodeFields;

    #[test]
    fn status_lifecycle() {
        let mut caps = Capabilities::new();
        let id = NodeId::from("n1");
        caps.begin_loading(&id);
        assert!(caps.status(&id).loading);
        caps.fail(&id, "timeout");
        assert_eq!(
            caps.status(&id),
            NodeStatus {
                loading: false,
                generating: false,
                error: Some("timeout".into())
            }
        );
        caps.begin_loading(&id);
        caps.finish_loading(&id);
        assert_eq!(caps.status(&id), NodeStatus::default());
    }

    #[test]
    fn locked_nodes_only_unlock() {
        let mut graph = GraphStore::new();
        let n = graph.add_node(NodeType::YouTube, Point::ORIGIN, &NodeFields::default());
        let caps = Capabilities::new();
        assert!(caps.supports(&graph, &n.id, Capability::GenerateNotes));
        assert!(!caps.supports(&graph, &n.id, Capability::SubmitUrl));
        graph.toggle_lock(&n.id);
        assert!(!caps.supports(&graph, &n.id, Capability::GenerateNotes));
        assert!(caps.supports(&graph, &n.id, Capability::ToggleLock));
    }

    #[test]
    fn deleted_nodes_are_forgotten() {
        let mut graph = GraphStore::new();
        let n = graph.add_node(NodeType::Image, Point::ORIGIN, &NodeFields::default());
        let mut caps = Capabilities::new();
        caps.begin_loading(&n.id);
        graph.delete_node(&n.id);
        caps.retain_existing(&graph);
        assert!(!caps.status(&n.id).loading);
    }
}
