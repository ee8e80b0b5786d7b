use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::geometry::Point;
use crate::node::{Edge, EdgeId, Node, NodeFields, NodeId, NodeType};

const CASCADE_OFFSET: f64 = 30.0;
const CASCADE_ATTEMPTS: usize = 20;

/// Canonical node/edge collections of one canvas.
///
/// Every public mutation leaves the store referentially intact: each edge
/// endpoint names an existing node and each `parent_id` names an existing
/// group.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    revision: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut store = Self::new();
        store.set_nodes(nodes);
        store.set_edges(edges);
        store
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bumped on every mutation that changes nodes or edges.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    /// Creates a node of `node_type` at `position` with type defaults, then
    /// merges `extra` over the default content.
    pub fn add_node(&mut self, node_type: NodeType, position: Point, extra: &NodeFields) -> Node {
        let mut node = Node::new(node_type, position);
        node.data.merge(extra);
        self.insert_node(node.clone());
        node
    }

    /// Inserts a fully built node. Groups go to the front so they sit under
    /// ordinary content; everything else is appended.
    pub fn insert_node(&mut self, mut node: Node) {
        if node.is_group() {
            node.parent_id = None;
            self.nodes.insert(0, node);
        } else {
            if let Some(parent) = &node.parent_id {
                if !self.is_group(parent) {
                    node.parent_id = None;
                }
            }
            self.nodes.push(node);
        }
        self.touch();
    }

    /// Shallow-merges `patch` into the node's content. Returns false when the
    /// node does not exist.
    pub fn update_node_data(&mut self, id: &NodeId, patch: &NodeFields) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        node.data.merge(patch);
        self.touch();
        true
    }

    /// Removes a node and every edge touching it. Members of a deleted group
    /// are kept, ungrouped, at their absolute position.
    pub fn delete_node(&mut self, id: &NodeId) -> Option<Node> {
        let idx = self.nodes.iter().position(|n| &n.id == id)?;
        let removed = self.nodes.remove(idx);

        if removed.is_group() {
            let origin = removed.position;
            for node in self.nodes.iter_mut() {
                if node.parent_id.as_ref() == Some(id) {
                    node.parent_id = None;
                    node.position = node.position + origin;
                }
            }
        }

        let before = self.edges.len();
        self.edges.retain(|e| !e.touches(id));
        debug!(
            node = %id,
            pruned_edges = before - self.edges.len(),
            "deleted node"
        );
        self.touch();
        Some(removed)
    }

    pub fn delete_edge(&mut self, id: &EdgeId) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| &e.id != id);
        let removed = self.edges.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Connects `source` to `target`. Self-loops and edges to unknown nodes
    /// are ignored; parallel edges are allowed.
    pub fn add_edge(&mut self, source: &NodeId, target: &NodeId) -> Option<Edge> {
        self.push_edge(EdgeId::new(), source, target)
    }

    pub(crate) fn push_edge(&mut self, id: EdgeId, source: &NodeId, target: &NodeId) -> Option<Edge> {
        if source == target {
            return None;
        }
        if self.node(source).is_none() || self.node(target).is_none() {
            return None;
        }
        let edge = Edge {
            id,
            source: source.clone(),
            target: target.clone(),
        };
        self.edges.push(edge.clone());
        self.touch();
        Some(edge)
    }

    /// Bulk replace. Duplicate ids keep their first occurrence, parents that
    /// do not name a group are cleared and edges left dangling are pruned.
    pub fn set_nodes(&mut self, nodes: Vec<Node>) {
        let mut seen = HashSet::new();
        let mut kept: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if seen.insert(node.id.clone()) {
                kept.push(node);
            } else {
                warn!(node = %node.id, "dropping duplicate node id");
            }
        }

        let groups: HashSet<NodeId> = kept
            .iter()
            .filter(|n| n.is_group())
            .map(|n| n.id.clone())
            .collect();
        for node in kept.iter_mut() {
            if node.is_group() {
                node.parent_id = None;
            } else if let Some(parent) = &node.parent_id {
                if !groups.contains(parent) {
                    node.parent_id = None;
                }
            }
        }

        self.nodes = kept;
        let ids: HashSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();
        self.edges
            .retain(|e| ids.contains(&e.source) && ids.contains(&e.target));
        self.touch();
    }

    /// Bulk replace. Edges with a missing endpoint or equal endpoints are
    /// dropped.
    pub fn set_edges(&mut self, edges: Vec<Edge>) {
        let ids: HashSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();
        let kept: Vec<Edge> = edges
            .into_iter()
            .filter(|e| e.source != e.target && ids.contains(&e.source) && ids.contains(&e.target))
            .collect();
        self.edges = kept;
        self.touch();
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.touch();
    }

    /// Drag-in-progress move. Locked nodes stay put.
    pub fn move_node(&mut self, id: &NodeId, position: Point) -> bool {
        match self.node_mut(id) {
            Some(node) if !node.locked => {
                node.position = position;
                self.touch();
                true
            }
            _ => false,
        }
    }

    /// Flips the lock flag and returns the new value.
    pub fn toggle_lock(&mut self, id: &NodeId) -> Option<bool> {
        let node = self.node_mut(id)?;
        node.locked = !node.locked;
        let locked = node.locked;
        self.touch();
        Some(locked)
    }

    /// Sets membership and the matching position (relative when `parent` is
    /// set). Refused for groups and for parents that are not groups.
    pub(crate) fn set_parent(&mut self, id: &NodeId, parent: Option<NodeId>, position: Point) -> bool {
        if let Some(p) = &parent {
            if !self.is_group(p) || p == id {
                return false;
            }
        }
        match self.node_mut(id) {
            Some(node) if !node.is_group() => {
                node.parent_id = parent;
                node.position = position;
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub fn is_group(&self, id: &NodeId) -> bool {
        self.node(id).is_some_and(Node::is_group)
    }

    /// Position in canvas coordinates. Nesting is one level deep, so this is
    /// at most one parent hop.
    pub fn absolute_position(&self, node: &Node) -> Point {
        match node.parent_id.as_ref().and_then(|p| self.node(p)) {
            Some(parent) => node.position + parent.position,
            None => node.position,
        }
    }

    pub fn children_of<'a>(&'a self, group: &'a NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent_id.as_ref() == Some(group))
    }

    /// Applies absolute positions from a layout run. Members keep their group
    /// and get coordinates relative to the group's new origin.
    pub fn apply_positions(&mut self, positions: &[(NodeId, Point)]) {
        let assigned: HashMap<&NodeId, Point> = positions.iter().map(|(id, p)| (id, *p)).collect();

        let group_origins: HashMap<NodeId, Point> = self
            .nodes
            .iter()
            .filter(|n| n.is_group())
            .map(|n| (n.id.clone(), assigned.get(&n.id).copied().unwrap_or(n.position)))
            .collect();

        for node in self.nodes.iter_mut() {
            let Some(&absolute) = assigned.get(&node.id) else {
                continue;
            };
            node.position = match node.parent_id.as_ref().and_then(|p| group_origins.get(p)) {
                Some(origin) => absolute - *origin,
                None => absolute,
            };
        }
        self.touch();
    }

    /// Nudges `pos` diagonally until it no longer sits on top of an existing
    /// top-level node.
    pub fn find_free_position(&self, mut pos: Point) -> Point {
        for _ in 0..CASCADE_ATTEMPTS {
            let overlaps = self.nodes.iter().filter(|n| n.parent_id.is_none()).any(|node| {
                let dx = (node.position.x - pos.x).abs();
                let dy = (node.position.y - pos.y).abs();
                dx < CASCADE_OFFSET && dy < CASCADE_OFFSET
            });
            if !overlaps {
                break;
            }
            pos.x += CASCADE_OFFSET;
            pos.y += CASCADE_OFFSET;
        }
        pos
    }
}
