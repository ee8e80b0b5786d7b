//! Group membership on drag.
//!
//! A dragged node belongs to the first group (in store order, which puts
//! groups first) whose rectangle strictly contains the dragged node's center
//! in absolute canvas coordinates. Groups themselves never join groups.

use tracing::info;

use crate::geometry::{Point, Rect};
use crate::graph::GraphStore;
use crate::node::NodeId;

/// Committed membership change, carrying the labels for the notification.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipChange {
    Added {
        node: NodeId,
        group: NodeId,
        node_label: String,
        group_label: String,
    },
    Removed {
        node: NodeId,
        group: NodeId,
        node_label: String,
        group_label: String,
    },
}

impl MembershipChange {
    pub fn message(&self) -> String {
        match self {
            MembershipChange::Added {
                node_label,
                group_label,
                ..
            } => format!("\"{}\" added to \"{}\"", node_label, group_label),
            MembershipChange::Removed {
                node_label,
                group_label,
                ..
            } => format!("\"{}\" removed from \"{}\"", node_label, group_label),
        }
    }
}

fn label_or<'a>(label: &'a str, fallback: &'a str) -> &'a str {
    if label.is_empty() { fallback } else { label }
}

/// Group under the dragged node's center, if any. `None` also covers a
/// dragged group or an unknown id.
pub fn resolve_target(store: &GraphStore, dragged: &NodeId) -> Option<NodeId> {
    let node = store.node(dragged)?;
    if node.is_group() {
        return None;
    }
    let absolute = Rect::new(store.absolute_position(node), node.size);
    let center = absolute.center();

    store
        .nodes()
        .iter()
        .filter(|g| g.is_group() && &g.id != dragged)
        .find(|g| g.bounds().contains_strict(center))
        .map(|g| g.id.clone())
}

/// Live highlight while dragging: the group that would receive the node.
pub fn hover_target(store: &GraphStore, dragged: &NodeId) -> Option<NodeId> {
    resolve_target(store, dragged)
}

/// Drag-stop: reparents the node if the resolved group differs from its
/// current parent, converting its position between absolute and
/// parent-relative coordinates.
pub fn commit_drop(store: &mut GraphStore, dragged: &NodeId) -> Option<MembershipChange> {
    let node = store.node(dragged)?;
    if node.is_group() || node.locked {
        return None;
    }
    let current = node.parent_id.clone();
    let resolved = resolve_target(store, dragged);
    if resolved == current {
        return None;
    }

    let absolute = store.absolute_position(node);
    let node_label = label_or(node.label(), "Node").to_string();

    match resolved {
        Some(group_id) => {
            let group = store.node(&group_id)?;
            let group_label = label_or(group.label(), "Group").to_string();
            let relative = absolute - group.position;
            if !store.set_parent(dragged, Some(group_id.clone()), relative) {
                return None;
            }
            info!(node = %dragged, group = %group_id, "node added to group");
            Some(MembershipChange::Added {
                node: dragged.clone(),
                group: group_id,
                node_label,
                group_label,
            })
        }
        None => {
            // current is Some here since resolved != current
            let old = current?;
            let group_label = store
                .node(&old)
                .map(|g| label_or(g.label(), "Group").to_string())
                .unwrap_or_else(|| "Group".to_string());
            if !store.set_parent(dragged, None, absolute) {
                return None;
            }
            info!(node = %dragged, group = %old, "node removed from group");
            Some(MembershipChange::Removed {
                node: dragged.clone(),
                group: old,
                node_label,
                group_label,
            })
        }
    }
}

/// Position to hand the renderer when a parented node is dragged: clamps the
/// relative position so the node stays inside its parent's bounds.
pub fn constrain_to_parent(store: &GraphStore, dragged: &NodeId, proposed: Point) -> Point {
    let Some(node) = store.node(dragged) else {
        return proposed;
    };
    let Some(parent) = node.parent_id.as_ref().and_then(|p| store.node(p)) else {
        return proposed;
    };
    let max_x = (parent.size.width - node.size.width).max(0.0);
    let max_y = (parent.size.height - node.size.height).max(0.0);
    Point::new(proposed.x.clamp(0.0, max_x), proposed.y.clamp(0.0, max_y))
}
