use std::collections::{HashMap, HashSet, VecDeque};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::Point;
use crate::node::{Edge, Node, NodeId};

const NODE_WIDTH: f64 = 320.0;
const NODE_HEIGHT: f64 = 200.0;
const H_GAP: f64 = 60.0;
const V_GAP: f64 = 80.0;
const RING_DISTANCE: f64 = 300.0;
/// Distance from the requested center up to the tree's first row.
const TREE_TOP_OFFSET: f64 = 200.0;

/// Absolute top-left position for every input node, in input order.
pub type Positions = Vec<(NodeId, Point)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    Grid,
    Tree,
    Radial,
}

impl LayoutKind {
    pub fn run(self, nodes: &[Node], edges: &[Edge], center: Point) -> Positions {
        let positions = match self {
            LayoutKind::Grid => grid(nodes, center),
            LayoutKind::Tree => tree(nodes, edges, center),
            LayoutKind::Radial => radial(nodes, edges, center),
        };
        debug!(kind = %self, nodes = nodes.len(), "auto-layout computed");
        positions
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LayoutKind::Grid => "grid",
            LayoutKind::Tree => "tree",
            LayoutKind::Radial => "radial",
        })
    }
}

impl FromStr for LayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grid" => Ok(LayoutKind::Grid),
            "tree" => Ok(LayoutKind::Tree),
            "radial" => Ok(LayoutKind::Radial),
            other => Err(format!("unknown layout '{}', expected grid, tree or radial", other)),
        }
    }
}

/// Square-ish grid, row-major in input order, centered on `center`.
pub fn grid(nodes: &[Node], center: Point) -> Positions {
    if nodes.is_empty() {
        return Vec::new();
    }
    let n = nodes.len();
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    let width = cols as f64 * NODE_WIDTH + (cols - 1) as f64 * H_GAP;
    let height = rows as f64 * NODE_HEIGHT + (rows - 1) as f64 * V_GAP;
    let start_x = center.x - width / 2.0;
    let start_y = center.y - height / 2.0;

    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let col = i % cols;
            let row = i / cols;
            let pos = Point::new(
                start_x + col as f64 * (NODE_WIDTH + H_GAP),
                start_y + row as f64 * (NODE_HEIGHT + V_GAP),
            );
            (node.id.clone(), pos)
        })
        .collect()
}

/// BFS spanning forest over the nodes that take part in at least one edge.
struct Forest<'a> {
    roots: Vec<&'a NodeId>,
    kids: HashMap<&'a NodeId, Vec<&'a NodeId>>,
    depth: HashMap<&'a NodeId, usize>,
    /// Connected nodes in BFS visiting order.
    order: Vec<&'a NodeId>,
    /// Nodes with no usable edge, in input order.
    orphans: Vec<&'a NodeId>,
}

impl<'a> Forest<'a> {
    /// Returns `None` when no edge connects two distinct input nodes.
    fn build(nodes: &'a [Node], edges: &'a [Edge]) -> Option<Self> {
        let present: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();

        let mut children: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        let mut has_parent: HashSet<&NodeId> = HashSet::new();
        let mut connected: HashSet<&NodeId> = HashSet::new();
        for edge in edges {
            if edge.source == edge.target
                || !present.contains(&edge.source)
                || !present.contains(&edge.target)
            {
                continue;
            }
            children.entry(&edge.source).or_default().push(&edge.target);
            has_parent.insert(&edge.target);
            connected.insert(&edge.source);
            connected.insert(&edge.target);
        }
        if connected.is_empty() {
            return None;
        }

        // Input order keeps the result deterministic
        let connected_in_order: Vec<&NodeId> = nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| connected.contains(id))
            .collect();
        let orphans: Vec<&NodeId> = nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| !connected.contains(id))
            .collect();

        let mut roots: Vec<&NodeId> = connected_in_order
            .iter()
            .copied()
            .filter(|id| !has_parent.contains(id))
            .collect();
        // Pure cycle: any connected node will do
        if roots.is_empty() {
            roots.push(connected_in_order[0]);
        }

        let mut forest = Forest {
            roots: Vec::new(),
            kids: HashMap::new(),
            depth: HashMap::new(),
            order: Vec::new(),
            orphans,
        };
        let mut visited: HashSet<&NodeId> = HashSet::new();
        forest.bfs(&roots, &children, &mut visited);

        // Cycles hanging off no root are seeded as extra roots
        for id in &connected_in_order {
            if !visited.contains(id) {
                forest.bfs(&[*id], &children, &mut visited);
            }
        }
        Some(forest)
    }

    fn bfs(
        &mut self,
        seeds: &[&'a NodeId],
        children: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
        visited: &mut HashSet<&'a NodeId>,
    ) {
        let mut queue: VecDeque<&NodeId> = VecDeque::new();
        for &seed in seeds {
            if visited.insert(seed) {
                self.roots.push(seed);
                self.depth.insert(seed, 0);
                queue.push_back(seed);
            }
        }
        while let Some(id) = queue.pop_front() {
            self.order.push(id);
            let level = self.depth[id];
            for &child in children.get(id).map(Vec::as_slice).unwrap_or_default() {
                if visited.insert(child) {
                    self.depth.insert(child, level + 1);
                    self.kids.entry(id).or_default().push(child);
                    queue.push_back(child);
                }
            }
        }
    }

    fn max_depth(&self) -> usize {
        self.depth.values().copied().max().unwrap_or(0)
    }
}

/// `count` node slots in one row centered on `center_x`.
fn centered_row(count: usize, center_x: f64, y: f64) -> impl Iterator<Item = Point> {
    let total = count as f64 * NODE_WIDTH + count.saturating_sub(1) as f64 * H_GAP;
    let start_x = center_x - total / 2.0;
    (0..count).map(move |i| Point::new(start_x + i as f64 * (NODE_WIDTH + H_GAP), y))
}

fn collect_in_input_order(nodes: &[Node], placed: &HashMap<&NodeId, Point>) -> Positions {
    nodes
        .iter()
        .map(|n| {
            // Every node is placed by construction; fall back to its current spot
            let pos = placed.get(&n.id).copied().unwrap_or(n.position);
            (n.id.clone(), pos)
        })
        .collect()
}

/// Hierarchy top-down: one row per BFS level, orphans in a row underneath.
/// Degrades to [`grid`] when there are no edges.
pub fn tree(nodes: &[Node], edges: &[Edge], center: Point) -> Positions {
    if nodes.is_empty() {
        return Vec::new();
    }
    let Some(forest) = Forest::build(nodes, edges) else {
        return grid(nodes, center);
    };

    let top = center.y - TREE_TOP_OFFSET;
    let row_pitch = NODE_HEIGHT + V_GAP;
    let max_level = forest.max_depth();

    let mut levels: Vec<Vec<&NodeId>> = vec![Vec::new(); max_level + 1];
    for &id in &forest.order {
        levels[forest.depth[id]].push(id);
    }

    let mut placed: HashMap<&NodeId, Point> = HashMap::new();
    for (lvl, ids) in levels.iter().enumerate() {
        let y = top + lvl as f64 * row_pitch;
        for (&id, pos) in ids.iter().zip(centered_row(ids.len(), center.x, y)) {
            placed.insert(id, pos);
        }
    }

    let orphan_y = top + (max_level as f64 + 1.5) * row_pitch;
    for (&id, pos) in forest
        .orphans
        .iter()
        .zip(centered_row(forest.orphans.len(), center.x, orphan_y))
    {
        placed.insert(id, pos);
    }

    collect_in_input_order(nodes, &placed)
}

/// Mind-map: roots around the center, each child ring `RING_DISTANCE`
/// further out, angular share proportional to subtree size.
pub fn radial(nodes: &[Node], edges: &[Edge], center: Point) -> Positions {
    if nodes.is_empty() {
        return Vec::new();
    }
    let centered = Point::new(center.x - NODE_WIDTH / 2.0, center.y - NODE_HEIGHT / 2.0);
    if nodes.len() == 1 {
        return vec![(nodes[0].id.clone(), centered)];
    }
    let Some(forest) = Forest::build(nodes, edges) else {
        return grid(nodes, center);
    };

    // Subtree sizes, leaves first
    let mut subtree: HashMap<&NodeId, usize> = HashMap::new();
    for &id in forest.order.iter().rev() {
        let size = 1 + forest
            .kids
            .get(id)
            .map(|kids| kids.iter().map(|k| subtree.get(k).copied().unwrap_or(1)).sum::<usize>())
            .unwrap_or(0);
        subtree.insert(id, size);
    }

    let mut sectors: HashMap<&NodeId, (f64, f64)> = HashMap::new();
    let root_count = forest.roots.len() as f64;
    for (i, &root) in forest.roots.iter().enumerate() {
        let start = 2.0 * PI * i as f64 / root_count - FRAC_PI_2;
        let end = 2.0 * PI * (i + 1) as f64 / root_count - FRAC_PI_2;
        sectors.insert(root, (start, end));
    }

    let mut placed: HashMap<&NodeId, Point> = HashMap::new();
    // BFS order guarantees a parent's sector is known before its kids
    for &id in &forest.order {
        let (start, end) = sectors[id];
        let angle = (start + end) / 2.0;
        let radius = forest.depth[id] as f64 * RING_DISTANCE;
        placed.insert(
            id,
            Point::new(
                centered.x + radius * angle.cos(),
                centered.y + radius * angle.sin(),
            ),
        );

        let Some(kids) = forest.kids.get(id) else {
            continue;
        };
        let total: usize = kids.iter().map(|k| subtree[k]).sum();
        let mut cursor = start;
        for &kid in kids {
            let span = (end - start) * subtree[kid] as f64 / total as f64;
            sectors.insert(kid, (cursor, cursor + span));
            cursor += span;
        }
    }

    let orphan_y = center.y + (forest.max_depth() as f64 + 1.0) * RING_DISTANCE + V_GAP;
    for (&id, pos) in forest
        .orphans
        .iter()
        .zip(centered_row(forest.orphans.len(), center.x, orphan_y))
    {
        placed.insert(id, pos);
    }

    collect_in_input_order(nodes, &placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{EdgeId, NodeType};
    use pretty_assertions::assert_eq;

    fn nodes(n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| {
                let mut node = Node::new(NodeType::Text, Point::ORIGIN);
                node.id = NodeId::from(format!("n{}", i).as_str());
                node
            })
            .collect()
    }

    fn edge(a: &Node, b: &Node) -> Edge {
        Edge {
            id: EdgeId::new(),
            source: a.id.clone(),
            target: b.id.clone(),
        }
    }

    fn pos(positions: &Positions, id: &NodeId) -> Point {
        positions.iter().find(|(i, _)| i == id).unwrap().1
    }

    #[test]
    fn grid_is_square_ish_and_row_major() {
        let ns = nodes(5);
        let out = grid(&ns, Point::new(0.0, 0.0));
        assert_eq!(out.len(), 5);
        // 3 columns, 2 rows
        assert_eq!(out[1].1.x - out[0].1.x, NODE_WIDTH + H_GAP);
        assert_eq!(out[3].1.y - out[0].1.y, NODE_HEIGHT + V_GAP);
        assert_eq!(out[3].1.x, out[0].1.x);
    }

    #[test]
    fn tree_levels_follow_bfs_depth() {
        let ns = nodes(5);
        let es = vec![edge(&ns[0], &ns[1]), edge(&ns[0], &ns[2]), edge(&ns[1], &ns[3])];
        let out = tree(&ns, &es, Point::new(400.0, 280.0));

        let row = NODE_HEIGHT + V_GAP;
        let top = 80.0;
        assert_eq!(pos(&out, &ns[0].id), Point::new(400.0 - NODE_WIDTH / 2.0, top));
        assert_eq!(pos(&out, &ns[1].id).y, top + row);
        assert_eq!(pos(&out, &ns[2].id).y, top + row);
        assert_eq!(pos(&out, &ns[3].id).y, top + 2.0 * row);
        // n4 has no edge and lands in the orphan row
        assert_eq!(pos(&out, &ns[4].id).y, top + 3.5 * row);
    }

    #[test]
    fn tree_without_edges_is_grid() {
        let ns = nodes(4);
        let c = Point::new(10.0, 10.0);
        assert_eq!(tree(&ns, &[], c), grid(&ns, c));
    }

    #[test]
    fn pure_cycle_still_places_everything() {
        let ns = nodes(3);
        let es = vec![edge(&ns[0], &ns[1]), edge(&ns[1], &ns[2]), edge(&ns[2], &ns[0])];
        for kind in [LayoutKind::Tree, LayoutKind::Radial] {
            let out = kind.run(&ns, &es, Point::ORIGIN);
            assert_eq!(out.len(), 3);
        }
        let out = tree(&ns, &es, Point::new(0.0, 200.0));
        assert_eq!(pos(&out, &ns[0].id).y, 0.0);
    }

    #[test]
    fn cycle_behind_a_root_gets_its_own_root() {
        // n0 -> n1 plus a detached cycle n2 <-> n3
        let ns = nodes(4);
        let es = vec![edge(&ns[0], &ns[1]), edge(&ns[2], &ns[3]), edge(&ns[3], &ns[2])];
        let forest = Forest::build(&ns, &es).unwrap();
        assert_eq!(forest.roots, vec![&ns[0].id, &ns[2].id]);
        assert_eq!(forest.order.len(), 4);
    }

    #[test]
    fn radial_single_node_is_centered() {
        let ns = nodes(1);
        let out = radial(&ns, &[], Point::new(600.0, 400.0));
        assert_eq!(out[0].1, Point::new(600.0 - NODE_WIDTH / 2.0, 400.0 - NODE_HEIGHT / 2.0));
    }

    #[test]
    fn radial_children_sit_on_their_ring() {
        let ns = nodes(4);
        let es = vec![edge(&ns[0], &ns[1]), edge(&ns[0], &ns[2]), edge(&ns[2], &ns[3])];
        let c = Point::new(0.0, 0.0);
        let out = radial(&ns, &es, c);
        let origin = pos(&out, &ns[0].id);
        for (id, ring) in [(&ns[1].id, 1.0), (&ns[2].id, 1.0), (&ns[3].id, 2.0)] {
            let p = pos(&out, id);
            let d = ((p.x - origin.x).powi(2) + (p.y - origin.y).powi(2)).sqrt();
            assert!((d - ring * RING_DISTANCE).abs() < 1e-6, "{} at {}", id, d);
        }
    }

    #[test]
    fn radial_gives_bigger_subtrees_wider_sectors() {
        // n0 -> n1 (leaf), n0 -> n2 -> {n3, n4}
        let ns = nodes(5);
        let es = vec![
            edge(&ns[0], &ns[1]),
            edge(&ns[0], &ns[2]),
            edge(&ns[2], &ns[3]),
            edge(&ns[2], &ns[4]),
        ];
        let out = radial(&ns, &es, Point::ORIGIN);
        let origin = pos(&out, &ns[0].id);
        let angle = |id: &NodeId| {
            let p = pos(&out, id);
            (p.y - origin.y).atan2(p.x - origin.x)
        };
        // Full circle starting at -90deg: n1 gets 1/4 of it, n2 the remaining 3/4
        let expected_n1 = -FRAC_PI_2 + 2.0 * PI * (1.0 / 4.0) / 2.0;
        assert!((angle(&ns[1].id) - expected_n1).abs() < 1e-9);
    }

    #[test]
    fn kind_parses_from_cli_names() {
        assert_eq!("Tree".parse::<LayoutKind>(), Ok(LayoutKind::Tree));
        assert!("spiral".parse::<LayoutKind>().is_err());
    }
}
