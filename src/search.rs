use regex::{Regex, RegexBuilder};

use crate::document::Viewport;
use crate::geometry::Point;
use crate::graph::GraphStore;
use crate::node::{Node, NodeId};

/// Zoom used when the viewport jumps to a search hit.
pub const FOCUS_ZOOM: f64 = 1.2;

/// Compiled search over node text. Plain queries are case-insensitive
/// substring matches; regex queries are case-insensitive patterns.
#[derive(Debug, Clone)]
pub enum NodeQuery {
    Plain(String),
    Pattern(Regex),
}

impl NodeQuery {
    pub fn new(query: &str, use_regex: bool) -> crate::Result<Self> {
        if use_regex {
            let re = RegexBuilder::new(query).case_insensitive(true).build()?;
            Ok(NodeQuery::Pattern(re))
        } else {
            Ok(NodeQuery::Plain(query.trim().to_lowercase()))
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            NodeQuery::Plain(q) => q.is_empty(),
            NodeQuery::Pattern(re) => re.as_str().is_empty(),
        }
    }

    pub fn matches(&self, node: &Node) -> bool {
        let haystack = search_text(node);
        match self {
            NodeQuery::Plain(q) => haystack.to_lowercase().contains(q.as_str()),
            NodeQuery::Pattern(re) => re.is_match(&haystack),
        }
    }

    /// Matching nodes in store order. A blank query matches nothing.
    pub fn run<'a>(&self, graph: &'a GraphStore) -> Vec<&'a Node> {
        if self.is_blank() {
            return Vec::new();
        }
        graph.nodes().iter().filter(|n| self.matches(n)).collect()
    }
}

/// Searchable text of a node: label, content, filename, parsed text,
/// title, transcript, description and url, space-joined.
pub fn search_text(node: &Node) -> String {
    let f = node.data.fields();
    [
        f.label,
        f.content,
        f.filename,
        f.parsed_text,
        f.title,
        f.transcript,
        f.description,
        f.url,
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Viewport centered on `id` at [`FOCUS_ZOOM`], for a screen of
/// `screen_width` x `screen_height`.
pub fn focus_viewport(graph: &GraphStore, id: &NodeId, screen_width: f64, screen_height: f64) -> Option<Viewport> {
    let node = graph.node(id)?;
    let abs = graph.absolute_position(node);
    let center = Point::new(abs.x + node.size.width / 2.0, abs.y + node.size.height / 2.0);
    Some(Viewport {
        x: screen_width / 2.0 - center.x * FOCUS_ZOOM,
        y: screen_height / 2.0 - center.y * FOCUS_ZOOM,
        zoom: FOCUS_ZOOM,
    })
}
