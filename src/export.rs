//! Markdown and plain-text exports.

use std::fmt::Write;

use crate::document::{ChatMessage, ChatRole};
use crate::graph::GraphStore;
use crate::node::{Node, NodeData};

const UNTITLED: &str = "Untitled";

fn or<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => fallback,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn node_section(out: &mut String, graph: &GraphStore, node: &Node) {
    let label = if node.label().is_empty() { UNTITLED } else { node.label() };
    let _ = writeln!(out, "## {}\n", label);

    match &node.data {
        NodeData::Text(d) => {
            let _ = writeln!(out, "{}\n", or(&d.content, "(empty)"));
        }
        NodeData::Image(d) => {
            let _ = writeln!(out, "![{}]({})", label, or(&d.image_url, ""));
            if let Some(desc) = non_empty(&d.description) {
                let _ = writeln!(out, "*{}*", desc);
            }
            out.push('\n');
        }
        NodeData::Pdf(d) => {
            let pages = d.page_count.map_or("?".to_string(), |p| p.to_string());
            let _ = writeln!(out, "**File:** {} ({} pages)\n", or(&d.filename, "unknown"), pages);
            if let Some(text) = non_empty(&d.parsed_text) {
                let _ = writeln!(out, "{}\n", text);
            }
        }
        NodeData::YouTube(d) => {
            let _ = writeln!(out, "**Video:** [{}]({})\n", or(&d.title, "YouTube"), or(&d.url, ""));
            if let Some(t) = non_empty(&d.transcript) {
                let _ = writeln!(out, "**Transcript:**\n{}\n", t);
            }
        }
        NodeData::Voice(d) => {
            if let Some(t) = non_empty(&d.transcript) {
                let _ = writeln!(out, "**Transcript:**\n{}\n", t);
            }
        }
        NodeData::Web(d) => {
            let _ = writeln!(out, "**Page:** [{}]({})\n", or(&d.title, "Web page"), or(&d.url, ""));
            if let Some(desc) = non_empty(&d.description) {
                let _ = writeln!(out, "*{}*\n", desc);
            }
            if let Some(content) = non_empty(&d.content) {
                let _ = writeln!(out, "{}\n", content);
            }
        }
        NodeData::Code(d) => {
            let _ = writeln!(out, "```{}\n{}\n```\n", d.language.as_deref().unwrap_or(""), or(&d.content, ""));
        }
        NodeData::Sticky(d) => {
            if let Some(content) = non_empty(&d.content) {
                let _ = writeln!(out, "> {}\n", content.replace('\n', "\n> "));
            }
        }
        NodeData::Embed(d) => {
            let _ = writeln!(out, "<{}>\n", or(&d.url, ""));
        }
        NodeData::Group(_) => {
            let members: Vec<&str> = graph.children_of(&node.id).map(Node::label).collect();
            if !members.is_empty() {
                let _ = writeln!(out, "Contains: {}\n", members.join(", "));
            }
        }
    }
    out.push_str("---\n\n");
}

fn speaker(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "You",
        ChatRole::Assistant => "AI",
    }
}

/// Whole canvas as Markdown: one section per node in store order, then the
/// chat history when there is one.
pub fn canvas_markdown(title: &str, graph: &GraphStore, chat: &[ChatMessage]) -> String {
    let title = if title.trim().is_empty() { "Canvas Export" } else { title };
    let mut out = format!("# {}\n\n", title);
    for node in graph.nodes() {
        node_section(&mut out, graph, node);
    }
    if !chat.is_empty() {
        out.push_str("## Chat History\n\n");
        for m in chat {
            let _ = writeln!(out, "**{}:**\n{}\n", speaker(m.role), m.content);
        }
    }
    out
}

/// Chat transcript as plain text, one block per message.
pub fn chat_transcript(chat: &[ChatMessage]) -> String {
    chat.iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::User => "USER",
                ChatRole::Assistant => "ASSISTANT",
            };
            format!("[{}]\n{}\n", role, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::node::{NodeFields, NodeType};
    use pretty_assertions::assert_eq;

    #[test]
    fn text_and_pdf_sections() {
        let mut g = GraphStore::new();
        g.add_node(NodeType::Text, Point::ORIGIN, &NodeFields::label("Intro").with_content("Hello"));
        g.add_node(
            NodeType::Pdf,
            Point::ORIGIN,
            &NodeFields {
                filename: Some("a.pdf".into()),
                page_count: Some(3),
                ..Default::default()
            },
        );
        let md = canvas_markdown("Notes", &g, &[]);
        assert_eq!(
            md,
            "# Notes\n\n## Intro\n\nHello\n\n---\n\n## PDF Document\n\n**File:** a.pdf (3 pages)\n\n---\n\n"
        );
    }

    #[test]
    fn chat_is_appended() {
        let g = GraphStore::new();
        let chat = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let md = canvas_markdown("", &g, &chat);
        assert!(md.starts_with("# Canvas Export\n\n## Chat History\n\n"));
        assert!(md.contains("**You:**\nhi\n"));
        assert!(md.contains("**AI:**\nhello\n"));
    }

    #[test]
    fn transcript_separates_messages() {
        let chat = vec![ChatMessage::user("q"), ChatMessage::assistant("a")];
        assert_eq!(chat_transcript(&chat), "[USER]\nq\n\n---\n\n[ASSISTANT]\na\n");
    }
}
