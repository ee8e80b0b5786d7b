use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use corkboard::config::Settings;
use corkboard::document::ProjectDocument;
use corkboard::export;
use corkboard::geometry::Point;
use corkboard::graph::GraphStore;
use corkboard::layout::LayoutKind;
use corkboard::store::{FileStore, ProjectStore};

/// Center used when laying out a project outside the editor.
const LAYOUT_CENTER: Point = Point::new(600.0, 400.0);

#[derive(Parser)]
#[clap(author, version, about = "Inspect and maintain saved canvas projects", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List projects, most recently updated first
    List,
    /// Print a project's nodes and connections
    Show { id: String },
    /// List a project's saved versions, newest first
    Versions { id: String },
    /// Re-arrange a project's nodes and save the result
    Layout {
        id: String,
        kind: LayoutKind,
    },
    /// Make an older version the current one
    Restore { id: String, version: u64 },
    /// Print a project as Markdown
    Export { id: String },
    /// Print the effective settings
    Settings {
        /// Also write them to the settings file, filling in missing keys
        #[clap(long)]
        write: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corkboard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().unwrap_or_default();
    if let Err(e) = run(cli.command, &settings) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Command, settings: &Settings) -> corkboard::Result<()> {
    let mut store = FileStore::from_settings(settings)?;
    match command {
        Command::List => {
            for p in store.list()? {
                let updated = p
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {:<32} {:>4} nodes  {}", p.id, p.name, p.node_count, updated);
            }
        }
        Command::Show { id } => {
            let document = store.load(&id)?;
            print_document(&document);
        }
        Command::Versions { id } => {
            for v in store.list_versions(&id)? {
                println!(
                    "{}  {}  {} nodes, {} edges  {}",
                    v.id,
                    v.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    v.node_count,
                    v.edge_count,
                    v.name
                );
            }
        }
        Command::Layout { id, kind } => {
            let mut document = store.load(&id)?;
            let mut graph = GraphStore::from_parts(document.nodes, document.edges);
            let positions = kind.run(graph.nodes(), graph.edges(), LAYOUT_CENTER);
            graph.apply_positions(&positions);
            document.nodes = graph.nodes().to_vec();
            document.edges = graph.edges().to_vec();
            store.save(&document)?;
            info!(project = %id, layout = %kind, nodes = document.nodes.len(), "layout saved");
        }
        Command::Restore { id, version } => {
            let current = store.load(&id)?;
            let mut document = store.load_version(&id, version)?;
            document.id = current.id;
            store.save(&document)?;
            info!(project = %id, version, "version restored");
        }
        Command::Export { id } => {
            let document = store.load(&id)?;
            let graph = GraphStore::from_parts(document.nodes, document.edges);
            print!(
                "{}",
                export::canvas_markdown(&document.name, &graph, &document.chat_messages)
            );
        }
        Command::Settings { write } => show_settings(settings, write)?,
    }
    Ok(())
}

fn show_settings(settings: &Settings, write: bool) -> corkboard::Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    if write {
        settings.save()?;
        if let Some(path) = Settings::config_path() {
            info!(path = %path.display(), "settings written");
        }
    }
    Ok(())
}

fn print_document(document: &ProjectDocument) {
    println!("{}", document.name);
    let graph = GraphStore::from_parts(document.nodes.clone(), document.edges.clone());
    for node in graph.nodes() {
        let indent = if node.parent_id.is_some() { "    " } else { "  " };
        let lock = if node.locked { " [locked]" } else { "" };
        println!(
            "{}{} {:<8} {}{}",
            indent,
            node.id,
            node.node_type(),
            node.label(),
            lock
        );
    }
    for edge in graph.edges() {
        let source = graph.node(&edge.source).map_or("?", |n| n.label());
        let target = graph.node(&edge.target).map_or("?", |n| n.label());
        println!("  {} -> {}", source, target);
    }
}
