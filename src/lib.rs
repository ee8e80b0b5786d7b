//! State engine for an infinite-canvas workspace: content nodes and edges,
//! one-level groups, undo/redo, auto-layout and project persistence.

pub mod backup;
pub mod capabilities;
pub mod chat;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod graph;
pub mod groups;
pub mod history;
pub mod layout;
pub mod node;
pub mod persistence;
pub mod search;
pub mod store;
pub mod timer;
pub mod toast;

pub use error::{Error, Result};
