//! Versioned spec documents: parsing, addressable edits, conflict-checked
//! writes, git-derived history and relationship graphs.

pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod graph;
pub mod history;
pub mod mcp;
pub mod models;
pub mod store;
