//! Error taxonomy for the spec document engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by document parsing, editing, persistence and history queries.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid metadata{}: {message}", at_path(.path))]
    Schema {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("section '{title}' not found{}", in_spec(.spec))]
    SectionNotFound { title: String, spec: Option<String> },

    #[error("checklist item matching '{item}' not found{}", in_spec(.spec))]
    ItemNotFound { item: String, spec: Option<String> },

    #[error("{} was modified since it was read (expected {expected}, found {actual})", .path.display())]
    Conflict {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} has no version control history: {reason}", .path.display())]
    NotTracked { path: PathBuf, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path '{0}': must be a plain file name")]
    InvalidPath(String),

    #[error("invalid dependency {source_id} -> {target}: {reason}")]
    InvalidDependency {
        source_id: String,
        target: String,
        reason: String,
    },
}

impl Error {
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            path: None,
            message: message.into(),
        }
    }

    /// Attach the spec identifier to editor errors so callers can report it.
    pub fn in_spec(self, spec: &str) -> Self {
        match self {
            Self::SectionNotFound { title, .. } => Self::SectionNotFound {
                title,
                spec: Some(spec.to_string()),
            },
            Self::ItemNotFound { item, .. } => Self::ItemNotFound {
                item,
                spec: Some(spec.to_string()),
            },
            other => other,
        }
    }

    /// Attach the file path to schema errors raised by the pure parser.
    pub fn at_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Schema { message, .. } => Self::Schema {
                path: Some(path.into()),
                message,
            },
            other => other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

fn in_spec(spec: &Option<String>) -> String {
    spec.as_deref()
        .map(|s| format!(" in spec {}", s))
        .unwrap_or_default()
}

fn at_path(path: &Option<PathBuf>) -> String {
    path.as_deref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
