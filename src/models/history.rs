use chrono::{DateTime, Utc};
use serde::Serialize;

use super::metadata::StatusTransition;

/// One commit touching a spec file, as reported by version control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub at: DateTime<Utc>,
    pub author_name: String,
    pub author_email: String,
    /// Repository-relative path of the file in this commit. Differs from the
    /// current path for commits made before a rename.
    pub path: Option<String>,
}

/// Metadata derived from a file's commit log.
///
/// History records are computed on demand for a single reconciliation pass
/// and never stored; only the fields merged into a spec's header persist.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryRecord {
    /// Time of the earliest commit touching the file.
    pub created_at: DateTime<Utc>,
    /// Time of the latest commit touching the file.
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Author of the earliest commit, when requested.
    pub assignee: Option<String>,
    /// Status changes replayed across revisions, when requested.
    pub transitions: Vec<StatusTransition>,
}

/// Where a reconciled metadata value came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Already present in the header and kept.
    Existing,
    /// Derived from the commit log.
    History,
    /// Read from an inline label in the body, e.g. `**Status**: Done`.
    BodyMarker,
    /// Fallback value.
    Default,
}

/// An audit entry for one metadata field considered during reconciliation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub value: String,
    pub source: FieldSource,
    /// False when the existing value was kept.
    pub applied: bool,
}

impl FieldChange {
    pub(crate) fn kept(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            source: FieldSource::Existing,
            applied: false,
        }
    }

    pub(crate) fn set(field: &'static str, value: impl Into<String>, source: FieldSource) -> Self {
        Self {
            field,
            value: value.into(),
            source,
            applied: true,
        }
    }
}
