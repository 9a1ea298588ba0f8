use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::{SpecPriority, SpecStatus};
use crate::document::SpecDocument;

/// The metadata of one spec as the graph builders see it.
///
/// Specs live in directories named `NNN-short-name`; `number` is the numeric
/// prefix when present and drives identifier ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecSummary {
    pub id: String,
    pub number: Option<u32>,
    pub title: String,
    pub status: Option<SpecStatus>,
    pub priority: Option<SpecPriority>,
    pub parent: Option<String>,
    pub depends_on: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SpecSummary {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            number: parse_spec_number(&id),
            title: id.clone(),
            id,
            status: None,
            priority: None,
            parent: None,
            depends_on: Vec::new(),
            updated_at: None,
        }
    }

    pub fn from_document(id: &str, doc: &SpecDocument) -> Self {
        let mut summary = Self::new(id);
        if let Some(title) = doc.title() {
            summary.title = title.to_string();
        }
        if let Some(meta) = doc.metadata() {
            summary.status = meta.status;
            summary.priority = meta.priority;
            summary.parent = meta.parent.clone();
            summary.depends_on = meta.depends_on.clone();
            summary.updated_at = meta.updated_at.or_else(|| {
                meta.updated
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            });
        }
        summary
    }

    /// Natural identifier order: numbered specs by number, then by text.
    pub fn cmp_id(&self, other: &Self) -> Ordering {
        match (self.number, other.number) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.id.cmp(&other.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.id.cmp(&other.id),
        }
    }
}

/// Parse the leading number of a spec identifier (`"007-auth"` → `7`).
pub fn parse_spec_number(id: &str) -> Option<u32> {
    let digits: &str = &id[..id.bytes().take_while(u8::is_ascii_digit).count()];
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// A spec with its nested children, used for tree responses.
///
/// The `spec` fields are flattened into the JSON response, with an additional
/// `children` array containing nested `HierarchyNode` objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HierarchyNode {
    #[serde(flatten)]
    pub spec: SpecSummary,
    pub children: Vec<HierarchyNode>,
}

/// A node of the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecRef {
    pub id: String,
    pub title: String,
    pub status: Option<SpecStatus>,
}

/// `source` depends on `target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
}

/// Directed "depends on" graph. The inverse relation is derived on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyGraph {
    pub nodes: Vec<SpecRef>,
    pub edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    /// Specs that `id` depends on, in declaration order.
    pub fn depends_on(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Specs that depend on `id`.
    pub fn required_by(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| e.source.as_str())
            .collect()
    }
}
