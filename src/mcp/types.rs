//! Request and response types for MCP tools.
//!
//! Field names are camelCase on the wire; `contentHash` is the fingerprint a
//! caller passes back as `expectedContentHash` to detect concurrent edits.

use std::path::PathBuf;

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::history::{BackfillOutcome, BackfillReport};
use crate::models::{DependencyGraph, HierarchyNode, SpecSummary};

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListSpecsRequest {
    #[schemars(
        description = "Only specs with this status: planned, in-progress, complete or archived"
    )]
    #[serde(default)]
    pub status: Option<String>,
    #[schemars(description = "Only specs with this priority: low, medium, high or critical")]
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpecRequest {
    #[schemars(
        description = "Spec directory name (e.g. '007-auth-flow'), number ('7' or '007'), or name ('auth-flow')"
    )]
    pub spec: String,
    #[schemars(
        description = "Another file in the spec directory to read instead of the main document, e.g. 'DESIGN.md'"
    )]
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSpecRequest {
    #[schemars(description = "Spec directory name, number, or name")]
    pub spec: String,
    #[schemars(description = "Complete new file content, header block included")]
    pub content: String,
    #[schemars(
        description = "Another file in the spec directory to write instead of the main document"
    )]
    #[serde(default)]
    pub file: Option<String>,
    #[schemars(
        description = "contentHash from view_spec; the write is rejected if the file changed since"
    )]
    #[serde(default)]
    pub expected_content_hash: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SectionMode {
    #[default]
    Replace,
    Append,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSectionRequest {
    #[schemars(description = "Spec directory name, number, or name")]
    pub spec: String,
    #[schemars(description = "Title of the '## ' section, without the hashes")]
    pub section: String,
    #[schemars(description = "Markdown to put in the section")]
    pub content: String,
    #[schemars(
        description = "'replace' (default) swaps the section content; 'append' adds after it"
    )]
    #[serde(default)]
    pub mode: SectionMode,
    #[schemars(
        description = "contentHash from view_spec; the write is rejected if the file changed since"
    )]
    #[serde(default)]
    pub expected_content_hash: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleChecklistRequest {
    #[schemars(description = "Spec directory name, number, or name")]
    pub spec: String,
    #[schemars(
        description = "Text of the checklist item, or a unique part of it. The first matching item is changed."
    )]
    pub item: String,
    #[schemars(description = "true to check the item, false to uncheck it")]
    pub checked: bool,
    #[schemars(
        description = "contentHash from view_spec; the write is rejected if the file changed since"
    )]
    #[serde(default)]
    pub expected_content_hash: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMetadataRequest {
    #[schemars(description = "Spec directory name, number, or name")]
    pub spec: String,
    #[schemars(
        description = "New status: planned, in-progress, complete or archived. Changing it records a transition."
    )]
    #[serde(default)]
    pub status: Option<String>,
    #[schemars(description = "New priority: low, medium, high or critical")]
    #[serde(default)]
    pub priority: Option<String>,
    #[schemars(description = "Replacement tag list")]
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[schemars(description = "New assignee; an empty string clears it")]
    #[serde(default)]
    pub assignee: Option<String>,
    #[schemars(
        description = "contentHash from view_spec; the write is rejected if the file changed since"
    )]
    #[serde(default)]
    pub expected_content_hash: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpecTreeRequest {
    #[schemars(
        description = "Sibling order: id-asc (default), id-desc, updated, title or priority"
    )]
    #[serde(default)]
    pub sort: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpecDependenciesRequest {
    #[schemars(
        description = "Restrict the answer to this spec's direct dependencies and dependents"
    )]
    #[serde(default)]
    pub spec: Option<String>,
    #[schemars(
        description = "Handling of self or dangling references: keep (default), prune or reject"
    )]
    #[serde(default)]
    pub policy: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillHistoryRequest {
    #[schemars(description = "Specs to backfill; all specs when empty")]
    #[serde(default)]
    pub specs: Vec<String>,
    #[schemars(description = "Set assignee from the author of the first commit")]
    #[serde(default)]
    pub assignee: bool,
    #[schemars(description = "Replay status transitions from earlier revisions")]
    #[serde(default)]
    pub transitions: bool,
    #[schemars(description = "Overwrite values already present in the header")]
    #[serde(default)]
    pub force: bool,
    #[schemars(description = "Create status and created for specs with no valid header")]
    #[serde(default)]
    pub bootstrap: bool,
    #[schemars(description = "Report what would change without writing")]
    #[serde(default)]
    pub dry_run: bool,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Serialize)]
pub struct SpecListResponse {
    pub specs: Vec<SpecSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistProgress {
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecViewResponse {
    pub id: String,
    pub path: PathBuf,
    pub content: String,
    pub content_hash: String,
    /// Titles of the `## ` sections; empty for non-markdown sub-files.
    pub sections: Vec<String>,
    pub checklist: ChecklistProgress,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    pub id: String,
    pub content_hash: String,
}

#[derive(Debug, Serialize)]
pub struct SpecTreeResponse {
    /// ASCII rendering of `roots`.
    pub tree: String,
    pub roots: Vec<HierarchyNode>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecRelationsResponse {
    pub id: String,
    pub depends_on: Vec<String>,
    pub required_by: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DependenciesResponse {
    Graph(DependencyGraph),
    Spec(SpecRelationsResponse),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResultInfo {
    pub spec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BackfillOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResponse {
    pub dry_run: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub updated: usize,
    pub results: Vec<BackfillResultInfo>,
}

impl BackfillResponse {
    pub fn from_report(report: BackfillReport, dry_run: bool) -> Self {
        Self {
            dry_run,
            succeeded: report.succeeded(),
            failed: report.failed(),
            updated: report.updated(),
            results: report
                .entries
                .into_iter()
                .map(|entry| match entry.result {
                    Ok(outcome) => BackfillResultInfo {
                        spec: entry.spec,
                        outcome: Some(outcome),
                        error: None,
                    },
                    Err(e) => BackfillResultInfo {
                        spec: entry.spec,
                        outcome: None,
                        error: Some(e.to_string()),
                    },
                })
                .collect(),
        }
    }
}
