//! Reconstructs spec metadata from version control history.
//!
//! - [`derive_history`]: timestamps, original author and status transitions
//!   of one file, computed from its commit log.
//! - [`merge_history`]: folds a [`HistoryRecord`] into existing metadata
//!   without clobbering values that are already there.
//! - [`bootstrap_metadata`]: synthesizes a header for specs that lack one.
//! - [`Backfiller`]: runs the above over many specs, isolating failures.

mod backfill;
mod bootstrap;
mod git;

use std::path::Path;

use chrono::{DateTime, Utc};

pub use backfill::*;
pub use bootstrap::*;
pub use git::{GitCli, VersionControl};

use crate::document;
use crate::error::Result;
use crate::models::*;

/// Which optional fields [`derive_history`] computes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryOptions {
    pub assignee: bool,
    pub transitions: bool,
}

/// Derive a [`HistoryRecord`] for the file at `path`.
pub fn derive_history(
    vcs: &impl VersionControl,
    path: &Path,
    options: HistoryOptions,
) -> Result<HistoryRecord> {
    let commits = vcs.log(path)?;
    let (Some(latest), Some(earliest)) = (commits.first(), commits.last()) else {
        return Err(crate::error::Error::NotTracked {
            path: path.to_path_buf(),
            reason: "no commits touch this file".to_string(),
        });
    };

    let mut record = HistoryRecord {
        created_at: earliest.at,
        updated_at: latest.at,
        completed_at: None,
        assignee: None,
        transitions: Vec::new(),
    };
    if options.assignee {
        let author = earliest.author_name.trim();
        record.assignee = (!author.is_empty()).then(|| author.to_string());
    }
    if options.transitions {
        let replay = replay_status(vcs, path, &commits)?;
        record.completed_at = replay.completed_at;
        record.transitions = replay.transitions;
    }

    tracing::debug!(
        "History of {}: {} commits, {} transitions",
        path.display(),
        commits.len(),
        record.transitions.len()
    );
    Ok(record)
}

struct StatusReplay {
    transitions: Vec<StatusTransition>,
    completed_at: Option<DateTime<Utc>>,
}

/// Walk revisions oldest to newest, recording each change of `status`.
///
/// The first readable revision sets the baseline and is not itself a
/// transition. Revisions where the file is missing or its status cannot be
/// read leave the current status unchanged.
fn replay_status(
    vcs: &impl VersionControl,
    path: &Path,
    commits: &[CommitInfo],
) -> Result<StatusReplay> {
    let mut baseline: Option<(Option<SpecStatus>, DateTime<Utc>)> = None;
    let mut current: Option<SpecStatus> = None;
    let mut transitions = Vec::new();

    for commit in commits.iter().rev() {
        let Some(content) = vcs.show(commit, path)? else {
            continue;
        };
        let status = status_of(&content);
        if baseline.is_none() {
            baseline = Some((status, commit.at));
            current = status;
            continue;
        }
        if let Some(status) = status.filter(|s| current != Some(*s)) {
            transitions.push(StatusTransition {
                status,
                at: commit.at,
            });
            current = Some(status);
        }
    }

    let completed_at = transitions
        .iter()
        .rev()
        .find(|t| t.status == SpecStatus::Complete)
        .map(|t| t.at)
        .or_else(|| match baseline {
            Some((Some(SpecStatus::Complete), at)) => Some(at),
            _ => None,
        });

    Ok(StatusReplay {
        transitions,
        completed_at,
    })
}

fn status_of(content: &str) -> Option<SpecStatus> {
    match document::split(content) {
        Ok((header, _)) => header.and_then(|h| h.metadata().status),
        Err(_) => None,
    }
}

/// Fold derived history into `meta`.
///
/// A derived value only replaces a field that is absent, unless `force` is
/// set. Kept values are reported with [`FieldSource::Existing`]. The
/// `created` date is filled from `created_at`.
pub fn merge_history(
    meta: &mut Metadata,
    record: &HistoryRecord,
    force: bool,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    if meta.assignee.as_deref().is_some_and(|a| a.trim().is_empty()) {
        meta.assignee = None;
    }

    merge_field(
        &mut changes,
        "created_at",
        &mut meta.created_at,
        Some(record.created_at),
        force,
        DateTime::to_rfc3339,
    );
    merge_field(
        &mut changes,
        "created",
        &mut meta.created,
        Some(record.created_at.date_naive()),
        force,
        |d| d.to_string(),
    );
    merge_field(
        &mut changes,
        "updated_at",
        &mut meta.updated_at,
        Some(record.updated_at),
        force,
        DateTime::to_rfc3339,
    );
    merge_field(
        &mut changes,
        "completed_at",
        &mut meta.completed_at,
        record.completed_at,
        force,
        DateTime::to_rfc3339,
    );
    merge_field(
        &mut changes,
        "completed",
        &mut meta.completed,
        record.completed_at.map(|t| t.date_naive()),
        force,
        |d| d.to_string(),
    );
    merge_field(
        &mut changes,
        "assignee",
        &mut meta.assignee,
        record.assignee.clone(),
        force,
        |a| a.clone(),
    );

    if !record.transitions.is_empty() {
        if meta.transitions.is_empty() || force {
            meta.transitions = record.transitions.clone();
            changes.push(FieldChange::set(
                "transitions",
                describe_transitions(&meta.transitions),
                FieldSource::History,
            ));
        } else {
            changes.push(FieldChange::kept(
                "transitions",
                describe_transitions(&meta.transitions),
            ));
        }
    }
    changes
}

fn merge_field<T>(
    changes: &mut Vec<FieldChange>,
    field: &'static str,
    slot: &mut Option<T>,
    derived: Option<T>,
    force: bool,
    render: impl Fn(&T) -> String,
) {
    let Some(derived) = derived else {
        return;
    };
    match slot {
        Some(existing) if !force => changes.push(FieldChange::kept(field, render(existing))),
        _ => {
            changes.push(FieldChange::set(field, render(&derived), FieldSource::History));
            *slot = Some(derived);
        }
    }
}

fn describe_transitions(transitions: &[StatusTransition]) -> String {
    transitions
        .iter()
        .map(|t| format!("{}@{}", t.status, t.at.to_rfc3339()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use chrono::{DateTime, Utc};

    use super::VersionControl;
    use crate::error::{Error, Result};
    use crate::models::CommitInfo;

    /// In-memory history: per path, revisions oldest first.
    #[derive(Default)]
    pub struct FakeVcs {
        files: HashMap<PathBuf, Vec<(CommitInfo, Option<String>)>>,
    }

    impl FakeVcs {
        pub fn commit(&mut self, path: &Path, at: &str, author: &str, content: Option<&str>) {
            let revisions = self.files.entry(path.to_path_buf()).or_default();
            let commit = CommitInfo {
                sha: format!("c{}", revisions.len()),
                at: DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc),
                author_name: author.to_string(),
                author_email: format!("{}@example.com", author.to_lowercase()),
                path: None,
            };
            revisions.push((commit, content.map(str::to_string)));
        }
    }

    impl VersionControl for FakeVcs {
        fn log(&self, path: &Path) -> Result<Vec<CommitInfo>> {
            let revisions = self.files.get(path).filter(|r| !r.is_empty()).ok_or_else(|| {
                Error::NotTracked {
                    path: path.to_path_buf(),
                    reason: "no commits touch this file".to_string(),
                }
            })?;
            Ok(revisions.iter().rev().map(|(c, _)| c.clone()).collect())
        }

        fn show(&self, commit: &CommitInfo, path: &Path) -> Result<Option<String>> {
            Ok(self
                .files
                .get(path)
                .and_then(|r| r.iter().find(|(c, _)| c.sha == commit.sha))
                .and_then(|(_, content)| content.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::fake::FakeVcs;
    use super::*;
    use crate::error::Error;

    const T1: &str = "2025-01-01T10:00:00Z";
    const T2: &str = "2025-01-05T10:00:00Z";
    const T3: &str = "2025-01-09T10:00:00Z";

    fn doc(status: &str) -> String {
        format!("---\nstatus: {}\ncreated: 2025-01-01\n---\n# Spec\n", status)
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn full() -> HistoryOptions {
        HistoryOptions {
            assignee: true,
            transitions: true,
        }
    }

    #[test]
    fn derives_timestamps_and_transitions() {
        let path = Path::new("specs/001-a/README.md");
        let mut vcs = FakeVcs::default();
        vcs.commit(path, T1, "Ada", Some(&doc("planned")));
        vcs.commit(path, T2, "Bob", Some(&doc("in-progress")));
        vcs.commit(path, T3, "Bob", Some(&doc("complete")));

        let record = derive_history(&vcs, path, full()).unwrap();
        assert_eq!(record.created_at, ts(T1));
        assert_eq!(record.updated_at, ts(T3));
        assert_eq!(record.completed_at, Some(ts(T3)));
        assert_eq!(record.assignee.as_deref(), Some("Ada"));
        assert_eq!(
            record.transitions,
            vec![
                StatusTransition {
                    status: SpecStatus::InProgress,
                    at: ts(T2),
                },
                StatusTransition {
                    status: SpecStatus::Complete,
                    at: ts(T3),
                },
            ]
        );
    }

    #[test]
    fn optional_fields_are_skipped_unless_requested() {
        let path = Path::new("a.md");
        let mut vcs = FakeVcs::default();
        vcs.commit(path, T1, "Ada", Some(&doc("planned")));
        vcs.commit(path, T2, "Ada", Some(&doc("complete")));

        let record = derive_history(&vcs, path, HistoryOptions::default()).unwrap();
        assert!(record.assignee.is_none());
        assert!(record.transitions.is_empty());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn unchanged_and_unreadable_revisions_are_not_transitions() {
        let path = Path::new("a.md");
        let mut vcs = FakeVcs::default();
        vcs.commit(path, T1, "Ada", Some(&doc("planned")));
        vcs.commit(path, T2, "Ada", Some("---\nstatus: [broken\n---\n"));
        vcs.commit(path, T3, "Ada", Some(&doc("planned")));

        let record = derive_history(&vcs, path, full()).unwrap();
        assert!(record.transitions.is_empty());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn spec_created_complete_is_completed_at_creation() {
        let path = Path::new("a.md");
        let mut vcs = FakeVcs::default();
        vcs.commit(path, T1, "Ada", Some(&doc("complete")));
        vcs.commit(path, T2, "Ada", Some(&doc("complete")));

        let record = derive_history(&vcs, path, full()).unwrap();
        assert_eq!(record.completed_at, Some(ts(T1)));
    }

    #[test]
    fn reopened_spec_uses_latest_completion() {
        let path = Path::new("a.md");
        let mut vcs = FakeVcs::default();
        vcs.commit(path, T1, "Ada", Some(&doc("planned")));
        vcs.commit(path, T2, "Ada", Some(&doc("complete")));
        vcs.commit(path, "2025-01-06T10:00:00Z", "Ada", Some(&doc("in-progress")));
        vcs.commit(path, T3, "Ada", Some(&doc("complete")));

        let record = derive_history(&vcs, path, full()).unwrap();
        assert_eq!(record.transitions.len(), 3);
        assert_eq!(record.completed_at, Some(ts(T3)));
    }

    #[test]
    fn untracked_file_is_reported() {
        let vcs = FakeVcs::default();
        let err = derive_history(&vcs, Path::new("new.md"), full()).unwrap_err();
        assert!(matches!(err, Error::NotTracked { .. }));
    }

    fn record() -> HistoryRecord {
        HistoryRecord {
            created_at: ts(T1),
            updated_at: ts(T3),
            completed_at: Some(ts(T3)),
            assignee: Some("Ada".to_string()),
            transitions: vec![StatusTransition {
                status: SpecStatus::Complete,
                at: ts(T3),
            }],
        }
    }

    #[test]
    fn merge_fills_absent_fields() {
        let mut meta = Metadata::default();
        let changes = merge_history(&mut meta, &record(), false);
        assert_eq!(meta.created_at, Some(ts(T1)));
        assert_eq!(meta.updated_at, Some(ts(T3)));
        assert_eq!(meta.completed_at, Some(ts(T3)));
        assert_eq!(meta.completed, Some(ts(T3).date_naive()));
        assert_eq!(meta.assignee.as_deref(), Some("Ada"));
        assert_eq!(meta.transitions.len(), 1);
        assert!(changes.iter().all(|c| c.applied && c.source == FieldSource::History));
    }

    #[test]
    fn merge_preserves_existing_values() {
        let mut meta = Metadata {
            created_at: Some(ts(T2)),
            assignee: Some("Carol".to_string()),
            ..Default::default()
        };
        let changes = merge_history(&mut meta, &record(), false);
        assert_eq!(meta.created_at, Some(ts(T2)));
        assert_eq!(meta.created, Some(ts(T1).date_naive()));
        assert_eq!(meta.assignee.as_deref(), Some("Carol"));

        let kept: Vec<_> = changes.iter().filter(|c| !c.applied).map(|c| c.field).collect();
        assert_eq!(kept, vec!["created_at", "assignee"]);
        assert!(changes
            .iter()
            .filter(|c| !c.applied)
            .all(|c| c.source == FieldSource::Existing));
    }

    #[test]
    fn merge_with_force_overwrites() {
        let mut meta = Metadata {
            created_at: Some(ts(T2)),
            assignee: Some("Carol".to_string()),
            ..Default::default()
        };
        merge_history(&mut meta, &record(), true);
        assert_eq!(meta.created_at, Some(ts(T1)));
        assert_eq!(meta.assignee.as_deref(), Some("Ada"));
    }

    #[test]
    fn blank_assignee_counts_as_absent() {
        let mut meta = Metadata {
            assignee: Some("  ".to_string()),
            ..Default::default()
        };
        merge_history(&mut meta, &record(), false);
        assert_eq!(meta.assignee.as_deref(), Some("Ada"));
    }
}
