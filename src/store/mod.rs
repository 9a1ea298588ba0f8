//! Spec store: resolves spec identifiers to files and applies edits to them.
//!
//! Every mutation reads the document, computes the new content, and writes it
//! back through the fingerprint-checked path using the fingerprint it read, so
//! an edit never silently overwrites a change made in between. Callers may
//! pass their own expected fingerprint (the `contentHash` they were shown) to
//! extend that guarantee across a round trip.

pub mod atomic;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::document::{fingerprint, SpecDocument};
use crate::editor;
use crate::error::{Error, Result};
use crate::models::*;

/// A spec directory with its main document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecEntry {
    /// Directory name, e.g. `007-auth-flow`.
    pub id: String,
    pub number: Option<u32>,
    pub dir: PathBuf,
    pub path: PathBuf,
}

impl SpecEntry {
    /// The part of the id after the numeric prefix.
    pub fn short_name(&self) -> &str {
        let digits = self.id.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return &self.id;
        }
        self.id[digits..].trim_start_matches(['-', '_'])
    }
}

/// Raw file content plus its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSpec {
    pub id: String,
    pub path: PathBuf,
    pub content: String,
    pub content_hash: String,
}

/// Partial metadata update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub status: Option<SpecStatus>,
    pub priority: Option<SpecPriority>,
    pub tags: Option<Vec<String>>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpecStore {
    config: EngineConfig,
}

impl SpecStore {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ============================================================
    // Discovery
    // ============================================================

    /// All spec directories containing the main document, in natural id order.
    pub fn list(&self) -> Result<Vec<SpecEntry>> {
        let root = &self.config.specs_dir;
        let dir = match fs::read_dir(root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Specs directory {} does not exist", root.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(Error::Read {
                    path: root.clone(),
                    source,
                })
            }
        };

        let mut entries = Vec::new();
        for item in dir {
            let item = item.map_err(|source| Error::Read {
                path: root.clone(),
                source,
            })?;
            let id = item.file_name().to_string_lossy().into_owned();
            let dir = item.path();
            let path = dir.join(&self.config.readme_filename);
            if id.starts_with('.') || !dir.is_dir() || !path.is_file() {
                continue;
            }
            entries.push(SpecEntry {
                number: parse_spec_number(&id),
                id,
                dir,
                path,
            });
        }
        entries.sort_by(|a, b| match (a.number, b.number) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        Ok(entries)
    }

    /// Find a spec by directory name, number (`7` or `007`), or short name.
    pub fn resolve(&self, query: &str) -> Result<SpecEntry> {
        let query = query.trim().trim_end_matches('/');
        let entries = self.list()?;

        let found = entries
            .iter()
            .find(|e| e.id == query)
            .or_else(|| {
                let number: u32 = query.parse().ok()?;
                entries.iter().find(|e| e.number == Some(number))
            })
            .or_else(|| entries.iter().find(|e| e.short_name() == query));

        found
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("spec '{}'", query)))
    }

    pub fn load(&self, id: &str) -> Result<(SpecEntry, SpecDocument)> {
        let entry = self.resolve(id)?;
        let (content, _) = atomic::read_with_fingerprint(&entry.path)?;
        let doc = SpecDocument::parse(&content).map_err(|e| e.at_path(&entry.path))?;
        Ok((entry, doc))
    }

    /// Summaries of every spec for graph building.
    ///
    /// Specs whose header cannot be parsed are still listed, without metadata,
    /// so they remain visible in trees.
    pub fn summaries(&self) -> Result<Vec<SpecSummary>> {
        let mut summaries = Vec::new();
        for entry in self.list()? {
            let (content, _) = atomic::read_with_fingerprint(&entry.path)?;
            match SpecDocument::parse(&content) {
                Ok(doc) => summaries.push(SpecSummary::from_document(&entry.id, &doc)),
                Err(e) => {
                    tracing::warn!("Skipping metadata of {}: {}", entry.id, e);
                    summaries.push(SpecSummary::new(entry.id.as_str()));
                }
            }
        }
        Ok(summaries)
    }

    // ============================================================
    // Raw access
    // ============================================================

    pub fn get_raw(&self, id: &str) -> Result<RawSpec> {
        let entry = self.resolve(id)?;
        Self::read_raw(entry.id, entry.path)
    }

    /// Overwrite the main document. `expected` enables the conflict check.
    pub fn update_raw(&self, id: &str, content: &str, expected: Option<&str>) -> Result<String> {
        let entry = self.resolve(id)?;
        Self::write_raw(&entry.path, content, expected)
    }

    /// Read another file in the spec directory, e.g. `DESIGN.md`.
    pub fn get_sub_raw(&self, id: &str, file: &str) -> Result<RawSpec> {
        let entry = self.resolve(id)?;
        let path = Self::sub_path(&entry, file)?;
        Self::read_raw(entry.id, path)
    }

    /// Write another file in the spec directory. Without `expected` the file
    /// is created if missing.
    pub fn update_sub_raw(
        &self,
        id: &str,
        file: &str,
        content: &str,
        expected: Option<&str>,
    ) -> Result<String> {
        let entry = self.resolve(id)?;
        let path = Self::sub_path(&entry, file)?;
        Self::write_raw(&path, content, expected)
    }

    fn read_raw(id: String, path: PathBuf) -> Result<RawSpec> {
        let (content, content_hash) = atomic::read_with_fingerprint(&path)?;
        Ok(RawSpec {
            id,
            path,
            content,
            content_hash,
        })
    }

    fn write_raw(path: &Path, content: &str, expected: Option<&str>) -> Result<String> {
        match expected {
            Some(expected) => atomic::write_with_expected_fingerprint(path, content, expected),
            None => {
                atomic::write_atomic(path, content)?;
                Ok(fingerprint(content))
            }
        }
    }

    fn sub_path(entry: &SpecEntry, file: &str) -> Result<PathBuf> {
        let plain = !file.is_empty()
            && file != "."
            && file != ".."
            && !file.contains(['/', '\\'])
            && Path::new(file).file_name().is_some_and(|n| n == file);
        if !plain {
            return Err(Error::InvalidPath(file.to_string()));
        }
        Ok(entry.dir.join(file))
    }

    // ============================================================
    // Structured edits
    // ============================================================

    /// Replace the content of a `## section`.
    pub fn update_section(
        &self,
        id: &str,
        section: &str,
        content: &str,
        expected: Option<&str>,
    ) -> Result<String> {
        self.edit_body(id, expected, |body| {
            editor::replace_section(body, section, content)
        })
    }

    /// Append to the content of a `## section`.
    pub fn append_section(
        &self,
        id: &str,
        section: &str,
        content: &str,
        expected: Option<&str>,
    ) -> Result<String> {
        self.edit_body(id, expected, |body| {
            editor::append_to_section(body, section, content)
        })
    }

    pub fn toggle_checklist(
        &self,
        id: &str,
        item: &str,
        checked: bool,
        expected: Option<&str>,
    ) -> Result<String> {
        self.edit_body(id, expected, |body| {
            editor::toggle_checklist_item(body, item, checked)
        })
    }

    /// Apply a partial metadata update.
    ///
    /// A status change records a transition and stamps `updated_at`; moving
    /// into `complete` also stamps `completed_at`. A spec without a header
    /// gets one with today's creation date.
    pub fn update_metadata(
        &self,
        id: &str,
        update: MetadataUpdate,
        expected: Option<&str>,
    ) -> Result<String> {
        let (entry, mut doc) = self.load(id)?;
        let base = Self::check_expected(&entry, &doc, expected)?;

        let now = Utc::now();
        let mut meta = doc.metadata().cloned().unwrap_or_else(|| Metadata {
            created: Some(Local::now().date_naive()),
            created_at: Some(now),
            ..Default::default()
        });

        if let Some(status) = update.status.filter(|s| meta.status != Some(*s)) {
            meta.status = Some(status);
            meta.transitions.push(StatusTransition { status, at: now });
            if status == SpecStatus::Complete {
                meta.completed_at = Some(now);
                meta.completed = Some(now.date_naive());
            }
        }
        if let Some(priority) = update.priority {
            meta.priority = Some(priority);
        }
        if let Some(tags) = update.tags {
            meta.tags = tags;
        }
        if let Some(assignee) = update.assignee {
            meta.assignee = Some(assignee).filter(|a| !a.trim().is_empty());
        }
        if doc.metadata() == Some(&meta) {
            return Ok(base);
        }
        meta.updated_at = Some(now);
        meta.updated = Some(now.date_naive());

        doc.set_metadata(meta).map_err(|e| e.at_path(&entry.path))?;
        self.write_document(&entry, &doc, &base)
    }

    /// Write a document over the version with fingerprint `base`.
    pub fn write_document(
        &self,
        entry: &SpecEntry,
        doc: &SpecDocument,
        base: &str,
    ) -> Result<String> {
        let hash = atomic::write_with_expected_fingerprint(&entry.path, &doc.to_content(), base)?;
        tracing::info!("Updated spec {}", entry.id);
        Ok(hash)
    }

    fn edit_body(
        &self,
        id: &str,
        expected: Option<&str>,
        edit: impl FnOnce(&str) -> Result<String>,
    ) -> Result<String> {
        let (entry, mut doc) = self.load(id)?;
        let base = Self::check_expected(&entry, &doc, expected)?;

        let body = edit(&doc.body).map_err(|e| e.in_spec(&entry.id))?;
        if body == doc.body {
            return Ok(base);
        }
        doc.set_body(body);
        self.write_document(&entry, &doc, &base)
    }

    fn check_expected(
        entry: &SpecEntry,
        doc: &SpecDocument,
        expected: Option<&str>,
    ) -> Result<String> {
        match expected {
            Some(expected) if expected != doc.fingerprint => Err(Error::Conflict {
                path: entry.path.clone(),
                expected: expected.to_string(),
                actual: doc.fingerprint.clone(),
            }),
            _ => Ok(doc.fingerprint.clone()),
        }
    }
}
