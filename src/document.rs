//! Header/body split of spec documents.
//!
//! A spec file optionally starts with a YAML frontmatter block delimited by
//! `---` lines. Everything after the closing marker is the markdown body.
//! The raw header block is kept byte-for-byte so that `join(split(c)) == c`.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::Metadata;

pub const FRONTMATTER_MARKER: &str = "---";

const BOM: char = '\u{feff}';

const DEPENDS_ON: &str = "depends_on";
const DEPENDS_ON_CAMEL: &str = "dependsOn";

/// The frontmatter block of a document: its exact text plus parsed metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    raw: String,
    metadata: Metadata,
    /// Spelling of the dependency key, `depends_on` or `dependsOn`.
    depends_on_key: &'static str,
}

impl Header {
    /// Render a fresh header block from metadata.
    pub fn from_metadata(metadata: Metadata) -> Result<Self> {
        Self::render(metadata, DEPENDS_ON)
    }

    /// Render `metadata` keeping the key spellings this header was written with.
    pub fn rewrite(&self, metadata: Metadata) -> Result<Self> {
        Self::render(metadata, self.depends_on_key)
    }

    fn render(metadata: Metadata, depends_on_key: &'static str) -> Result<Self> {
        metadata.validate()?;
        let mut value =
            serde_yaml::to_value(&metadata).map_err(|e| Error::schema(e.to_string()))?;
        if depends_on_key != DEPENDS_ON {
            if let serde_yaml::Value::Mapping(mapping) = value {
                value = serde_yaml::Value::Mapping(
                    mapping
                        .into_iter()
                        .map(|(k, v)| match k.as_str() {
                            Some(DEPENDS_ON) => (depends_on_key.into(), v),
                            _ => (k, v),
                        })
                        .collect(),
                );
            }
        }
        let yaml = serde_yaml::to_string(&value).map_err(|e| Error::schema(e.to_string()))?;
        let raw = if yaml.trim() == "{}" {
            format!("{m}\n{m}\n", m = FRONTMATTER_MARKER)
        } else {
            format!("{m}\n{yaml}{m}\n", m = FRONTMATTER_MARKER)
        };
        Ok(Self {
            raw,
            metadata,
            depends_on_key,
        })
    }

    /// The block exactly as it appears in the file, markers included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Split a document into its header (if any) and body.
///
/// A header exists only when the first line is `---` and a later line is
/// `---` as well; otherwise the whole content is body. The closing marker
/// may be the last line of the file with no trailing newline.
pub fn split(content: &str) -> Result<(Option<Header>, &str)> {
    let Some(bounds) = header_bounds(content) else {
        return Ok((None, content));
    };
    let yaml = &content[bounds.yaml_start..bounds.yaml_end];
    let (metadata, depends_on_key) = parse_metadata(yaml)?;
    let header = Header {
        raw: content[..bounds.block_end].to_string(),
        metadata,
        depends_on_key,
    };
    Ok((Some(header), &content[bounds.block_end..]))
}

/// Inverse of [`split`].
pub fn join(header: Option<&Header>, body: &str) -> String {
    match header {
        Some(header) => {
            let mut out = String::with_capacity(header.raw.len() + body.len());
            out.push_str(&header.raw);
            out.push_str(body);
            out
        }
        None => body.to_string(),
    }
}

/// Content digest used for optimistic concurrency checks.
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

struct HeaderBounds {
    yaml_start: usize,
    yaml_end: usize,
    block_end: usize,
}

fn header_bounds(content: &str) -> Option<HeaderBounds> {
    let start = if content.starts_with(BOM) {
        BOM.len_utf8()
    } else {
        0
    };
    let first_end = start + content[start..].find('\n')?;
    if content[start..first_end].trim_end() != FRONTMATTER_MARKER {
        return None;
    }

    let yaml_start = first_end + 1;
    let mut pos = yaml_start;
    loop {
        let line_end = content[pos..].find('\n').map(|i| pos + i);
        let line = &content[pos..line_end.unwrap_or(content.len())];
        if line.trim_end() == FRONTMATTER_MARKER {
            return Some(HeaderBounds {
                yaml_start,
                yaml_end: pos,
                block_end: line_end.map_or(content.len(), |i| i + 1),
            });
        }
        pos = line_end? + 1;
    }
}

fn parse_metadata(yaml: &str) -> Result<(Metadata, &'static str)> {
    if yaml.trim().is_empty() {
        return Ok((Metadata::default(), DEPENDS_ON));
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| Error::schema(e.to_string()))?;
    if value.is_null() {
        return Ok((Metadata::default(), DEPENDS_ON));
    }
    let depends_on_key = match (value.get(DEPENDS_ON), value.get(DEPENDS_ON_CAMEL)) {
        (None, Some(_)) => DEPENDS_ON_CAMEL,
        _ => DEPENDS_ON,
    };
    let metadata: Metadata =
        serde_yaml::from_value(value).map_err(|e| Error::schema(e.to_string()))?;
    metadata.validate()?;
    Ok((metadata, depends_on_key))
}

/// A parsed spec document.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocument {
    pub header: Option<Header>,
    pub body: String,
    /// Digest of the serialized document, kept in sync with `header` and `body`.
    pub fingerprint: String,
}

impl SpecDocument {
    pub fn parse(content: &str) -> Result<Self> {
        let (header, body) = split(content)?;
        Ok(Self {
            header,
            body: body.to_string(),
            fingerprint: fingerprint(content),
        })
    }

    pub fn to_content(&self) -> String {
        join(self.header.as_ref(), &self.body)
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.header.as_ref().map(Header::metadata)
    }

    /// True when the header has both `status` and `created`.
    pub fn is_valid(&self) -> bool {
        self.metadata().is_some_and(Metadata::is_valid)
    }

    /// Text of the first level-1 heading in the body.
    pub fn title(&self) -> Option<&str> {
        self.body
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Replace the metadata, regenerating the header block.
    pub fn set_metadata(&mut self, metadata: Metadata) -> Result<()> {
        let header = match &self.header {
            Some(old) => old.rewrite(metadata)?,
            None => Header::from_metadata(metadata)?,
        };
        self.header = Some(header);
        self.refresh_fingerprint();
        Ok(())
    }

    pub fn set_body(&mut self, body: String) {
        self.body = body;
        self.refresh_fingerprint();
    }

    fn refresh_fingerprint(&mut self) {
        self.fingerprint = fingerprint(&self.to_content());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SpecPriority, SpecStatus};

    fn round_trip(content: &str) {
        let (header, body) = split(content).expect("split");
        assert_eq!(join(header.as_ref(), body), content);
    }

    #[test]
    fn round_trips_documents() {
        round_trip("");
        round_trip("# Title\n");
        round_trip("# Title\n\n## Overview\nfoo\n\n## Design\nbar");
        round_trip("---\nstatus: planned\ncreated: 2025-01-02\n---\n# Title\n");
        round_trip("---\nstatus: planned\n---");
        round_trip("---\nstatus: planned\r\n---\r\n# CRLF\r\n");
        round_trip("\u{feff}---\npriority: high\n---\nbody");
    }

    #[test]
    fn parses_recognized_fields() {
        let content = "---\nstatus: in-progress\ncreated: '2025-01-02'\npriority: critical\ntags:\n  - api\n  - cli\ndependsOn:\n  - 001-base\nowner_team: core\n---\n# Title\n";
        let (header, body) = split(content).unwrap();
        let meta = header.unwrap().metadata().clone();
        assert_eq!(meta.status, Some(SpecStatus::InProgress));
        assert_eq!(meta.priority, Some(SpecPriority::Critical));
        assert_eq!(meta.tags, vec!["api", "cli"]);
        assert_eq!(meta.depends_on, vec!["001-base"]);
        assert!(meta.extra.contains_key("owner_team"));
        assert_eq!(body, "# Title\n");
    }

    #[test]
    fn missing_closing_marker_means_no_header() {
        let content = "---\nstatus: planned\n# Title\n";
        let (header, body) = split(content).unwrap();
        assert!(header.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn rejects_unknown_priority() {
        let err = split("---\npriority: urgent\n---\n").unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn rejects_malformed_date() {
        let err = split("---\ncreated: next tuesday\n---\n").unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn empty_header_is_allowed() {
        let (header, body) = split("---\n---\nbody").unwrap();
        assert_eq!(header.unwrap().metadata(), &Metadata::default());
        assert_eq!(body, "body");
    }

    #[test]
    fn fingerprint_is_deterministic_and_content_sensitive() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("").len(), 64);
    }

    #[test]
    fn validity_requires_status_and_created() {
        let doc = SpecDocument::parse("---\nstatus: planned\n---\n").unwrap();
        assert!(!doc.is_valid());
        let doc = SpecDocument::parse("---\nstatus: planned\ncreated: 2025-01-02\n---\n").unwrap();
        assert!(doc.is_valid());
        let doc = SpecDocument::parse("# No header\n").unwrap();
        assert!(!doc.is_valid());
    }

    #[test]
    fn set_metadata_preserves_unknown_keys_and_body() {
        let mut doc =
            SpecDocument::parse("---\nstatus: planned\nreviewer: sam\n---\n# Title\nBody\n")
                .unwrap();
        let before = doc.fingerprint.clone();
        let mut meta = doc.metadata().unwrap().clone();
        meta.status = Some(SpecStatus::Complete);
        doc.set_metadata(meta).unwrap();

        let content = doc.to_content();
        assert!(content.starts_with("---\n"));
        assert!(content.contains("status: complete"));
        assert!(content.contains("reviewer: sam"));
        assert!(content.ends_with("---\n# Title\nBody\n"));
        assert_ne!(doc.fingerprint, before);
        assert_eq!(doc.fingerprint, fingerprint(&content));

        let reparsed = SpecDocument::parse(&content).unwrap();
        assert_eq!(reparsed.metadata(), doc.metadata());
    }

    #[test]
    fn set_metadata_keeps_the_dependency_key_spelling() {
        let mut doc =
            SpecDocument::parse("---\nstatus: planned\ndependsOn:\n- 001-base\n---\n# Title\n")
                .unwrap();
        let mut meta = doc.metadata().unwrap().clone();
        meta.status = Some(SpecStatus::InProgress);
        meta.depends_on.push("002-api".to_string());
        doc.set_metadata(meta).unwrap();

        let content = doc.to_content();
        assert!(content.contains("dependsOn:\n- 001-base\n- 002-api\n"), "{}", content);
        assert!(!content.contains("depends_on"));
        let reparsed = SpecDocument::parse(&content).unwrap();
        assert_eq!(reparsed.metadata().unwrap().depends_on, vec!["001-base", "002-api"]);

        let mut fresh = SpecDocument::parse("# Title\n").unwrap();
        fresh
            .set_metadata(Metadata {
                depends_on: vec!["001-base".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert!(fresh.to_content().contains("depends_on:"));
    }

    #[test]
    fn title_comes_from_first_h1() {
        let doc = SpecDocument::parse("---\n---\n## Not this\n# Real Title\n").unwrap();
        assert_eq!(doc.title(), Some("Real Title"));
    }
}
