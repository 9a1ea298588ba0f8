use chrono::NaiveDate;

use crate::editor::prose_lines;
use crate::models::*;

/// Status and creation date read from inline labels in a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyMarkers {
    pub status: Option<SpecStatus>,
    pub created: Option<NaiveDate>,
}

/// Phrases accepted after a `Status:` label, checked in order.
const STATUS_PHRASES: &[(&str, SpecStatus)] = &[
    ("in progress", SpecStatus::InProgress),
    ("wip", SpecStatus::InProgress),
    ("active", SpecStatus::InProgress),
    ("complete", SpecStatus::Complete),
    ("done", SpecStatus::Complete),
    ("finished", SpecStatus::Complete),
    ("implemented", SpecStatus::Complete),
    ("archived", SpecStatus::Archived),
    ("deprecated", SpecStatus::Archived),
    ("superseded", SpecStatus::Archived),
    ("planned", SpecStatus::Planned),
    ("draft", SpecStatus::Planned),
    ("todo", SpecStatus::Planned),
    ("proposed", SpecStatus::Planned),
    ("not started", SpecStatus::Planned),
];

/// Scan a body for `Status:` and `Created:` labels.
///
/// Labels may be bold (`**Status**: Done`), quoted or list items, and the
/// value may carry a leading emoji. The first recognizable value wins.
pub fn scan_body_markers(body: &str) -> BodyMarkers {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut markers = BodyMarkers::default();

    for (_, line) in prose_lines(&lines) {
        let Some((label, value)) = label_value(line) else {
            continue;
        };
        match label.as_str() {
            "status" if markers.status.is_none() => markers.status = parse_status_phrase(value),
            "created" | "date created" if markers.created.is_none() => {
                markers.created = find_date(value)
            }
            _ => {}
        }
        if markers.status.is_some() && markers.created.is_some() {
            break;
        }
    }
    markers
}

fn label_value(line: &str) -> Option<(String, &str)> {
    let stripped = line.trim().trim_start_matches(['>', '-', '*', '+', ' ']);
    let (label, value) = stripped.split_once(':')?;
    let label = label.replace(['*', '_'], "").trim().to_lowercase();
    let value = value.trim_start_matches(['*', '_']).trim();
    (!label.is_empty() && !value.is_empty()).then_some((label, value))
}

fn parse_status_phrase(value: &str) -> Option<SpecStatus> {
    let words: String = value
        .chars()
        .map(|c| match c {
            '-' | '_' => ' ',
            c if c.is_alphanumeric() => c.to_ascii_lowercase(),
            _ => ' ',
        })
        .collect();
    let normalized = words.split_whitespace().collect::<Vec<_>>().join(" ");
    STATUS_PHRASES
        .iter()
        .find(|(phrase, _)| normalized.starts_with(phrase))
        .map(|(_, status)| *status)
}

fn find_date(value: &str) -> Option<NaiveDate> {
    value
        .char_indices()
        .filter(|(_, c)| c.is_ascii_digit())
        .find_map(|(i, _)| {
            let candidate = value.get(i..i + 10)?;
            NaiveDate::parse_from_str(candidate, "%Y-%m-%d").ok()
        })
}

/// Synthesize a valid header for a spec that has none or an incomplete one.
///
/// `status` and `created` are taken, in order of preference, from the
/// existing partial header, inline body labels, derived history, and finally
/// the defaults `planned` and `today`. Other existing fields are kept.
pub fn bootstrap_metadata(
    existing: Option<&Metadata>,
    body: &str,
    history: Option<&HistoryRecord>,
    today: NaiveDate,
) -> (Metadata, Vec<FieldChange>) {
    let mut meta = existing.cloned().unwrap_or_default();
    let markers = scan_body_markers(body);
    let mut changes = Vec::new();

    let history_status = history.and_then(|h| h.transitions.last()).map(|t| t.status);
    let (status, source) = pick(meta.status, markers.status, history_status, SpecStatus::Planned);
    changes.push(audit("status", status.as_str().to_string(), source));
    meta.status = Some(status);

    let history_created = history.map(|h| h.created_at.date_naive());
    let (created, source) = pick(meta.created, markers.created, history_created, today);
    changes.push(audit("created", created.to_string(), source));
    meta.created = Some(created);

    (meta, changes)
}

fn pick<T>(
    existing: Option<T>,
    marker: Option<T>,
    history: Option<T>,
    default: T,
) -> (T, FieldSource) {
    existing
        .map(|v| (v, FieldSource::Existing))
        .or_else(|| marker.map(|v| (v, FieldSource::BodyMarker)))
        .or_else(|| history.map(|v| (v, FieldSource::History)))
        .unwrap_or((default, FieldSource::Default))
}

fn audit(field: &'static str, value: String, source: FieldSource) -> FieldChange {
    match source {
        FieldSource::Existing => FieldChange::kept(field, value),
        source => FieldChange::set(field, value, source),
    }
}
