//! Addressable edits of a spec body: heading sections and checklist items.
//!
//! The body is handled as a sequence of lines split on `\n`, so joining the
//! lines back with `\n` reproduces it exactly. Lines inside fenced code blocks
//! are never treated as headings or checklist items.

use std::ops::Range;

use crate::error::{Error, Result};

/// Depth used by the title-only section operations (`## Title`).
pub const SECTION_DEPTH: usize = 2;

const MAX_HEADING_DEPTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub line: usize,
    pub depth: usize,
    pub title: String,
}

/// A heading and the half-open line range it owns, heading line included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: Heading,
    pub range: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    pub line: usize,
    pub checked: bool,
    pub text: String,
    /// Byte offset of the marker character within the line.
    marker: usize,
}

fn body_lines(body: &str) -> Vec<&str> {
    body.split('\n').collect()
}

/// Yields `(index, line)` for every line outside fenced code blocks.
pub(crate) fn prose_lines<'a>(
    lines: &'a [&'a str],
) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    let mut fence: Option<&'a str> = None;
    lines.iter().enumerate().filter_map(move |(idx, line)| {
        let trimmed = line.trim_start();
        let opener = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m));
        match (fence, opener) {
            (None, Some(marker)) => {
                fence = Some(marker);
                None
            }
            (Some(open), Some(marker)) if open == marker => {
                fence = None;
                None
            }
            (Some(_), _) => None,
            (None, None) => Some((idx, *line)),
        }
    })
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let line = line.trim_end_matches('\r');
    let depth = line.bytes().take_while(|b| *b == b'#').count();
    if depth == 0 || depth > MAX_HEADING_DEPTH {
        return None;
    }
    let rest = &line[depth..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((depth, rest.trim()))
}

/// All headings of the body with the range each one owns.
///
/// A section ends at the first later heading of the same or shallower depth,
/// or at the end of the body. Computed in one pass with a stack of open
/// headings whose depths strictly increase from bottom to top.
pub fn sections(body: &str) -> Vec<Section> {
    let lines = body_lines(body);
    let mut found: Vec<Section> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for (idx, line) in prose_lines(&lines) {
        let Some((depth, title)) = parse_heading(line) else {
            continue;
        };
        while let Some(&top) = open.last() {
            if found[top].heading.depth < depth {
                break;
            }
            found[top].range.end = idx;
            open.pop();
        }
        open.push(found.len());
        found.push(Section {
            heading: Heading {
                line: idx,
                depth,
                title: title.to_string(),
            },
            range: idx..lines.len(),
        });
    }
    found
}

/// Line range of the first section titled `title` at `depth`.
///
/// Titles compare trimmed and case-insensitively. When several sections share
/// a title, the first one in document order wins.
pub fn find_section(body: &str, title: &str, depth: usize) -> Option<Range<usize>> {
    let wanted = title.trim().to_lowercase();
    sections(body)
        .into_iter()
        .find(|s| s.heading.depth == depth && s.heading.title.to_lowercase() == wanted)
        .map(|s| s.range)
}

fn locate(body: &str, title: &str, depth: usize) -> Result<Range<usize>> {
    find_section(body, title, depth).ok_or_else(|| Error::SectionNotFound {
        title: title.to_string(),
        spec: None,
    })
}

/// Replace the content of a `## title` section, keeping its heading.
pub fn replace_section(body: &str, title: &str, new_content: &str) -> Result<String> {
    replace_section_at(body, title, SECTION_DEPTH, new_content)
}

/// Replace the content of a section at `depth`.
///
/// The new content is trimmed and surrounded by single blank lines. Every
/// line outside the section is left untouched.
pub fn replace_section_at(
    body: &str,
    title: &str,
    depth: usize,
    new_content: &str,
) -> Result<String> {
    let range = locate(body, title, depth)?;
    let lines = body_lines(body);
    let content = new_content.trim();

    let before = &lines[..=range.start];
    let after = &lines[range.end..];
    let mut replacement = vec![""];
    if !content.is_empty() {
        replacement.extend(content.split('\n'));
        replacement.push("");
    }

    Ok([before, replacement.as_slice(), after].concat().join("\n"))
}

/// Append to a `## title` section.
pub fn append_to_section(body: &str, title: &str, new_content: &str) -> Result<String> {
    append_to_section_at(body, title, SECTION_DEPTH, new_content)
}

/// Append trimmed content after the last non-blank line of a section.
///
/// Blank lines separating the section from the next heading stay after the
/// appended content.
pub fn append_to_section_at(
    body: &str,
    title: &str,
    depth: usize,
    new_content: &str,
) -> Result<String> {
    let range = locate(body, title, depth)?;
    let content = new_content.trim();
    if content.is_empty() {
        return Ok(body.to_string());
    }
    let lines = body_lines(body);

    let content_start = range.start + 1;
    let insert_at = lines[content_start..range.end]
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(content_start, |i| content_start + i + 1);

    let addition: Vec<&str> = content.split('\n').collect();
    Ok([&lines[..insert_at], addition.as_slice(), &lines[insert_at..]]
        .concat()
        .join("\n"))
}

fn parse_checkbox(line: &str) -> Option<(usize, bool, &str)> {
    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];
    let after_bullet = rest.strip_prefix(['-', '*', '+'])?;
    let spaces = after_bullet.len() - after_bullet.trim_start_matches([' ', '\t']).len();
    if spaces == 0 {
        return None;
    }
    let boxed = &after_bullet[spaces..];
    let bytes = boxed.as_bytes();
    if bytes.len() < 3 || bytes[0] != b'[' || bytes[2] != b']' {
        return None;
    }
    let checked = match bytes[1] {
        b' ' => false,
        b'x' | b'X' => true,
        _ => return None,
    };
    let text = &boxed[3..];
    if !text.is_empty() && !text.starts_with([' ', '\t']) {
        return None;
    }
    let marker = indent + 1 + spaces + 1;
    Some((marker, checked, text.trim()))
}

/// Every checkbox item in the body, in document order.
pub fn checklist_items(body: &str) -> Vec<ChecklistItem> {
    let lines = body_lines(body);
    prose_lines(&lines)
        .filter_map(|(idx, line)| {
            parse_checkbox(line).map(|(marker, checked, text)| ChecklistItem {
                line: idx,
                checked,
                text: text.to_string(),
                marker,
            })
        })
        .collect()
}

/// Set the checkbox of the first item whose text contains `item_text`.
///
/// Matching is a case-insensitive substring search, and the first matching
/// line in document order is the one edited even when later lines also match.
/// Only the marker character changes.
pub fn toggle_checklist_item(body: &str, item_text: &str, checked: bool) -> Result<String> {
    let needle = item_text.trim().to_lowercase();
    let not_found = || Error::ItemNotFound {
        item: item_text.to_string(),
        spec: None,
    };
    if needle.is_empty() {
        return Err(not_found());
    }

    let item = checklist_items(body)
        .into_iter()
        .find(|item| item.text.to_lowercase().contains(&needle))
        .ok_or_else(not_found)?;
    if item.checked == checked {
        return Ok(body.to_string());
    }

    let lines = body_lines(body);
    let line = lines[item.line];
    let mark = if checked { "x" } else { " " };
    let updated = format!(
        "{}{}{}",
        &line[..item.marker],
        mark,
        &line[item.marker + 1..]
    );
    let rebuilt: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(idx, l)| if idx == item.line { updated.as_str() } else { *l })
        .collect();
    Ok(rebuilt.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_last_section() {
        let body = "## Overview\nfoo\n## Design\nbar";
        let result = replace_section(body, "Design", "baz").unwrap();
        assert_eq!(result, "## Overview\nfoo\n## Design\n\nbaz\n");
    }

    #[test]
    fn replace_keeps_following_sections() {
        let body = "# Title\n\n## A\nold\nold2\n\n## B\nkeep\n";
        let result = replace_section(body, "a", "  new\ncontent  ").unwrap();
        assert_eq!(result, "# Title\n\n## A\n\nnew\ncontent\n\n## B\nkeep\n");
    }

    #[test]
    fn section_owns_deeper_headings() {
        let body = "## A\ntext\n### A.1\nsub\n## B\n";
        assert_eq!(find_section(body, "A", 2), Some(0..4));
        assert_eq!(find_section(body, "A.1", 3), Some(2..4));
        assert_eq!(find_section(body, "A.1", 2), None);
    }

    #[test]
    fn shallower_heading_closes_section() {
        let body = "## A\ntext\n# Next\n";
        assert_eq!(find_section(body, "a", 2), Some(0..2));
    }

    #[test]
    fn first_duplicate_section_wins() {
        let body = "## Notes\none\n## Notes\ntwo";
        assert_eq!(find_section(body, "notes", 2), Some(0..2));
    }

    #[test]
    fn headings_inside_code_fences_are_ignored() {
        let body = "## Design\n```md\n## Fake\n```\nafter\n## Next\n";
        assert_eq!(find_section(body, "Design", 2), Some(0..5));
        assert_eq!(find_section(body, "Fake", 2), None);
    }

    #[test]
    fn missing_section_is_an_error() {
        let err = replace_section("## A\n", "B", "x").unwrap_err();
        assert!(matches!(err, Error::SectionNotFound { ref title, .. } if title == "B"));
    }

    #[test]
    fn appends_after_existing_content() {
        let body = "## A\nfoo\n\n## B\nbar";
        let result = append_to_section(body, "A", "baz").unwrap();
        assert_eq!(result, "## A\nfoo\nbaz\n\n## B\nbar");
    }

    #[test]
    fn appends_to_trailing_section() {
        let body = "## A\nfoo\n";
        assert_eq!(append_to_section(body, "A", "bar\n").unwrap(), "## A\nfoo\nbar\n");
    }

    #[test]
    fn appends_to_empty_section() {
        let body = "## A\n## B\n";
        assert_eq!(append_to_section(body, "A", "x").unwrap(), "## A\nx\n## B\n");
    }

    #[test]
    fn toggles_checklist_item() {
        let body = "## Plan\n- [ ] write tests\n- [ ] ship";
        let result = toggle_checklist_item(body, "write tests", true).unwrap();
        assert_eq!(result, "## Plan\n- [x] write tests\n- [ ] ship");
    }

    #[test]
    fn toggle_is_idempotent() {
        let body = "- [ ] Write Tests\n";
        let once = toggle_checklist_item(body, "write", true).unwrap();
        let twice = toggle_checklist_item(&once, "write", true).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn toggle_is_self_inverse() {
        let body = "  * [ ] nested item  \n";
        let on = toggle_checklist_item(body, "nested", true).unwrap();
        assert_eq!(on, "  * [x] nested item  \n");
        let off = toggle_checklist_item(&on, "nested", false).unwrap();
        assert_eq!(off, body);
    }

    // Ambiguous text resolves to the first match; later matches are never touched.
    #[test]
    fn ambiguous_item_text_edits_first_match_only() {
        let body = "- [ ] test parser\n- [ ] test editor\n";
        let result = toggle_checklist_item(body, "test", true).unwrap();
        assert_eq!(result, "- [x] test parser\n- [ ] test editor\n");
    }

    #[test]
    fn missing_item_is_an_error() {
        let err = toggle_checklist_item("- [ ] a\n", "zzz", true).unwrap_err();
        assert!(matches!(err, Error::ItemNotFound { .. }));
        let err = toggle_checklist_item("- [ ] a\n", "  ", true).unwrap_err();
        assert!(matches!(err, Error::ItemNotFound { .. }));
    }

    #[test]
    fn lists_checklist_items_outside_code() {
        let body = "- [x] done\n```\n- [ ] in code\n```\n- [ ] todo\n-[ ] not an item\n";
        let items = checklist_items(body);
        assert_eq!(items.len(), 2);
        assert!(items[0].checked);
        assert_eq!(items[1].text, "todo");
        assert_eq!(items[1].line, 4);
    }
}
