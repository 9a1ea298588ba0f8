//! ASCII tree rendering for spec hierarchies.

use crate::models::{HierarchyNode, SpecStatus};

const PLANNED: char = '○';
const IN_PROGRESS: char = '◐';
const COMPLETE: char = '●';
const ARCHIVED: char = '✗';
const UNKNOWN: char = '·';

fn status_symbol(status: Option<SpecStatus>) -> char {
    match status {
        Some(SpecStatus::Planned) => PLANNED,
        Some(SpecStatus::InProgress) => IN_PROGRESS,
        Some(SpecStatus::Complete) => COMPLETE,
        Some(SpecStatus::Archived) => ARCHIVED,
        None => UNKNOWN,
    }
}

/// Render a spec hierarchy as ASCII art with status symbols.
///
/// Example output:
/// ```text
/// ◐ 001-auth: Authentication
/// ├── ● 002-password-login: Password Login
/// ├── ○ 003-oauth: OAuth Integration
/// │   └── ○ 004-google: Google Provider
/// └── ✗ 005-basic-auth: Legacy Basic Auth
/// ```
pub fn render_tree(nodes: &[HierarchyNode]) -> String {
    let mut output = String::new();
    for node in nodes {
        render_node(&mut output, node, "", true, true);
    }
    output
}

fn label(node: &HierarchyNode) -> String {
    let spec = &node.spec;
    let symbol = status_symbol(spec.status);
    if spec.title == spec.id {
        format!("{} {}", symbol, spec.id)
    } else {
        format!("{} {}: {}", symbol, spec.id, spec.title)
    }
}

fn render_node(
    output: &mut String,
    node: &HierarchyNode,
    prefix: &str,
    is_last: bool,
    is_root: bool,
) {
    if !is_root {
        output.push_str(prefix);
        output.push_str(if is_last { "└── " } else { "├── " });
    }
    output.push_str(&label(node));
    output.push('\n');

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpecSummary;

    fn make_node(
        id: &str,
        title: &str,
        status: Option<SpecStatus>,
        children: Vec<HierarchyNode>,
    ) -> HierarchyNode {
        HierarchyNode {
            spec: SpecSummary {
                title: title.to_string(),
                status,
                ..SpecSummary::new(id)
            },
            children,
        }
    }

    #[test]
    fn test_single_root() {
        let tree = vec![make_node(
            "001-auth",
            "Authentication",
            Some(SpecStatus::Planned),
            vec![],
        )];
        assert_eq!(render_tree(&tree), "○ 001-auth: Authentication\n");
    }

    #[test]
    fn test_untitled_spec_shows_id_only() {
        let tree = vec![make_node("notes", "notes", None, vec![])];
        assert_eq!(render_tree(&tree), "· notes\n");
    }

    #[test]
    fn test_nested_children() {
        let tree = vec![
            make_node(
                "001-auth",
                "Authentication",
                Some(SpecStatus::InProgress),
                vec![
                    make_node("002-password", "Password Login", Some(SpecStatus::Complete), vec![]),
                    make_node(
                        "003-oauth",
                        "OAuth Integration",
                        Some(SpecStatus::Planned),
                        vec![
                            make_node("004-google", "Google", Some(SpecStatus::Planned), vec![]),
                            make_node("005-github", "GitHub", None, vec![]),
                        ],
                    ),
                    make_node("006-basic", "Basic Auth", Some(SpecStatus::Archived), vec![]),
                ],
            ),
            make_node("007-billing", "Billing", Some(SpecStatus::Planned), vec![]),
        ];
        let expected = "◐ 001-auth: Authentication\n\
                        ├── ● 002-password: Password Login\n\
                        ├── ○ 003-oauth: OAuth Integration\n\
                        │   ├── ○ 004-google: Google\n\
                        │   └── · 005-github: GitHub\n\
                        └── ✗ 006-basic: Basic Auth\n\
                        ○ 007-billing: Billing\n";
        assert_eq!(render_tree(&tree), expected);
    }
}
