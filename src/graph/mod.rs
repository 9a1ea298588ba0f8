//! Parent/child trees and dependency graphs built from spec summaries.
//!
//! Both builders are pure functions over metadata already loaded in bulk;
//! nothing here touches the filesystem.

mod tree_render;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use tree_render::render_tree;

use crate::error::{Error, Result};
use crate::models::*;

/// Ordering applied to roots and to every node's children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    IdAsc,
    IdDesc,
    /// Most recently updated first; undated specs last.
    Updated,
    /// Case-insensitive title.
    Title,
    /// Critical first; specs without a priority last.
    Priority,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdAsc => "id-asc",
            Self::IdDesc => "id-desc",
            Self::Updated => "updated",
            Self::Title => "title",
            Self::Priority => "priority",
        }
    }

    /// Compare two specs, breaking ties by identifier descending.
    pub fn compare(&self, a: &SpecSummary, b: &SpecSummary) -> Ordering {
        let primary = match self {
            Self::IdAsc => a.cmp_id(b),
            Self::IdDesc => b.cmp_id(a),
            Self::Updated => match (a.updated_at, b.updated_at) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            Self::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            Self::Priority => {
                let rank = |s: &SpecSummary| s.priority.map_or(0, |p| p.rank());
                rank(b).cmp(&rank(a))
            }
        };
        primary.then_with(|| b.cmp_id(a))
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "id-asc" | "id" => Ok(Self::IdAsc),
            "id-desc" => Ok(Self::IdDesc),
            "updated" => Ok(Self::Updated),
            "title" => Ok(Self::Title),
            "priority" => Ok(Self::Priority),
            other => Err(format!(
                "invalid sort order '{}'; expected id-asc, id-desc, updated, title or priority",
                other
            )),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup of spec references (`007-auth`, `007`, `7`) to positions in a slice.
struct SpecIndex<'a> {
    specs: &'a [SpecSummary],
    by_id: HashMap<&'a str, usize>,
    by_number: HashMap<u32, usize>,
}

impl<'a> SpecIndex<'a> {
    fn new(specs: &'a [SpecSummary]) -> Self {
        let mut by_id = HashMap::new();
        let mut by_number = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            by_id.entry(spec.id.as_str()).or_insert(i);
            if let Some(number) = spec.number {
                by_number.entry(number).or_insert(i);
            }
        }
        Self {
            specs,
            by_id,
            by_number,
        }
    }

    fn resolve(&self, reference: &str) -> Option<usize> {
        let reference = reference.trim();
        if let Some(&i) = self.by_id.get(reference) {
            return Some(i);
        }
        if reference.is_empty() || !reference.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        reference
            .parse::<u32>()
            .ok()
            .and_then(|n| self.by_number.get(&n).copied())
    }
}

/// Arrange specs into a forest by their `parent` field.
///
/// A spec whose parent is missing from `specs`, or is itself, becomes a root.
/// Parent cycles have no root to hang from; the member with the lowest
/// identifier is promoted to a root so every spec appears exactly once.
pub fn build_hierarchy(specs: &[SpecSummary], order: SortOrder) -> Vec<HierarchyNode> {
    let index = SpecIndex::new(specs);
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    let mut roots = Vec::new();

    for (i, spec) in specs.iter().enumerate() {
        let parent = spec
            .parent
            .as_deref()
            .and_then(|p| index.resolve(p))
            .filter(|&p| p != i);
        match parent {
            Some(p) => children[p].push(i),
            None => roots.push(i),
        }
    }

    let mut reached = vec![false; specs.len()];
    for &root in &roots {
        mark_reached(root, &children, &mut reached);
    }

    let mut stranded: Vec<usize> = (0..specs.len()).filter(|&i| !reached[i]).collect();
    stranded.sort_by(|&a, &b| specs[a].cmp_id(&specs[b]));
    for i in stranded {
        if reached[i] {
            continue;
        }
        tracing::debug!("Parent cycle through {}, promoting it to a root", specs[i].id);
        for list in children.iter_mut() {
            list.retain(|&c| c != i);
        }
        roots.push(i);
        mark_reached(i, &children, &mut reached);
    }

    let mut nodes: Vec<HierarchyNode> = roots
        .into_iter()
        .map(|i| build_node(i, specs, &children, order))
        .collect();
    nodes.sort_by(|a, b| order.compare(&a.spec, &b.spec));
    nodes
}

fn mark_reached(start: usize, children: &[Vec<usize>], reached: &mut [bool]) {
    let mut stack = vec![start];
    while let Some(i) = stack.pop() {
        if reached[i] {
            continue;
        }
        reached[i] = true;
        stack.extend(children[i].iter().copied());
    }
}

fn build_node(
    i: usize,
    specs: &[SpecSummary],
    children: &[Vec<usize>],
    order: SortOrder,
) -> HierarchyNode {
    let mut nodes: Vec<HierarchyNode> = children[i]
        .iter()
        .map(|&c| build_node(c, specs, children, order))
        .collect();
    nodes.sort_by(|a, b| order.compare(&a.spec, &b.spec));
    HierarchyNode {
        spec: specs[i].clone(),
        children: nodes,
    }
}

/// What to do with a `depends_on` entry that names itself or no known spec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    /// Emit the edge as written.
    #[default]
    Keep,
    /// Drop the edge.
    Prune,
    /// Fail with [`Error::InvalidDependency`].
    Reject,
}

impl FromStr for EdgePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Self::Keep),
            "prune" => Ok(Self::Prune),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "invalid edge policy '{}'; expected keep, prune or reject",
                other
            )),
        }
    }
}

/// One edge per `depends_on` entry, in input order.
///
/// Targets that resolve to a known spec are rewritten to its full id. No
/// deduplication or cycle detection is done.
pub fn build_dependency_graph(
    specs: &[SpecSummary],
    policy: EdgePolicy,
) -> Result<DependencyGraph> {
    let index = SpecIndex::new(specs);
    let mut graph = DependencyGraph {
        nodes: specs
            .iter()
            .map(|s| SpecRef {
                id: s.id.clone(),
                title: s.title.clone(),
                status: s.status,
            })
            .collect(),
        edges: Vec::new(),
    };

    for (i, spec) in specs.iter().enumerate() {
        for reference in &spec.depends_on {
            let resolved = index.resolve(reference);
            let problem = match resolved {
                Some(j) if j == i => Some("depends on itself"),
                Some(_) => None,
                None => Some("no such spec"),
            };
            let target = resolved.map_or_else(
                || reference.trim().to_string(),
                |j| index.specs[j].id.clone(),
            );

            match (problem, policy) {
                (Some(reason), EdgePolicy::Reject) => {
                    return Err(Error::InvalidDependency {
                        source_id: spec.id.clone(),
                        target,
                        reason: reason.to_string(),
                    })
                }
                (Some(reason), EdgePolicy::Prune) => {
                    tracing::debug!("Pruned dependency {} -> {}: {}", spec.id, target, reason);
                }
                _ => graph.edges.push(DependencyEdge {
                    source: spec.id.clone(),
                    target,
                }),
            }
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn spec(id: &str, parent: Option<&str>) -> SpecSummary {
        SpecSummary {
            parent: parent.map(str::to_string),
            ..SpecSummary::new(id)
        }
    }

    fn ids(nodes: &[HierarchyNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.spec.id.as_str()).collect()
    }

    fn count(nodes: &[HierarchyNode]) -> usize {
        nodes.iter().map(|n| 1 + count(&n.children)).sum()
    }

    #[test]
    fn attaches_children_and_roots_orphans() {
        let specs = vec![spec("1", None), spec("2", Some("1")), spec("3", Some("99"))];
        let roots = build_hierarchy(&specs, SortOrder::IdAsc);
        assert_eq!(ids(&roots), vec!["1", "3"]);
        assert_eq!(ids(&roots[0].children), vec!["2"]);
        assert!(roots[1].children.is_empty());
    }

    #[test]
    fn parent_may_be_given_by_number() {
        let specs = vec![spec("001-auth", None), spec("002-oauth", Some("1"))];
        let roots = build_hierarchy(&specs, SortOrder::IdAsc);
        assert_eq!(ids(&roots), vec!["001-auth"]);
        assert_eq!(ids(&roots[0].children), vec!["002-oauth"]);
    }

    #[test]
    fn self_parent_and_cycles_keep_every_spec() {
        let specs = vec![
            spec("1", Some("1")),
            spec("2", Some("3")),
            spec("3", Some("2")),
            spec("4", Some("3")),
        ];
        let roots = build_hierarchy(&specs, SortOrder::IdAsc);
        assert_eq!(count(&roots), 4);
        assert_eq!(ids(&roots), vec!["1", "2"]);
        assert_eq!(ids(&roots[1].children), vec!["3"]);
        assert_eq!(ids(&roots[1].children[0].children), vec!["4"]);
    }

    #[test]
    fn sorts_by_each_order_with_id_descending_tiebreak() {
        let at = |s: &str| Some(DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc));
        let specs = vec![
            SpecSummary {
                title: "beta".into(),
                priority: Some(SpecPriority::Low),
                updated_at: at("2025-01-01T00:00:00Z"),
                ..SpecSummary::new("1")
            },
            SpecSummary {
                title: "Alpha".into(),
                priority: Some(SpecPriority::Critical),
                ..SpecSummary::new("2")
            },
            SpecSummary {
                title: "alpha".into(),
                updated_at: at("2025-06-01T00:00:00Z"),
                ..SpecSummary::new("10")
            },
        ];
        let order = |o: SortOrder| ids(&build_hierarchy(&specs, o)).join(",");

        assert_eq!(order(SortOrder::IdAsc), "1,2,10");
        assert_eq!(order(SortOrder::IdDesc), "10,2,1");
        assert_eq!(order(SortOrder::Updated), "10,1,2");
        assert_eq!(order(SortOrder::Title), "10,2,1");
        assert_eq!(order(SortOrder::Priority), "2,1,10");
    }

    #[test]
    fn parses_sort_orders() {
        assert_eq!("id-desc".parse::<SortOrder>(), Ok(SortOrder::IdDesc));
        assert_eq!("priority".parse::<SortOrder>(), Ok(SortOrder::Priority));
        assert!("random".parse::<SortOrder>().is_err());
    }

    fn with_deps(id: &str, deps: &[&str]) -> SpecSummary {
        SpecSummary {
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            ..SpecSummary::new(id)
        }
    }

    fn edges(graph: &DependencyGraph) -> Vec<(String, String)> {
        graph
            .edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect()
    }

    #[test]
    fn keep_emits_every_edge() {
        let specs = vec![
            with_deps("001-a", &[]),
            with_deps("002-b", &["1", "002-b", "404"]),
        ];
        let graph = build_dependency_graph(&specs, EdgePolicy::Keep).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(
            edges(&graph),
            vec![
                ("002-b".to_string(), "001-a".to_string()),
                ("002-b".to_string(), "002-b".to_string()),
                ("002-b".to_string(), "404".to_string()),
            ]
        );
        assert_eq!(graph.required_by("001-a"), vec!["002-b"]);
        assert_eq!(graph.depends_on("002-b").len(), 3);
    }

    #[test]
    fn prune_drops_self_and_dangling_edges() {
        let specs = vec![
            with_deps("001-a", &[]),
            with_deps("002-b", &["001-a", "002-b", "404"]),
        ];
        let graph = build_dependency_graph(&specs, EdgePolicy::Prune).unwrap();
        assert_eq!(edges(&graph), vec![("002-b".to_string(), "001-a".to_string())]);
    }

    #[test]
    fn reject_fails_on_first_bad_edge() {
        let specs = vec![with_deps("001-a", &["404"])];
        let err = build_dependency_graph(&specs, EdgePolicy::Reject).unwrap_err();
        match err {
            Error::InvalidDependency {
                source_id, target, ..
            } => {
                assert_eq!(source_id, "001-a");
                assert_eq!(target, "404");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
