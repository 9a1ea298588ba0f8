//! Domain models for spec documents.
//!
//! - [`Metadata`]: the structured header of a spec (status, priority, tags,
//!   timestamps, dependency links, status transitions).
//! - [`HistoryRecord`]: metadata derived from the version control log. Computed
//!   per reconciliation pass and never persisted on its own.
//! - [`SpecSummary`], [`HierarchyNode`], [`DependencyGraph`]: transient views
//!   built from many specs for tree and graph presentation.

mod history;
mod metadata;
mod spec;

pub use history::*;
pub use metadata::*;
pub use spec::*;
