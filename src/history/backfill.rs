use chrono::{Local, NaiveDate};
use serde::Serialize;

use super::{bootstrap_metadata, derive_history, merge_history, HistoryOptions, VersionControl};
use crate::error::{Error, Result};
use crate::models::*;
use crate::store::SpecStore;

/// Options for a backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillOptions {
    /// Derive `assignee` from the first commit's author.
    pub assignee: bool,
    /// Replay status transitions across revisions.
    pub transitions: bool,
    /// Overwrite values already present in the header.
    pub force: bool,
    /// Synthesize `status` and `created` for specs without a valid header.
    pub bootstrap: bool,
    /// Compute outcomes without writing anything.
    pub dry_run: bool,
}

impl BackfillOptions {
    fn history(&self) -> HistoryOptions {
        HistoryOptions {
            assignee: self.assignee,
            transitions: self.transitions,
        }
    }
}

/// What a backfill did, or would do, to one spec.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackfillOutcome {
    pub changes: Vec<FieldChange>,
    /// A header was synthesized.
    pub bootstrapped: bool,
    /// The file was rewritten. Always false in dry-run mode.
    pub written: bool,
}

impl BackfillOutcome {
    /// True when at least one field took a new value.
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.applied)
    }
}

#[derive(Debug)]
pub struct BackfillEntry {
    pub spec: String,
    pub result: Result<BackfillOutcome>,
}

/// Per-spec results of a batch, in processing order.
#[derive(Debug, Default)]
pub struct BackfillReport {
    pub entries: Vec<BackfillEntry>,
}

impl BackfillReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_err()).count()
    }

    /// Specs with at least one applied change.
    pub fn updated(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.result.as_ref().is_ok_and(BackfillOutcome::has_changes))
            .count()
    }
}

/// Reconciles spec headers with version control history.
pub struct Backfiller<'a, V: VersionControl> {
    store: &'a SpecStore,
    vcs: V,
    options: BackfillOptions,
    today: NaiveDate,
}

impl<'a, V: VersionControl> Backfiller<'a, V> {
    pub fn new(store: &'a SpecStore, vcs: V, options: BackfillOptions) -> Self {
        Self {
            store,
            vcs,
            options,
            today: Local::now().date_naive(),
        }
    }

    /// Fix the date used as the bootstrap `created` fallback.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Backfill every spec in the store.
    pub fn run_all(&self) -> Result<BackfillReport> {
        let ids: Vec<String> = self.store.list()?.into_iter().map(|e| e.id).collect();
        Ok(self.run(&ids))
    }

    /// Backfill the given specs one after another. A failure is recorded
    /// against its spec and does not stop the batch.
    pub fn run(&self, ids: &[String]) -> BackfillReport {
        let mut report = BackfillReport::default();
        for id in ids {
            let result = self.backfill_one(id);
            match &result {
                Ok(outcome) if outcome.has_changes() => tracing::info!(
                    "Backfilled {}: {} field(s){}",
                    id,
                    outcome.changes.iter().filter(|c| c.applied).count(),
                    if self.options.dry_run { " (dry run)" } else { "" }
                ),
                Ok(_) => tracing::debug!("Backfill of {}: already up to date", id),
                Err(e) => tracing::warn!("Backfill of {} failed: {}", id, e),
            }
            report.entries.push(BackfillEntry {
                spec: id.clone(),
                result,
            });
        }
        report
    }

    fn backfill_one(&self, id: &str) -> Result<BackfillOutcome> {
        let (entry, doc) = self.store.load(id)?;
        let needs_bootstrap = self.options.bootstrap && !doc.is_valid();

        let history = match derive_history(&self.vcs, &entry.path, self.options.history()) {
            Ok(record) => Some(record),
            Err(Error::NotTracked { reason, .. }) if needs_bootstrap => {
                tracing::debug!("No history for {} ({}), bootstrapping anyway", entry.id, reason);
                None
            }
            Err(e) => return Err(e),
        };

        let mut changes = Vec::new();
        let mut meta = doc.metadata().cloned().unwrap_or_default();
        if needs_bootstrap {
            let (bootstrapped, audit) =
                bootstrap_metadata(doc.metadata(), &doc.body, history.as_ref(), self.today);
            meta = bootstrapped;
            changes.extend(audit);
        }
        if let Some(record) = &history {
            changes.extend(merge_history(&mut meta, record, self.options.force));
        }

        let mut outcome = BackfillOutcome {
            changes,
            bootstrapped: needs_bootstrap,
            written: false,
        };
        if !outcome.has_changes() || self.options.dry_run {
            return Ok(outcome);
        }

        let mut updated = doc.clone();
        updated
            .set_metadata(meta)
            .map_err(|e| e.at_path(&entry.path))?;
        self.store.write_document(&entry, &updated, &doc.fingerprint)?;
        outcome.written = true;
        Ok(outcome)
    }
}
