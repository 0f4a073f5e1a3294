//! Change-set processor
//!
//! Replays ordered change sets against the file system, or prints a
//! dry-run plan without touching anything. Progress is reported through an
//! injected `Reporter` rather than global state.

use meshsplit_core::change::{Change, ChangeSet};

use crate::editor::{RawFileEditor, ResourceFileEditor};
use crate::fs::{FileStore, StoreError};

/// Observer for processor progress. The CLI installs a console
/// implementation; tests use `NullReporter`.
pub trait Reporter {
    fn begin_set(&self, _index: usize, _total: usize, _changes: usize) {}
    fn step(&self, _step: usize, _change: &Change, _dry_run: bool) {}
    fn finished(&self, _applied: usize, _dry_run: bool) {}
}

/// Reporter that swallows everything.
pub struct NullReporter;

impl Reporter for NullReporter {}

/// A change failed while being applied. The completed prefix stays on
/// disk; there is no rollback.
#[derive(Debug, thiserror::Error)]
#[error("step {step} failed: {change}")]
pub struct ApplyError {
    /// 1-based position within the failing change set.
    pub step: usize,
    /// Human-readable description of the failing change.
    pub change: String,
    #[source]
    pub source: StoreError,
}

/// Applies (or previews) change sets in order, aborting at the first
/// failing change.
pub struct ChangeSetProcessor<'a> {
    store: &'a FileStore,
    reporter: &'a dyn Reporter,
}

impl<'a> ChangeSetProcessor<'a> {
    pub fn new(store: &'a FileStore, reporter: &'a dyn Reporter) -> Self {
        Self { store, reporter }
    }

    /// Process change sets sequentially. Returns the number of changes
    /// applied (or previewed, under dry-run).
    pub fn process(&self, change_sets: &[ChangeSet], dry_run: bool) -> Result<usize, ApplyError> {
        let mut handled = 0;
        for (set_index, change_set) in change_sets.iter().enumerate() {
            self.reporter
                .begin_set(set_index + 1, change_sets.len(), change_set.len());
            for (index, change) in change_set.iter().enumerate() {
                let step = index + 1;
                self.reporter.step(step, change, dry_run);
                if dry_run {
                    handled += 1;
                    continue;
                }
                tracing::debug!(step, change = %change, "applying change");
                self.apply(change).map_err(|source| ApplyError {
                    step,
                    change: change.to_string(),
                    source,
                })?;
                handled += 1;
            }
        }
        self.reporter.finished(handled, dry_run);
        Ok(handled)
    }

    fn apply(&self, change: &Change) -> Result<(), StoreError> {
        match change {
            Change::File(file_change) => RawFileEditor::new(self.store).apply(file_change),
            Change::Resource(resource_change) => {
                ResourceFileEditor::new(self.store).apply(resource_change)
            }
        }
    }
}
