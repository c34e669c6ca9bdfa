//! Age-based pruning of history notes

use super::scan;
use crate::error::ValnotesResult;
use crate::fingerprint::TreeHash;
use crate::notes::{Category, NotesLog, RemoveOutcome};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Which notes a prune pass looks at and what "now" is
#[derive(Debug, Clone)]
pub struct PruneOptions {
    pub category: Category,
    pub now: DateTime<Utc>,
}

impl PruneOptions {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            now: Utc::now(),
        }
    }

    /// Pin the clock, so repeated passes agree on what is expired
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// A note the pass wanted to remove but kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneFailure {
    pub tree_hash: TreeHash,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneResult {
    pub notes_pruned: usize,
    pub runs_pruned: usize,
    pub notes_remaining: usize,
    /// Sorted
    pub pruned_tree_hashes: Vec<TreeHash>,
    pub failed: Vec<PruneFailure>,
    pub dry_run: bool,
}

impl PruneResult {
    /// Result of a pass that found nothing
    pub fn empty(dry_run: bool) -> Self {
        Self {
            notes_pruned: 0,
            runs_pruned: 0,
            notes_remaining: 0,
            pruned_tree_hashes: Vec::new(),
            failed: Vec::new(),
            dry_run,
        }
    }
}

/// Whether a note whose newest run is `newest` is past `max_age_days`
///
/// A note without runs has nothing worth keeping and is always expired.
pub fn is_expired(newest: Option<DateTime<Utc>>, max_age_days: u32, now: DateTime<Utc>) -> bool {
    match newest {
        Some(newest) => now - newest > Duration::days(i64::from(max_age_days)),
        None => true,
    }
}

/// Removes whole notes whose newest run is too old
pub struct Pruner {
    log: NotesLog,
}

impl Pruner {
    pub fn new(log: NotesLog) -> Self {
        Self { log }
    }

    /// Remove every note whose newest run is older than `max_age_days`
    ///
    /// Unreadable notes are kept. A note rewritten after it was evaluated is
    /// kept and reported in `failed`; other per-note failures are reported
    /// the same way and the pass continues.
    pub async fn prune_by_age(
        &self,
        max_age_days: u32,
        options: &PruneOptions,
        dry_run: bool,
    ) -> ValnotesResult<PruneResult> {
        let scanned = scan(&self.log, &options.category).await?;
        let total = scanned.len();

        let mut pruned_tree_hashes = Vec::new();
        let mut runs_pruned = 0;
        let mut vanished = 0;
        let mut failed = Vec::new();

        for note in scanned {
            if let Some(reason) = &note.unreadable {
                debug!("Keeping unreadable note {}: {}", note.entry.tree_hash.short(), reason);
                continue;
            }
            if !is_expired(note.newest, max_age_days, options.now) {
                continue;
            }

            let tree_hash = note.entry.tree_hash.clone();
            if dry_run {
                pruned_tree_hashes.push(tree_hash);
                runs_pruned += note.runs;
                continue;
            }

            match self
                .log
                .remove_if_unchanged(&options.category, &note.entry)
                .await
            {
                Ok(RemoveOutcome::Removed) => {
                    info!("Pruned history note {} ({} runs)", tree_hash.short(), note.runs);
                    pruned_tree_hashes.push(tree_hash);
                    runs_pruned += note.runs;
                }
                Ok(RemoveOutcome::Missing) => {
                    debug!("History note {} already removed", tree_hash.short());
                    vanished += 1;
                }
                Ok(RemoveOutcome::Changed) => failed.push(PruneFailure {
                    tree_hash,
                    reason: "changed during prune".to_string(),
                }),
                Err(e) => {
                    warn!("Failed to prune history note {}: {}", tree_hash.short(), e);
                    failed.push(PruneFailure {
                        tree_hash,
                        reason: e.to_string(),
                    });
                }
            }
        }

        pruned_tree_hashes.sort();
        let notes_pruned = pruned_tree_hashes.len();

        Ok(PruneResult {
            notes_pruned,
            runs_pruned,
            notes_remaining: total - notes_pruned - vanished,
            pruned_tree_hashes,
            failed,
            dry_run,
        })
    }
}
