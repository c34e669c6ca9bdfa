//! Recording validation runs

use super::record::{RunRecord, ValidationOutcome};
use crate::error::ValnotesResult;
use crate::fingerprint::TreeHash;
use crate::git::GitRepo;
use crate::notes::{Category, NotesLog};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Branch recorded when HEAD is detached
const DETACHED_BRANCH: &str = "HEAD";

/// Repository state at the time of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub branch: String,
    pub head_commit: Option<String>,
    pub uncommitted_changes: bool,
}

impl RunContext {
    /// Gather branch, HEAD and dirtiness from git
    ///
    /// Lookups that fail are logged and fall back to neutral values; the run
    /// is still worth recording without them.
    pub async fn capture(repo: &GitRepo) -> Self {
        let branch = match repo.current_branch().await {
            Ok(Some(branch)) => branch,
            Ok(None) => DETACHED_BRANCH.to_string(),
            Err(e) => {
                warn!("Could not read current branch: {}", e);
                DETACHED_BRANCH.to_string()
            }
        };

        let head_commit = repo.head_commit().await.unwrap_or_else(|e| {
            warn!("Could not resolve HEAD: {}", e);
            None
        });

        let uncommitted_changes = repo.has_uncommitted_changes().await.unwrap_or_else(|e| {
            warn!("Could not read working tree status: {}", e);
            false
        });

        Self {
            branch,
            head_commit,
            uncommitted_changes,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            branch: DETACHED_BRANCH.to_string(),
            head_commit: None,
            uncommitted_changes: false,
        }
    }
}

/// Confirmation that a run was stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReceipt {
    pub run_id: Uuid,
    pub attempts: u32,
    pub runs_in_note: usize,
}

/// Appends validation runs to a history category
pub struct HistoryRecorder {
    log: NotesLog,
    category: Category,
    max_errors_per_step: usize,
}

impl HistoryRecorder {
    pub fn new(log: NotesLog, category: Category, max_errors_per_step: usize) -> Self {
        Self {
            log,
            category,
            max_errors_per_step,
        }
    }

    /// Build a fresh record for an outcome
    pub fn build_record(&self, outcome: &ValidationOutcome, context: &RunContext) -> RunRecord {
        let duration_ms = outcome
            .duration_ms
            .unwrap_or_else(|| outcome.phases.iter().filter_map(|p| p.duration_ms).sum());

        RunRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            duration_ms,
            passed: outcome.passed,
            branch: context.branch.clone(),
            head_commit: context.head_commit.clone(),
            uncommitted_changes: context.uncommitted_changes,
            result: outcome.bounded(self.max_errors_per_step),
        }
    }

    /// Record one run against `tree`
    ///
    /// `tree` must be the fingerprint taken before validation started, and
    /// the caller must already have confirmed it is still current.
    pub async fn record(
        &self,
        tree: &TreeHash,
        outcome: &ValidationOutcome,
        context: &RunContext,
    ) -> ValnotesResult<RecordReceipt> {
        let record = self.build_record(outcome, context);
        let receipt = self.log.append(&self.category, tree, &record).await?;

        info!(
            "Recorded {} run {} for tree {} ({} runs)",
            if record.passed { "passing" } else { "failing" },
            record.id,
            tree.short(),
            receipt.runs_in_note
        );

        Ok(RecordReceipt {
            run_id: record.id,
            attempts: receipt.attempts,
            runs_in_note: receipt.runs_in_note,
        })
    }
}
