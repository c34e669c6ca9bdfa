//! Content-addressed validation cache
//!
//! [`ValidationCache`] is the entry point for validation runners. It ties
//! the working tree fingerprint to the run history stored in git notes.
//!
//! # Failure Policy
//!
//! Caching must never fail a validation run. No method here returns an
//! error: environment problems yield `NotApplicable` or empty values, write
//! failures yield a [`RecordSkip`] reason, and everything degraded is logged.
//!
//! # Typical Flow
//!
//! | Step | Call | Outcome |
//! |------|------|---------|
//! | Before running | `compute_fingerprint` | tree hash, or run uncached |
//! | Cache check | `read_history` | skip work if the most recent run passed |
//! | After running | `check_stability` | unstable results are not recorded |
//! | Record | `record_run` | run appended to the tree's note |

use crate::config::Config;
use crate::error::ValnotesError;
use crate::fingerprint::{self, Fingerprint, StabilityResult, TreeHash};
use crate::git::GitRepo;
use crate::history::{
    HealthMonitor, HealthReport, HistoryNote, HistoryReader, HistoryRecorder, PruneOptions,
    PruneResult, Pruner, RunContext, ValidationOutcome,
};
use crate::notes::{Category, NoteEntry, NoteLookup, NotesLog, RetryPolicy};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// Why a run was not recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RecordSkip {
    /// `history.enabled` is off
    Disabled,
    NotARepository,
    /// The working tree changed while validation ran
    TreeChanged,
    /// Concurrent writers kept winning the publish race
    RetriesExhausted { attempts: u32 },
    /// The existing note cannot be decoded and was left as is
    CorruptNote,
    Store { message: String },
}

impl fmt::Display for RecordSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "history recording is disabled"),
            Self::NotARepository => write!(f, "not inside a git working tree"),
            Self::TreeChanged => write!(f, "working tree changed during validation"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "gave up after {} conflicting attempts", attempts)
            }
            Self::CorruptNote => write!(f, "existing history note is unreadable"),
            Self::Store { message } => write!(f, "{}", message),
        }
    }
}

/// Outcome of [`ValidationCache::record_run`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runs_in_note: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<RecordSkip>,
}

impl RecordResult {
    /// A run that was not recorded
    pub fn skipped(reason: RecordSkip, attempts: u32) -> Self {
        Self {
            recorded: false,
            run_id: None,
            attempts,
            runs_in_note: None,
            skipped: Some(reason),
        }
    }
}

/// Validation cache for one working tree
pub struct ValidationCache {
    repo: Option<GitRepo>,
    log: Option<NotesLog>,
    category: Category,
    config: Config,
}

impl ValidationCache {
    /// Open the cache for the working tree containing `dir`
    ///
    /// Outside a working tree the cache still opens; every operation then
    /// reports "not applicable".
    pub async fn open(dir: &Path, config: Config) -> Self {
        let repo = match GitRepo::discover(dir).await {
            Ok(repo) => Some(repo),
            Err(e) => {
                debug!("Validation cache disabled for {}: {}", dir.display(), e);
                None
            }
        };

        let policy = RetryPolicy::from_config(&config.history);
        let log = repo.clone().map(|repo| NotesLog::git(repo, policy));
        Self::from_parts(repo, log, config)
    }

    fn from_parts(repo: Option<GitRepo>, log: Option<NotesLog>, config: Config) -> Self {
        let category = Category::new(&config.history.category).unwrap_or_else(|e| {
            warn!("{}, using {}", e, Category::VALIDATION);
            Category::validation()
        });

        Self {
            repo,
            log,
            category,
            config,
        }
    }

    /// Use another history category, e.g. [`Category::RUN_CACHE`]
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    /// The working tree, if there is one
    pub fn repo(&self) -> Option<&GitRepo> {
        self.repo.as_ref()
    }

    /// Fingerprint the working tree in its current state
    pub async fn compute_fingerprint(&self) -> Fingerprint {
        match &self.repo {
            Some(repo) => fingerprint::fingerprint_repo(repo).await,
            None => Fingerprint::NotApplicable,
        }
    }

    /// Re-fingerprint and compare with the fingerprint taken before a run
    pub async fn check_stability(&self, before: &Fingerprint) -> StabilityResult {
        let after = self.compute_fingerprint().await;
        let result = StabilityResult::compare(before.clone(), after);
        if !result.stable {
            warn!(
                "Working tree changed during validation ({} -> {}), result will not be cached",
                result.fingerprint_before, result.fingerprint_after
            );
        }
        result
    }

    /// Append a run for the tree fingerprinted before validation
    pub async fn record_run(&self, before: &TreeHash, outcome: &ValidationOutcome) -> RecordResult {
        if !self.config.history.enabled {
            return RecordResult::skipped(RecordSkip::Disabled, 0);
        }
        let Some(log) = &self.log else {
            return RecordResult::skipped(RecordSkip::NotARepository, 0);
        };

        let context = match &self.repo {
            Some(repo) => RunContext::capture(repo).await,
            None => RunContext::default(),
        };
        let recorder = HistoryRecorder::new(
            log.clone(),
            self.category.clone(),
            self.config.history.max_errors_per_step,
        );

        match recorder.record(before, outcome, &context).await {
            Ok(receipt) => RecordResult {
                recorded: true,
                run_id: Some(receipt.run_id),
                attempts: receipt.attempts,
                runs_in_note: Some(receipt.runs_in_note),
                skipped: None,
            },
            Err(e) => {
                warn!("Validation result not recorded: {}", e);
                let (reason, attempts) = match e {
                    ValnotesError::NotesConflict { attempts, .. } => {
                        (RecordSkip::RetriesExhausted { attempts }, attempts)
                    }
                    ValnotesError::NoteCorrupt { .. } => (RecordSkip::CorruptNote, 1),
                    e if e.is_environment() => (RecordSkip::NotARepository, 0),
                    e => (
                        RecordSkip::Store {
                            message: e.to_string(),
                        },
                        0,
                    ),
                };
                RecordResult::skipped(reason, attempts)
            }
        }
    }

    /// Run history for a tree; `None` when absent, unreadable or unavailable
    pub async fn read_history(&self, tree: &TreeHash) -> Option<HistoryNote> {
        let reader = self.reader()?;
        reader.read(tree).await.unwrap_or_else(|e| {
            warn!("Could not read history for {}: {}", tree.short(), e);
            None
        })
    }

    /// Like [`ValidationCache::read_history`] but tells unreadable apart from missing
    pub async fn lookup_history(&self, tree: &TreeHash) -> NoteLookup {
        let Some(reader) = self.reader() else {
            return NoteLookup::Missing;
        };
        reader.lookup(tree).await.unwrap_or_else(|e| {
            warn!("Could not read history for {}: {}", tree.short(), e);
            NoteLookup::Missing
        })
    }

    /// Every note in the category
    pub async fn list_history(&self) -> Vec<NoteEntry> {
        let Some(log) = &self.log else {
            return Vec::new();
        };
        log.list(&self.category).await.unwrap_or_else(|e| {
            warn!("Could not list history notes: {}", e);
            Vec::new()
        })
    }

    /// Delete the note for a tree; false if nothing was deleted
    pub async fn clear_history(&self, tree: &TreeHash) -> bool {
        let Some(log) = &self.log else {
            return false;
        };
        log.delete(&self.category, tree).await.unwrap_or_else(|e| {
            warn!("Could not clear history for {}: {}", tree.short(), e);
            false
        })
    }

    /// Size and age report for the category
    pub async fn check_health(&self) -> HealthReport {
        let Some(log) = &self.log else {
            return HealthReport::empty(&self.category);
        };
        let monitor = HealthMonitor::new(log.clone(), self.config.health.clone());
        monitor
            .check(&self.category, Utc::now())
            .await
            .unwrap_or_else(|e| {
                warn!("Could not check history health: {}", e);
                HealthReport::empty(&self.category)
            })
    }

    /// Remove notes whose newest run is older than `max_age_days`
    pub async fn prune_by_age(&self, max_age_days: u32, dry_run: bool) -> PruneResult {
        let Some(log) = &self.log else {
            return PruneResult::empty(dry_run);
        };
        let options = PruneOptions::new(self.category.clone());
        Pruner::new(log.clone())
            .prune_by_age(max_age_days, &options, dry_run)
            .await
            .unwrap_or_else(|e| {
                warn!("Could not prune history: {}", e);
                PruneResult::empty(dry_run)
            })
    }

    fn reader(&self) -> Option<HistoryReader> {
        self.log
            .as_ref()
            .map(|log| HistoryReader::new(log.clone(), self.category.clone()))
    }
}
