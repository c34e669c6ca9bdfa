//! Append-only history log on top of a notes backend

use super::{Category, GitNotesBackend, NoteEntry, NotesBackend, Publish};
use crate::config::HistoryConfig;
use crate::error::{ValnotesError, ValnotesResult};
use crate::fingerprint::TreeHash;
use crate::git::GitRepo;
use crate::history::{HistoryNote, RunRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Bound and pacing of the compare-and-swap retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(
            config.max_append_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Attempts actually made; zero still means one try
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause after the given failed attempt: linear in the attempt number
    /// plus up to one base interval of jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        let jitter = (Uuid::new_v4().as_u128() % u128::from(base)) as u64;
        Duration::from_millis(base * u64::from(attempt) + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(25))
    }
}

/// Result of looking up the note for a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteLookup {
    Found(HistoryNote),
    Missing,
    /// The note exists but could not be decoded
    Unreadable(String),
}

impl NoteLookup {
    pub fn into_note(self) -> Option<HistoryNote> {
        match self {
            Self::Found(note) => Some(note),
            Self::Missing | Self::Unreadable(_) => None,
        }
    }
}

/// Confirmation of a published append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Publish attempts it took, 1 when uncontended
    pub attempts: u32,
    /// Runs in the note after this append
    pub runs_in_note: usize,
}

/// Result of a conditional removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Missing,
    /// Someone rewrote the note after it was listed
    Changed,
}

struct Current {
    entry: NoteEntry,
    body: String,
}

enum Step<T> {
    Write(String, T),
    Remove(T),
    Done(T),
}

/// History notes for every category of one repository
#[derive(Clone)]
pub struct NotesLog {
    backend: Arc<dyn NotesBackend>,
    policy: RetryPolicy,
}

impl NotesLog {
    pub fn new(backend: Arc<dyn NotesBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Log backed by the repository's git notes
    pub fn git(repo: GitRepo, policy: RetryPolicy) -> Self {
        Self::new(Arc::new(GitNotesBackend::new(repo)), policy)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Append a run to the note for `tree`, creating the note if needed
    ///
    /// Concurrent appenders never drop each other's runs: a rejected publish
    /// re-reads the note and re-applies the run. Fails with
    /// [`ValnotesError::NotesConflict`] once the retry bound is spent and with
    /// [`ValnotesError::NoteCorrupt`] if the existing note cannot be decoded.
    pub async fn append(
        &self,
        category: &Category,
        tree: &TreeHash,
        record: &RunRecord,
    ) -> ValnotesResult<AppendReceipt> {
        let (runs_in_note, attempts) = self
            .transact(category, tree, |current| {
                let mut note = match current {
                    Some(current) => HistoryNote::decode(tree, &current.body)?,
                    None => HistoryNote::new(tree.clone()),
                };
                note.runs.push(record.clone());
                Ok(Step::Write(note.encode()?, note.runs.len()))
            })
            .await?;

        Ok(AppendReceipt {
            attempts,
            runs_in_note,
        })
    }

    /// Read the note for `tree`
    pub async fn read(&self, category: &Category, tree: &TreeHash) -> ValnotesResult<NoteLookup> {
        let Some(tip) = self.backend.tip(&category.notes_ref()).await? else {
            return Ok(NoteLookup::Missing);
        };
        match self.backend.entry(&tip, tree).await? {
            Some(entry) => self.load(&entry).await,
            None => Ok(NoteLookup::Missing),
        }
    }

    /// Decode a listed note
    pub async fn load(&self, entry: &NoteEntry) -> ValnotesResult<NoteLookup> {
        let body = self.backend.read_blob(&entry.blob).await?;
        match HistoryNote::decode(&entry.tree_hash, &body) {
            Ok(note) => Ok(NoteLookup::Found(note)),
            Err(ValnotesError::NoteCorrupt { reason, .. }) => Ok(NoteLookup::Unreadable(reason)),
            Err(e) => Err(e),
        }
    }

    /// Every note in a category
    pub async fn list(&self, category: &Category) -> ValnotesResult<Vec<NoteEntry>> {
        match self.backend.tip(&category.notes_ref()).await? {
            Some(tip) => self.backend.entries(&tip).await,
            None => Ok(Vec::new()),
        }
    }

    /// Remove the note for `tree`; false if there was none
    pub async fn delete(&self, category: &Category, tree: &TreeHash) -> ValnotesResult<bool> {
        let (removed, _) = self
            .transact(category, tree, |current| {
                Ok(match current {
                    Some(_) => Step::Remove(true),
                    None => Step::Done(false),
                })
            })
            .await?;
        Ok(removed)
    }

    /// Remove a listed note only if its content is still what was listed
    pub async fn remove_if_unchanged(
        &self,
        category: &Category,
        listed: &NoteEntry,
    ) -> ValnotesResult<RemoveOutcome> {
        let (outcome, _) = self
            .transact(category, &listed.tree_hash, |current| {
                Ok(match current {
                    None => Step::Done(RemoveOutcome::Missing),
                    Some(current) if current.entry.blob != listed.blob => {
                        Step::Done(RemoveOutcome::Changed)
                    }
                    Some(_) => Step::Remove(RemoveOutcome::Removed),
                })
            })
            .await?;
        Ok(outcome)
    }

    /// Read-modify-publish loop shared by every write
    ///
    /// `op` sees the note as of a fresh ref tip on each attempt and decides
    /// what to write. Returns its value with the attempt that published.
    async fn transact<T, F>(
        &self,
        category: &Category,
        tree: &TreeHash,
        mut op: F,
    ) -> ValnotesResult<(T, u32)>
    where
        F: FnMut(Option<&Current>) -> ValnotesResult<Step<T>>,
    {
        let notes_ref = category.notes_ref();
        let attempts = self.policy.attempts();
        let mut last = String::new();

        for attempt in 1..=attempts {
            let tip = self.backend.tip(&notes_ref).await?;
            let current = match &tip {
                Some(tip) => match self.backend.entry(tip, tree).await? {
                    Some(entry) => {
                        let body = self.backend.read_blob(&entry.blob).await?;
                        Some(Current { entry, body })
                    }
                    None => None,
                },
                None => None,
            };

            let (body, value) = match op(current.as_ref())? {
                Step::Done(value) => return Ok((value, attempt)),
                Step::Write(body, value) => (Some(body), value),
                Step::Remove(value) => (None, value),
            };

            let commit = self
                .backend
                .commit(tip.as_deref(), tree, body.as_deref())
                .await?;

            match self
                .backend
                .publish(&notes_ref, tip.as_deref(), &commit)
                .await?
            {
                Publish::Updated => {
                    debug!("Published {} for {} (attempt {})", notes_ref, tree.short(), attempt);
                    return Ok((value, attempt));
                }
                Publish::Rejected { current } => {
                    last = format!(
                        "ref moved to {}",
                        current.as_deref().unwrap_or("nothing")
                    );
                }
                Publish::Contended { detail } => {
                    last = detail;
                }
            }

            debug!(
                "Publish of {} for {} lost a race on attempt {}/{}: {}",
                notes_ref,
                tree.short(),
                attempt,
                attempts,
                last
            );

            if attempt < attempts {
                tokio::time::sleep(self.policy.delay(attempt)).await;
            }
        }

        Err(ValnotesError::NotesConflict { attempts, last })
    }
}
