//! Validation run history
//!
//! Runs are recorded per working tree hash into git notes and read back for
//! cache lookups, flakiness detection, health checks and pruning.

pub mod health;
pub mod prune;
pub mod reader;
pub mod record;
pub mod recorder;

pub use health::{format_bytes, HealthMonitor, HealthReport, SizeStatus};
pub use prune::{is_expired, PruneFailure, PruneOptions, PruneResult, Pruner};
pub use reader::{detect_flakiness, most_recent, FlakinessReport, HistoryReader};
pub use record::{
    ExtractedError, HistoryNote, PhaseOutcome, RunRecord, StepOutcome, ValidationOutcome,
    NOTE_VERSION,
};
pub use recorder::{HistoryRecorder, RecordReceipt, RunContext};

use crate::error::ValnotesResult;
use crate::notes::{Category, NoteEntry, NoteLookup, NotesLog};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};

/// Notes decoded at once while scanning a category
const SCAN_CONCURRENCY: usize = 8;

/// Summary of one note found while scanning a category
#[derive(Debug, Clone)]
pub(crate) struct ScannedNote {
    pub entry: NoteEntry,
    pub runs: usize,
    pub newest: Option<DateTime<Utc>>,
    /// Why the note could not be read, if it could not
    pub unreadable: Option<String>,
}

/// Read every note in a category, sorted by tree hash
pub(crate) async fn scan(log: &NotesLog, category: &Category) -> ValnotesResult<Vec<ScannedNote>> {
    let entries = log.list(category).await?;

    let mut scanned: Vec<ScannedNote> = stream::iter(entries)
        .map(|entry| async move {
            let (runs, newest, unreadable) = match log.load(&entry).await {
                Ok(NoteLookup::Found(note)) => (note.runs.len(), note.newest_timestamp(), None),
                Ok(NoteLookup::Missing) => (0, None, Some("note vanished".to_string())),
                Ok(NoteLookup::Unreadable(reason)) => (0, None, Some(reason)),
                Err(e) => (0, None, Some(e.to_string())),
            };
            ScannedNote {
                entry,
                runs,
                newest,
                unreadable,
            }
        })
        .buffer_unordered(SCAN_CONCURRENCY)
        .collect()
        .await;

    scanned.sort_by(|a, b| a.entry.tree_hash.cmp(&b.entry.tree_hash));
    Ok(scanned)
}
