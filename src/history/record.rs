//! Run records and the history note they are stored in

use crate::error::{ValnotesError, ValnotesResult};
use crate::fingerprint::TreeHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Format version written into every history note
pub const NOTE_VERSION: u32 = 1;

/// Structured outcome of one validation run, as produced by the runner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOutcome {
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// One-line human summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Name of the first failing step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    pub phases: Vec<PhaseOutcome>,
}

/// A group of steps run together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseOutcome {
    pub name: String,
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    pub steps: Vec<StepOutcome>,
}

/// A single validation command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepOutcome {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    pub errors: Vec<ExtractedError>,

    /// Error count before truncation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_errors: Option<usize>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub errors_truncated: bool,
}

/// A structured error pulled out of tool output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    pub message: String,
}

impl ValidationOutcome {
    /// Copy of the outcome keeping at most `max_errors` errors per step
    pub fn bounded(&self, max_errors: usize) -> Self {
        let mut outcome = self.clone();
        for step in outcome.phases.iter_mut().flat_map(|p| p.steps.iter_mut()) {
            if step.errors.len() > max_errors {
                if step.total_errors.is_none() {
                    step.total_errors = Some(step.errors.len());
                }
                step.errors.truncate(max_errors);
                step.errors_truncated = true;
            }
        }
        outcome
    }
}

/// One recorded validation attempt. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub passed: bool,
    pub branch: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_commit: Option<String>,

    pub uncommitted_changes: bool,
    pub result: ValidationOutcome,
}

/// All runs recorded for one tree hash, in append order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryNote {
    pub version: u32,
    pub tree_hash: TreeHash,
    pub runs: Vec<RunRecord>,
}

impl HistoryNote {
    /// Create an empty note for a tree
    pub fn new(tree_hash: TreeHash) -> Self {
        Self {
            version: NOTE_VERSION,
            tree_hash,
            runs: Vec::new(),
        }
    }

    /// Parse a stored note body
    pub fn decode(tree_hash: &TreeHash, body: &str) -> ValnotesResult<Self> {
        let corrupt = |reason: String| ValnotesError::NoteCorrupt {
            tree_hash: tree_hash.to_string(),
            reason,
        };

        let note: HistoryNote = serde_json::from_str(body).map_err(|e| corrupt(e.to_string()))?;
        if note.version != NOTE_VERSION {
            return Err(corrupt(format!("unsupported note version {}", note.version)));
        }
        if note.tree_hash != *tree_hash {
            return Err(corrupt(format!("note names tree {}", note.tree_hash)));
        }
        Ok(note)
    }

    /// Serialize for storage
    pub fn encode(&self) -> ValnotesResult<String> {
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        Ok(body)
    }

    /// Last appended run
    pub fn most_recent(&self) -> Option<&RunRecord> {
        self.runs.last()
    }

    /// Latest timestamp of any run, regardless of append order
    pub fn newest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.runs.iter().map(|r| r.timestamp).max()
    }
}
