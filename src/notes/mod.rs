//! Git notes storage for run history
//!
//! Each `(category, tree hash)` pair owns one note on the tree object, kept in
//! the notes ref `refs/notes/valnotes/<category>`.
//!
//! # Concurrency Model
//!
//! `git notes` only replaces whole notes, so two processes appending to the
//! same note could overwrite each other. Writes therefore never move the
//! visible ref directly:
//!
//! 1. Read the ref tip and the note at that tip
//! 2. Build a new notes commit on top of it (on a private scratch ref)
//! 3. Publish with `git update-ref <ref> <new> <tip>`, an atomic compare-and-swap
//! 4. If the ref moved, start again from step 1 with the fresh note
//!
//! Conflicts are detected by re-reading the ref tip, not by parsing git's
//! error messages.

mod backend;
mod log;
#[cfg(test)]
pub(crate) mod memory;

pub use backend::{GitNotesBackend, NotesBackend, Publish};
pub use log::{AppendReceipt, NoteLookup, NotesLog, RemoveOutcome, RetryPolicy};

use crate::error::{ValnotesError, ValnotesResult};
use crate::fingerprint::TreeHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every notes ref owned by valnotes
pub const NOTES_REF_PREFIX: &str = "refs/notes/valnotes/";

/// Prefix of short-lived refs used to build notes commits before publishing
pub const SCRATCH_REF_PREFIX: &str = "refs/notes/valnotes-scratch/";

/// A named partition of the notes store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

impl Category {
    /// Validation run history
    pub const VALIDATION: &'static str = "validation";
    /// Ad-hoc command result cache
    pub const RUN_CACHE: &'static str = "run-cache";

    /// Create a category, validating it is usable as a ref component
    pub fn new(name: &str) -> ValnotesResult<Self> {
        let mut chars = name.chars();
        let valid_first = chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let valid_rest = chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
        });

        if !valid_first || !valid_rest || name.contains("..") || name.ends_with(".lock") {
            return Err(ValnotesError::InvalidCategory(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn validation() -> Self {
        Self(Self::VALIDATION.to_string())
    }

    pub fn run_cache() -> Self {
        Self(Self::RUN_CACHE.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Fully qualified notes ref for this category
    pub fn notes_ref(&self) -> String {
        format!("{}{}", NOTES_REF_PREFIX, self.0)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Category {
    type Error = ValnotesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

/// A note as listed in the notes tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEntry {
    /// Object the note is attached to
    pub tree_hash: TreeHash,
    /// Blob holding the note body
    pub blob: String,
    pub size_bytes: u64,
}
