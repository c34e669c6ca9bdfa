//! Error types for valnotes
//!
//! All modules use `ValnotesResult<T>` as their return type. The public
//! facade in [`crate::cache`] converts these into degraded results so a
//! caching failure never fails a validation run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for valnotes operations
pub type ValnotesResult<T> = Result<T, ValnotesError>;

/// All errors that can occur in valnotes
#[derive(Error, Debug)]
pub enum ValnotesError {
    // Environment errors
    #[error("git executable not found. Install git and make sure it is on PATH")]
    GitNotFound,

    #[error("Not a git working tree: {0}")]
    NotARepository(PathBuf),

    // Git errors
    #[error("Failed to run {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git command failed: {command}: {stderr}")]
    Git { command: String, stderr: String },

    #[error("Unexpected git output from {command}: {output}")]
    GitOutput { command: String, output: String },

    // Store errors
    #[error("Invalid tree hash: {0}")]
    InvalidTreeHash(String),

    #[error("Invalid category name: {0}")]
    InvalidCategory(String),

    #[error("History note for {tree_hash} is unreadable: {reason}")]
    NoteCorrupt { tree_hash: String, reason: String },

    #[error("Could not record after {attempts} attempts: notes ref kept moving ({last})")]
    NotesConflict { attempts: u32, last: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),
}

impl ValnotesError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    ///
    /// A missing executable maps to [`ValnotesError::GitNotFound`] so callers
    /// can treat it as an environment error.
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::GitNotFound;
        }
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a git execution error
    pub fn git(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Git {
            command: command.into(),
            stderr: stderr.into().trim().to_string(),
        }
    }

    /// Whether this error means caching simply does not apply here
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::GitNotFound | Self::NotARepository(_))
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotesConflict { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::GitNotFound => Some("Install git from https://git-scm.com"),
            Self::NotARepository(_) => Some("Run inside a git working tree, or run: git init"),
            Self::NotesConflict { .. } => {
                Some("Another process kept writing the same history note; re-run to record")
            }
            Self::NoteCorrupt { .. } => {
                Some("Inspect with: git notes --ref valnotes/<category> show <tree-hash>")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValnotesError::NotesConflict {
            attempts: 10,
            last: "ref moved".to_string(),
        };
        assert!(err.to_string().contains("after 10 attempts"));
    }

    #[test]
    fn error_hint() {
        let err = ValnotesError::GitNotFound;
        assert_eq!(err.hint(), Some("Install git from https://git-scm.com"));
    }

    #[test]
    fn corrupt_note_hint_names_no_fixed_category() {
        let err = ValnotesError::NoteCorrupt {
            tree_hash: "a".repeat(40),
            reason: "expected value".to_string(),
        };
        let hint = err.hint().unwrap();
        assert!(hint.contains("valnotes/<category>"));
        assert!(!hint.contains("validation"));
    }

    #[test]
    fn error_retryable() {
        let conflict = ValnotesError::NotesConflict {
            attempts: 3,
            last: String::new(),
        };
        assert!(conflict.is_retryable());
        assert!(!ValnotesError::GitNotFound.is_retryable());
    }

    #[test]
    fn missing_binary_is_environment_error() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ValnotesError::command_failed("git status", source);
        assert!(matches!(err, ValnotesError::GitNotFound));
        assert!(err.is_environment());
    }

    #[test]
    fn git_error_trims_stderr() {
        let err = ValnotesError::git("git notes", "fatal: boom\n");
        assert_eq!(err.to_string(), "git command failed: git notes: fatal: boom");
    }
}
