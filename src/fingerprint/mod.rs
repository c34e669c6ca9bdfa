//! Working tree fingerprinting
//!
//! A fingerprint is the git tree id the working tree *would* have if every
//! change were staged. It is computed against a private copy of the index so
//! the user's staging area is never touched.
//!
//! # Properties
//!
//! - Staged and unstaged edits, deletions and untracked files all count
//! - Files matched by ignore rules never enter the hash
//! - Staging state does not matter, only content does
//! - A repository without commits hashes normally (the empty tree is valid)

pub mod stability;

pub use stability::{check_stability, StabilityResult};

use crate::error::{ValnotesError, ValnotesResult};
use crate::git::GitRepo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Tree id of the empty tree in SHA-1 repositories
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// A validated git tree object id (40 hex chars for SHA-1, 64 for SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TreeHash(String);

impl TreeHash {
    /// Parse and normalize a tree hash
    pub fn parse(s: &str) -> ValnotesResult<Self> {
        let s = s.trim();
        let valid_len = s.len() == 40 || s.len() == 64;
        if !valid_len || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValnotesError::InvalidTreeHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Full hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for display
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TreeHash {
    type Err = ValnotesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TreeHash {
    type Error = ValnotesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TreeHash> for String {
    fn from(hash: TreeHash) -> Self {
        hash.0
    }
}

/// Outcome of fingerprinting a directory
///
/// `NotApplicable` means there is no cache context (not a git working tree,
/// or git unavailable). Callers must handle it explicitly and run uncached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "treeHash", rename_all = "camelCase")]
pub enum Fingerprint {
    Known(TreeHash),
    NotApplicable,
}

impl Fingerprint {
    /// The tree hash, if caching applies
    pub fn tree_hash(&self) -> Option<&TreeHash> {
        match self {
            Self::Known(hash) => Some(hash),
            Self::NotApplicable => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(hash) => write!(f, "{}", hash),
            Self::NotApplicable => write!(f, "not-applicable"),
        }
    }
}

/// Compute the tree hash of the repository's working tree
pub async fn compute(repo: &GitRepo) -> ValnotesResult<TreeHash> {
    let index_path = repo.git_path("index").await?;

    let scratch = tempfile::Builder::new()
        .prefix("valnotes-index-")
        .tempdir()
        .map_err(|e| ValnotesError::io("creating temporary index directory", e))?;
    let temp_index = scratch.path().join("index");

    // Seeding from the real index keeps stat data, so unchanged files are not re-read
    match tokio::fs::copy(&index_path, &temp_index).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No index at {}, hashing from empty", index_path.display());
        }
        Err(e) => {
            return Err(ValnotesError::io(
                format!("copying index {}", index_path.display()),
                e,
            ))
        }
    }

    let envs = [("GIT_INDEX_FILE", temp_index.as_os_str())];
    repo.run_with(&["add", "--all"], &envs, None).await?;
    let tree = repo.run_with(&["write-tree"], &envs, None).await?;

    TreeHash::parse(&tree).map_err(|_| ValnotesError::GitOutput {
        command: "git write-tree".to_string(),
        output: tree,
    })
}

/// Fingerprint an already-discovered repository, degrading to `NotApplicable`
pub async fn fingerprint_repo(repo: &GitRepo) -> Fingerprint {
    match compute(repo).await {
        Ok(hash) => {
            debug!("Working tree hash: {}", hash);
            Fingerprint::Known(hash)
        }
        Err(e) => {
            warn!("Could not hash working tree, caching disabled: {}", e);
            Fingerprint::NotApplicable
        }
    }
}

/// Fingerprint the working tree containing `dir`
pub async fn fingerprint(dir: &Path) -> Fingerprint {
    match GitRepo::discover(dir).await {
        Ok(repo) => fingerprint_repo(&repo).await,
        Err(e) => {
            debug!("No cache context for {}: {}", dir.display(), e);
            Fingerprint::NotApplicable
        }
    }
}
