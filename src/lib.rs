//! valnotes - content-addressed validation cache on git notes
//!
//! Fingerprints a working tree (including uncommitted edits) as a git tree
//! hash and keeps an append-only history of validation runs per
//! fingerprint, stored as git notes so it travels with the repository.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod git;
pub mod history;
pub mod notes;
pub mod ui;

pub use cache::{RecordResult, RecordSkip, ValidationCache};
pub use error::{ValnotesError, ValnotesResult};
pub use fingerprint::{Fingerprint, StabilityResult, TreeHash};
