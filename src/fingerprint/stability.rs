//! Detects working tree changes across a long-running operation

use super::{fingerprint, Fingerprint};
use serde::Serialize;
use std::path::Path;

/// Comparison of the fingerprints taken before and after an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilityResult {
    /// True only when both fingerprints are known and identical
    pub stable: bool,
    pub fingerprint_before: Fingerprint,
    pub fingerprint_after: Fingerprint,
}

impl StabilityResult {
    pub fn compare(before: Fingerprint, after: Fingerprint) -> Self {
        let stable = before.is_known() && before == after;
        Self {
            stable,
            fingerprint_before: before,
            fingerprint_after: after,
        }
    }
}

/// Re-fingerprint `dir` and compare against `before`
///
/// An unstable result is still a valid validation result; it must not be
/// recorded because `before` no longer names the tree it describes.
pub async fn check_stability(dir: &Path, before: &Fingerprint) -> StabilityResult {
    let after = fingerprint(dir).await;
    StabilityResult::compare(before.clone(), after)
}
