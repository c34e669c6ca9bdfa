//! Configuration schema for valnotes
//!
//! Global configuration is stored at `~/.config/valnotes/config.toml`;
//! a project may override any key in `.valnotes.toml`.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Run history recording
    pub history: HistoryConfig,

    /// Store health thresholds
    pub health: HealthConfig,

    /// Pruning defaults
    pub prune: PruneConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// History recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Record validation runs (default: true)
    pub enabled: bool,

    /// Category that validation runs are recorded under
    pub category: String,

    /// Publish attempts before an append gives up
    pub max_append_attempts: u32,

    /// Base delay between append attempts in milliseconds
    pub retry_backoff_ms: u64,

    /// Extracted errors kept per step in a stored record
    pub max_errors_per_step: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            category: "validation".to_string(),
            max_append_attempts: 10,
            retry_backoff_ms: 25,
            max_errors_per_step: 10,
        }
    }
}

/// Health check thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// A note whose newest run is older than this counts as old
    pub stale_after_days: u32,

    /// Warn when more notes than this exist
    pub warn_note_count: usize,

    /// Warn when this many old notes exist
    pub warn_old_note_count: usize,

    /// Warn when all notes together reach this size in KB
    pub warn_total_kb: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stale_after_days: 30,
            warn_note_count: 1000,
            warn_old_note_count: 100,
            warn_total_kb: 5 * 1024,
        }
    }
}

/// Pruning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Default age in days used by `history prune` without --older-than
    pub max_age_days: u32,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self { max_age_days: 90 }
    }
}
