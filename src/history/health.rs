//! Store size and age monitoring

use super::{scan, ScannedNote};
use crate::config::HealthConfig;
use crate::error::ValnotesResult;
use crate::notes::{Category, NotesLog};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Store size relative to the configured limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeStatus {
    /// Under 80% of limit
    Ok,
    /// Between 80% and 100% of limit
    Warning,
    /// At or over the limit
    Exceeded,
}

impl SizeStatus {
    /// Determine status based on current size and limit
    pub fn from_usage(current_bytes: u64, limit_bytes: u64) -> Self {
        let percent = Self::percentage(current_bytes, limit_bytes);
        if limit_bytes == 0 {
            Self::Ok
        } else if percent >= 100.0 {
            Self::Exceeded
        } else if percent >= 80.0 {
            Self::Warning
        } else {
            Self::Ok
        }
    }

    /// Get percentage of limit used
    pub fn percentage(current_bytes: u64, limit_bytes: u64) -> f64 {
        if limit_bytes == 0 {
            return 0.0;
        }
        (current_bytes as f64 / limit_bytes as f64) * 100.0
    }
}

/// Snapshot of one category's notes. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub category: String,
    pub total_notes: usize,
    pub total_size_bytes: u64,
    /// Notes whose newest run is older than the staleness threshold
    pub old_note_count: usize,
    pub unreadable_notes: usize,
    pub size_status: SizeStatus,
    pub should_warn: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_message: Option<String>,
}

impl HealthReport {
    /// Report for a category with no readable notes
    pub fn empty(category: &Category) -> Self {
        Self {
            category: category.to_string(),
            total_notes: 0,
            total_size_bytes: 0,
            old_note_count: 0,
            unreadable_notes: 0,
            size_status: SizeStatus::Ok,
            should_warn: false,
            warning_message: None,
        }
    }
}

/// Computes [`HealthReport`]s against configured thresholds
pub struct HealthMonitor {
    log: NotesLog,
    thresholds: HealthConfig,
}

impl HealthMonitor {
    pub fn new(log: NotesLog, thresholds: HealthConfig) -> Self {
        Self { log, thresholds }
    }

    pub async fn check(&self, category: &Category, now: DateTime<Utc>) -> ValnotesResult<HealthReport> {
        let scanned = scan(&self.log, category).await?;
        Ok(evaluate(category, &scanned, &self.thresholds, now))
    }
}

fn evaluate(
    category: &Category,
    scanned: &[ScannedNote],
    thresholds: &HealthConfig,
    now: DateTime<Utc>,
) -> HealthReport {
    let stale_before = now - Duration::days(i64::from(thresholds.stale_after_days));

    let total_notes = scanned.len();
    let total_size_bytes = scanned.iter().map(|n| n.entry.size_bytes).sum();
    let unreadable_notes = scanned.iter().filter(|n| n.unreadable.is_some()).count();
    let old_note_count = scanned
        .iter()
        .filter(|n| n.unreadable.is_none())
        .filter(|n| n.newest.map_or(true, |newest| newest < stale_before))
        .count();

    let limit_bytes = thresholds.warn_total_kb.saturating_mul(1024);
    let size_status = SizeStatus::from_usage(total_size_bytes, limit_bytes);

    let mut reasons = Vec::new();
    if size_status == SizeStatus::Exceeded {
        reasons.push(format!(
            "history notes use {} (limit {})",
            format_bytes(total_size_bytes),
            format_bytes(limit_bytes)
        ));
    }
    if total_notes > thresholds.warn_note_count {
        reasons.push(format!("{} notes stored", total_notes));
    }
    if old_note_count >= thresholds.warn_old_note_count {
        reasons.push(format!(
            "{} notes older than {} days",
            old_note_count, thresholds.stale_after_days
        ));
    }

    let should_warn = !reasons.is_empty();
    let warning_message = should_warn.then(|| {
        format!(
            "{}. Run: valnotes history prune --category {}",
            reasons.join(", "),
            category
        )
    });

    HealthReport {
        category: category.to_string(),
        total_notes,
        total_size_bytes,
        old_note_count,
        unreadable_notes,
        size_status,
        should_warn,
        warning_message,
    }
}
