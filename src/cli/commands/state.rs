//! State command - show whether the working tree is already validated

use super::{open_cache, print_json};
use crate::cli::args::{OutputFormat, StateArgs};
use crate::config::Config;
use crate::error::ValnotesResult;
use crate::fingerprint::{Fingerprint, TreeHash};
use crate::history::{detect_flakiness, most_recent, FlakinessReport, RunRecord};
use crate::notes::NoteLookup;
use crate::ui::{self, UiContext};
use serde::Serialize;
use std::path::Path;

/// Cached validation state of one tree
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateReport {
    fingerprint: Fingerprint,
    /// The most recent recorded run passed
    cached: bool,
    runs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    most_recent: Option<RunRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flakiness: Option<FlakinessReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unreadable: Option<String>,
}

/// Execute the state command
pub async fn execute(args: StateArgs, config: &Config, dir: &Path) -> ValnotesResult<()> {
    let cache = open_cache(dir, config, args.category.as_deref()).await?;

    let fingerprint = match args.tree_hash.as_deref() {
        Some(hash) => Fingerprint::Known(TreeHash::parse(hash)?),
        None => cache.compute_fingerprint().await,
    };

    let mut report = StateReport {
        fingerprint: fingerprint.clone(),
        cached: false,
        runs: 0,
        most_recent: None,
        flakiness: None,
        unreadable: None,
    };

    if let Some(tree) = fingerprint.tree_hash() {
        match cache.lookup_history(tree).await {
            NoteLookup::Found(note) => {
                let latest = most_recent(&note).cloned();
                report.cached = latest.as_ref().is_some_and(|run| run.passed);
                report.runs = note.runs.len();
                report.flakiness = Some(detect_flakiness(&note));
                report.most_recent = latest;
            }
            NoteLookup::Missing => {}
            NoteLookup::Unreadable(reason) => report.unreadable = Some(reason),
        }
    }

    match args.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Plain => println!("{}", if report.cached { "passed" } else { "uncached" }),
        OutputFormat::Table => print_table(&report),
    }

    Ok(())
}

fn print_table(report: &StateReport) {
    let ctx = UiContext::detect();

    ui::key_value(&ctx, "Tree", &report.fingerprint.to_string());

    if !report.fingerprint.is_known() {
        ui::step_warn_hint(&ctx, "No cache context", "validation must run uncached");
        return;
    }
    if let Some(reason) = &report.unreadable {
        ui::step_error_detail(&ctx, "History note is unreadable", reason);
        return;
    }
    let Some(latest) = &report.most_recent else {
        ui::step_info(&ctx, "No recorded runs for this tree");
        return;
    };

    ui::key_value_status(
        &ctx,
        "Most recent",
        if latest.passed { "passed" } else { "failed" },
        latest.passed,
    );
    ui::key_value(
        &ctx,
        "Recorded",
        &latest.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    ui::key_value(&ctx, "Runs", &report.runs.to_string());

    if let Some(flakiness) = report.flakiness.filter(|f| f.flaky) {
        ui::step_warn(
            &ctx,
            &format!(
                "Flaky: {} passed, {} failed on identical content",
                flakiness.passed, flakiness.failed
            ),
        );
    }
}
