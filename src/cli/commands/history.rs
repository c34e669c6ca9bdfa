//! History command - inspect and maintain run history

use super::{open_cache, print_json, resolve_tree};
use crate::cache::ValidationCache;
use crate::cli::args::{HistoryAction, HistoryArgs, OutputFormat};
use crate::config::Config;
use crate::error::{ValnotesError, ValnotesResult};
use crate::history::{detect_flakiness, format_bytes, HealthReport, PruneResult, SizeStatus};
use crate::notes::NoteLookup;
use crate::ui::{self, UiContext};
use console::style;
use std::path::Path;

/// Execute the history command
pub async fn execute(args: HistoryArgs, config: &Config, dir: &Path) -> ValnotesResult<()> {
    let cache = open_cache(dir, config, args.category.as_deref()).await?;

    match args.action {
        HistoryAction::Show {
            tree_hash,
            limit,
            format,
        } => show(&cache, dir, tree_hash.as_deref(), limit, format).await,
        HistoryAction::List { format } => list(&cache, format).await,
        HistoryAction::Health { format } => health(&cache, format).await,
        HistoryAction::Prune {
            older_than,
            dry_run,
            format,
        } => {
            let days = older_than.unwrap_or(config.prune.max_age_days);
            prune(&cache, days, dry_run, format).await
        }
        HistoryAction::Clear { tree_hash } => clear(&cache, dir, tree_hash.as_deref()).await,
    }
}

async fn show(
    cache: &ValidationCache,
    dir: &Path,
    tree_hash: Option<&str>,
    limit: Option<usize>,
    format: OutputFormat,
) -> ValnotesResult<()> {
    let tree = resolve_tree(cache, dir, tree_hash).await?;

    let mut note = match cache.lookup_history(&tree).await {
        NoteLookup::Found(note) => note,
        NoteLookup::Missing => {
            match format {
                OutputFormat::Json => println!("null"),
                OutputFormat::Plain => {}
                OutputFormat::Table => {
                    let ctx = UiContext::detect();
                    ui::step_info(&ctx, &format!("No history for {}", tree.short()));
                }
            }
            return Ok(());
        }
        NoteLookup::Unreadable(reason) => {
            return Err(ValnotesError::NoteCorrupt {
                tree_hash: tree.to_string(),
                reason,
            })
        }
    };

    let flakiness = detect_flakiness(&note);
    if let Some(limit) = limit {
        let skip = note.runs.len().saturating_sub(limit);
        note.runs.drain(..skip);
    }

    match format {
        OutputFormat::Json => print_json(&note)?,
        OutputFormat::Plain => {
            for run in &note.runs {
                println!(
                    "{} {} {}",
                    run.id,
                    if run.passed { "passed" } else { "failed" },
                    run.timestamp.to_rfc3339()
                );
            }
        }
        OutputFormat::Table => {
            println!(
                "{:<20} {:<8} {:>10} {:<24} {:<8}",
                style("RECORDED").bold(),
                style("RESULT").bold(),
                style("DURATION").bold(),
                style("BRANCH").bold(),
                style("ID").bold()
            );
            println!("{}", "-".repeat(74));

            for run in &note.runs {
                let result = if run.passed {
                    style("passed").green()
                } else {
                    style("failed").red()
                };
                let id = run.id.simple().to_string();
                println!(
                    "{:<20} {:<8} {:>10} {:<24} {:<8}",
                    run.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    result,
                    format!("{:.1}s", run.duration_ms as f64 / 1000.0),
                    run.branch,
                    &id[..8]
                );
            }

            println!();
            println!("Tree {}", note.tree_hash);
            if flakiness.flaky {
                let ctx = UiContext::detect();
                ui::step_warn(
                    &ctx,
                    &format!(
                        "Flaky: {} passed, {} failed on identical content",
                        flakiness.passed, flakiness.failed
                    ),
                );
            }
        }
    }

    Ok(())
}

async fn list(cache: &ValidationCache, format: OutputFormat) -> ValnotesResult<()> {
    let entries = cache.list_history().await;

    if entries.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, &format!("No history in {}", cache.category()));
            }
        }
        return Ok(());
    }

    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.tree_hash);
            }
        }
        OutputFormat::Table => {
            println!("{:<66} {:>10}", style("TREE").bold(), style("SIZE").bold());
            println!("{}", "-".repeat(77));
            for entry in &entries {
                println!(
                    "{:<66} {:>10}",
                    entry.tree_hash,
                    format_bytes(entry.size_bytes)
                );
            }
            let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
            println!();
            println!("Total: {} note(s), {}", entries.len(), format_bytes(total));
        }
    }

    Ok(())
}

async fn health(cache: &ValidationCache, format: OutputFormat) -> ValnotesResult<()> {
    let report = cache.check_health().await;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Plain => println!(
            "{} {} {} {}",
            report.total_notes,
            report.total_size_bytes,
            report.old_note_count,
            if report.should_warn { "warn" } else { "ok" }
        ),
        OutputFormat::Table => print_health(&report),
    }

    Ok(())
}

fn print_health(report: &HealthReport) {
    let ctx = UiContext::detect();

    ui::section(&ctx, &format!("History health ({})", report.category));
    ui::key_value(&ctx, "Notes", &report.total_notes.to_string());
    ui::key_value_status(
        &ctx,
        "Size",
        &format_bytes(report.total_size_bytes),
        report.size_status == SizeStatus::Ok,
    );
    ui::key_value(&ctx, "Old notes", &report.old_note_count.to_string());
    if report.unreadable_notes > 0 {
        ui::key_value_status(
            &ctx,
            "Unreadable notes",
            &report.unreadable_notes.to_string(),
            false,
        );
    }

    match &report.warning_message {
        Some(message) => ui::step_warn(&ctx, message),
        None => ui::step_ok(&ctx, "History store is healthy"),
    }
}

async fn prune(
    cache: &ValidationCache,
    days: u32,
    dry_run: bool,
    format: OutputFormat,
) -> ValnotesResult<()> {
    let result = cache.prune_by_age(days, dry_run).await;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Plain => {
            for tree in &result.pruned_tree_hashes {
                println!("{}", tree);
            }
        }
        OutputFormat::Table => print_prune(&result, days),
    }

    Ok(())
}

fn print_prune(result: &PruneResult, days: u32) {
    let ctx = UiContext::detect();

    if result.pruned_tree_hashes.is_empty() && result.failed.is_empty() {
        ui::step_info(&ctx, &format!("No history older than {} days", days));
        return;
    }

    let verb = if result.dry_run { "Would remove" } else { "Removed" };
    for tree in &result.pruned_tree_hashes {
        println!("  {} {}", style(verb).dim(), tree);
    }
    for failure in &result.failed {
        ui::step_warn_hint(&ctx, &format!("Kept {}", failure.tree_hash), &failure.reason);
    }

    println!();
    println!(
        "{} {} note(s), {} run(s); {} note(s) remain",
        verb, result.notes_pruned, result.runs_pruned, result.notes_remaining
    );
    if result.dry_run {
        ui::remark(&ctx, "Run without --dry-run to delete");
    }
}

async fn clear(cache: &ValidationCache, dir: &Path, tree_hash: Option<&str>) -> ValnotesResult<()> {
    let tree = resolve_tree(cache, dir, tree_hash).await?;
    let ctx = UiContext::detect();

    if cache.clear_history(&tree).await {
        ui::step_ok(&ctx, &format!("Cleared history for {}", tree.short()));
    } else {
        ui::step_info(&ctx, &format!("No history for {}", tree.short()));
    }

    Ok(())
}
