//! Record command - append a validation outcome to the tree's history

use super::{open_cache, print_json};
use crate::cache::{RecordResult, RecordSkip};
use crate::cli::args::{OutputFormat, RecordArgs};
use crate::config::Config;
use crate::error::{ValnotesError, ValnotesResult};
use crate::fingerprint::{Fingerprint, StabilityResult, TreeHash};
use crate::history::ValidationOutcome;
use crate::ui::{self, UiContext};
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordOutput {
    fingerprint: Fingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    stability: Option<StabilityResult>,
    #[serde(flatten)]
    result: RecordResult,
}

/// Execute the record command
///
/// Never fails because a run could not be recorded; the reason is reported
/// instead. Only unusable input is an error.
pub async fn execute(args: RecordArgs, config: &Config, dir: &Path) -> ValnotesResult<()> {
    let cache = open_cache(dir, config, args.category.as_deref()).await?;
    let outcome = read_outcome(&args.outcome).await?;

    let (fingerprint, stability) = match args.tree_hash.as_deref() {
        Some(hash) => {
            let before = Fingerprint::Known(TreeHash::parse(hash)?);
            let stability = if args.no_stability_check {
                None
            } else {
                Some(cache.check_stability(&before).await)
            };
            (before, stability)
        }
        None => (cache.compute_fingerprint().await, None),
    };

    let result = match (fingerprint.tree_hash(), &stability) {
        (_, Some(check)) if !check.stable => RecordResult::skipped(RecordSkip::TreeChanged, 0),
        (Some(tree), _) => cache.record_run(tree, &outcome).await,
        (None, _) => RecordResult::skipped(RecordSkip::NotARepository, 0),
    };

    let output = RecordOutput {
        fingerprint,
        stability,
        result,
    };

    match args.format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Plain => match (&output.result.run_id, &output.result.skipped) {
            (Some(id), _) => println!("{}", id),
            (None, Some(reason)) => println!("skipped: {}", reason),
            (None, None) => println!("skipped"),
        },
        OutputFormat::Table => print_table(&output),
    }

    Ok(())
}

async fn read_outcome(path: &Path) -> ValnotesResult<ValidationOutcome> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .map_err(|e| ValnotesError::io("reading validation outcome from stdin", e))?;
        buf
    } else {
        fs::read_to_string(path)
            .await
            .map_err(|e| ValnotesError::io(format!("reading {}", path.display()), e))?
    };

    serde_json::from_str(&content)
        .map_err(|e| ValnotesError::User(format!("Invalid validation outcome: {}", e)))
}

fn print_table(output: &RecordOutput) {
    let ctx = UiContext::detect();
    let result = &output.result;

    match (&result.run_id, &result.skipped) {
        (Some(id), _) => {
            ui::step_ok_detail(
                &ctx,
                &format!("Recorded run for {}", output.fingerprint),
                &id.to_string(),
            );
            if let Some(runs) = result.runs_in_note {
                ui::key_value(&ctx, "Runs for this tree", &runs.to_string());
            }
            if result.attempts > 1 {
                ui::remark(
                    &ctx,
                    &format!("Published after {} attempts", result.attempts),
                );
            }
        }
        (None, Some(reason)) => ui::step_warn_hint(&ctx, "Run not recorded", &reason.to_string()),
        (None, None) => ui::step_warn(&ctx, "Run not recorded"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_outcome_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"passed": true, "summary": "all green"}}"#).unwrap();

        let outcome = read_outcome(file.path()).await.unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.summary.as_deref(), Some("all green"));
    }

    #[tokio::test]
    async fn rejects_malformed_outcome() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "passed").unwrap();

        let err = read_outcome(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid validation outcome"));
    }
}
