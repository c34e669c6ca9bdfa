//! Tree-hash command - print the working tree fingerprint

use super::print_json;
use crate::cache::ValidationCache;
use crate::cli::args::{OutputFormat, TreeHashArgs};
use crate::config::Config;
use crate::error::ValnotesResult;
use std::path::Path;

/// Execute the tree-hash command
///
/// Prints `not-applicable` outside a working tree; that is not an error.
pub async fn execute(args: TreeHashArgs, config: &Config, dir: &Path) -> ValnotesResult<()> {
    let cache = ValidationCache::open(dir, config.clone()).await;
    let fingerprint = cache.compute_fingerprint().await;

    match args.format {
        OutputFormat::Json => print_json(&fingerprint)?,
        OutputFormat::Table | OutputFormat::Plain => println!("{}", fingerprint),
    }

    Ok(())
}
