//! CLI command implementations

pub mod config;
pub mod history;
pub mod record;
pub mod state;
pub mod tree_hash;

pub use config::execute as config;
pub use history::execute as history;
pub use record::execute as record;
pub use state::execute as state;
pub use tree_hash::execute as tree_hash;

use crate::cache::ValidationCache;
use crate::config::Config;
use crate::error::{ValnotesError, ValnotesResult};
use crate::fingerprint::{Fingerprint, TreeHash};
use crate::notes::Category;
use serde::Serialize;
use std::path::Path;

/// Open the cache for `dir`, switching to `category` when one is given
async fn open_cache(
    dir: &Path,
    config: &Config,
    category: Option<&str>,
) -> ValnotesResult<ValidationCache> {
    let cache = ValidationCache::open(dir, config.clone()).await;
    match category {
        Some(name) => Ok(cache.with_category(Category::new(name)?)),
        None => Ok(cache),
    }
}

/// The tree hash given on the command line, or the current working tree's
async fn resolve_tree(
    cache: &ValidationCache,
    dir: &Path,
    given: Option<&str>,
) -> ValnotesResult<TreeHash> {
    if let Some(hash) = given {
        return TreeHash::parse(hash);
    }

    match cache.compute_fingerprint().await {
        Fingerprint::Known(tree) => Ok(tree),
        Fingerprint::NotApplicable if cache.repo().is_none() => {
            Err(ValnotesError::NotARepository(dir.to_path_buf()))
        }
        Fingerprint::NotApplicable => Err(ValnotesError::User(
            "Could not fingerprint the working tree (re-run with -v for details)".to_string(),
        )),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> ValnotesResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
