//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// valnotes - validation cache and run history in git notes
///
/// Fingerprints the working tree and records validation results against
/// that fingerprint, so unchanged trees never need re-validating.
#[derive(Parser, Debug)]
#[command(name = "valnotes")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "VALNOTES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .valnotes.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the working tree fingerprint
    TreeHash(TreeHashArgs),

    /// Show the cached validation state of the working tree
    State(StateArgs),

    /// Record a validation outcome for the working tree
    Record(RecordArgs),

    /// Inspect and maintain run history
    History(HistoryArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the tree-hash command
#[derive(Parser, Debug)]
pub struct TreeHashArgs {
    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the state command
#[derive(Parser, Debug)]
pub struct StateArgs {
    /// Tree hash to look up (defaults to the current working tree)
    #[arg(long)]
    pub tree_hash: Option<String>,

    /// History category
    #[arg(long)]
    pub category: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the record command
#[derive(Parser, Debug)]
pub struct RecordArgs {
    /// Validation outcome JSON file, or - for stdin
    #[arg(long, default_value = "-")]
    pub outcome: PathBuf,

    /// Tree hash taken before validation started (defaults to the current
    /// working tree)
    #[arg(long)]
    pub tree_hash: Option<String>,

    /// Record even if the working tree no longer matches --tree-hash
    #[arg(long, requires = "tree_hash")]
    pub no_stability_check: bool,

    /// History category
    #[arg(long)]
    pub category: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the history command
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Subcommand for history
    #[command(subcommand)]
    pub action: HistoryAction,

    /// History category (default: from config)
    #[arg(long, global = true)]
    pub category: Option<String>,
}

/// History subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// Show recorded runs for a tree
    Show {
        /// Tree hash (defaults to the current working tree)
        tree_hash: Option<String>,

        /// Show at most this many of the most recent runs
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List every tree with recorded history
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Report note count, size and age
    Health {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove notes whose newest run is old
    Prune {
        /// Remove notes older than N days (default: from config)
        #[arg(long)]
        older_than: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete the history of one tree
    Clear {
        /// Tree hash (defaults to the current working tree)
        tree_hash: Option<String>,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., history.max_append_attempts)
        key: String,
        /// Value to set
        value: String,
        /// Write to project-local .valnotes.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
