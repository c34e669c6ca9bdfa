//! valnotes - validation cache CLI
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use valnotes::cli::{Cli, Commands};
use valnotes::config::{Config, ConfigManager};
use valnotes::error::{ValnotesError, ValnotesResult};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ValnotesResult<()> {
    let cli = Cli::parse();

    let dir = match &cli.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|e| ValnotesError::io("getting current directory", e))?,
    };

    // Load configuration
    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        ConfigManager::find_local_config(&dir)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    match &local_config_path {
        Some(path) => debug!("Using local config: {}", path.display()),
        None if cli.no_local => debug!("Local config discovery disabled (--no-local)"),
        None => {}
    }

    dispatch(cli.command, &config, &config_manager, dir).await
}

/// Logs go to stderr so command output stays parseable
fn init_logging(verbose: u8, config: &Config) {
    // 0 = warn, 1 = info, 2+ = debug
    let filter = match verbose {
        0 => EnvFilter::new("valnotes=warn"),
        1 => EnvFilter::new("valnotes=info"),
        _ => EnvFilter::new("valnotes=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

async fn dispatch(
    command: Commands,
    config: &Config,
    manager: &ConfigManager,
    dir: PathBuf,
) -> ValnotesResult<()> {
    use valnotes::cli::commands;

    match command {
        Commands::TreeHash(args) => commands::tree_hash(args, config, &dir).await,
        Commands::State(args) => commands::state(args, config, &dir).await,
        Commands::Record(args) => commands::record(args, config, &dir).await,
        Commands::History(args) => commands::history(args, config, &dir).await,
        Commands::Config(args) => commands::config(args, config, manager, &dir).await,
    }
}
