//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_FILE};
use crate::error::{ValnotesError, ValnotesResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

/// Every settable key, with whether it holds a string, bool or integer
const KEYS: [(&str, ValueKind); 11] = [
    ("general.log_format", ValueKind::Text),
    ("history.enabled", ValueKind::Bool),
    ("history.category", ValueKind::Text),
    ("history.max_append_attempts", ValueKind::Integer),
    ("history.retry_backoff_ms", ValueKind::Integer),
    ("history.max_errors_per_step", ValueKind::Integer),
    ("health.stale_after_days", ValueKind::Integer),
    ("health.warn_note_count", ValueKind::Integer),
    ("health.warn_old_note_count", ValueKind::Integer),
    ("health.warn_total_kb", ValueKind::Integer),
    ("prune.max_age_days", ValueKind::Integer),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Bool,
    Integer,
}

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
    dir: &Path,
) -> ValnotesResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value, local }) => {
            let path = if local {
                dir.join(LOCAL_CONFIG_FILE)
            } else {
                manager.path().to_path_buf()
            };
            set_value(&path, &key, &value).await?
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> ValnotesResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> ValnotesResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;

    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

/// Set one key in a config file, keeping every other key the file sets
async fn set_value(path: &Path, key: &str, value: &str) -> ValnotesResult<()> {
    let ctx = UiContext::detect();
    let toml_value = parse_value(key, value)?;

    let mut doc: toml::Table = if path.exists() {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ValnotesError::io(format!("reading {}", path.display()), e))?;
        content
            .parse()
            .map_err(|e: toml::de::Error| ValnotesError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
    } else {
        toml::Table::new()
    };

    set_toml_value(&mut doc, key, toml_value)?;

    // Reject anything the schema cannot load before it reaches disk
    toml::Value::Table(doc.clone())
        .try_into::<Config>()
        .map_err(|e| ValnotesError::User(format!("Invalid value for {}: {}", key, e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ValnotesError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    fs::write(path, toml::to_string_pretty(&doc)?)
        .await
        .map_err(|e| ValnotesError::io(format!("writing {}", path.display()), e))?;

    ui::step_ok(
        &ctx,
        &format!("Set {} = {} in {}", key, value, path.display()),
    );

    Ok(())
}

/// Validate a key and convert its value to the TOML type it is stored as
fn parse_value(key: &str, value: &str) -> ValnotesResult<toml::Value> {
    let Some((_, kind)) = KEYS.iter().find(|(name, _)| *name == key) else {
        let valid: Vec<&str> = KEYS.iter().map(|(name, _)| *name).collect();
        return Err(ValnotesError::User(format!(
            "Unknown config key: {}. Valid keys: {}",
            key,
            valid.join(", ")
        )));
    };

    match kind {
        ValueKind::Text => Ok(toml::Value::String(value.to_string())),
        ValueKind::Bool => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(toml::Value::Boolean(true)),
            "false" | "0" | "no" => Ok(toml::Value::Boolean(false)),
            _ => Err(ValnotesError::User(format!(
                "Invalid boolean value: {}. Use true/false",
                value
            ))),
        },
        ValueKind::Integer => value
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .map(toml::Value::Integer)
            .ok_or_else(|| ValnotesError::User(format!("Invalid number: {}", value))),
    }
}

/// Set a dot-separated key in a TOML table, creating intermediate tables as needed
fn set_toml_value(doc: &mut toml::Table, key: &str, value: toml::Value) -> ValnotesResult<()> {
    let mut parts: Vec<&str> = key.split('.').collect();
    let leaf = parts
        .pop()
        .ok_or_else(|| ValnotesError::User(format!("Invalid config key: {}", key)))?;

    let mut current = doc;
    for part in parts {
        current = current
            .entry(part)
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| ValnotesError::User(format!("Expected table at key: {}", part)))?;
    }

    current.insert(leaf.to_string(), value);
    Ok(())
}
