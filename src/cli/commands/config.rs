//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{PipecacheError, PipecacheResult};
use crate::ui::{self, UiContext};

const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "cache.store_command",
    "cache.retrieve_command",
    "cache.shell",
    "cache.timeout_secs",
    "cache.drain_grace_ms",
    "cache.max_output_bytes",
];

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> PipecacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> PipecacheResult<()> {
    let toml = toml::to_string_pretty(config)?;
    println!("{}", toml);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> PipecacheResult<()> {
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
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());

    Ok(())
}

/// Set a single key in the user config file
///
/// Only the file being edited is read, so values coming from a local
/// `.pipecache.toml` or the command line are never written back.
async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> PipecacheResult<()> {
    let ctx = UiContext::detect();
    let mut config = manager.load().await?;

    if let Err(e) = apply_value(&mut config, key, value) {
        if matches!(e, PipecacheError::User(_)) && !VALID_KEYS.contains(&key) {
            ui::step_error_detail(&ctx, "Unknown config key", key);
            ui::remark(&ctx, "Valid keys:");
            for valid in VALID_KEYS {
                ui::remark(&ctx, &format!("  {}", valid));
            }
        }
        return Err(e);
    }

    manager.save(&config).await?;
    ui::step_ok_detail(
        &ctx,
        &format!("Set {} = {}", key, value),
        &manager.path().display().to_string(),
    );

    Ok(())
}

fn apply_value(config: &mut Config, key: &str, value: &str) -> PipecacheResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => config.general.log_format = parse_log_format(value)?,
        ["cache", "store_command"] => config.cache.store_command = value.to_string(),
        ["cache", "retrieve_command"] => config.cache.retrieve_command = value.to_string(),
        ["cache", "shell"] => config.cache.shell = value.to_string(),
        ["cache", "timeout_secs"] => config.cache.timeout_secs = parse_number(value)?,
        ["cache", "drain_grace_ms"] => config.cache.drain_grace_ms = parse_number(value)?,
        ["cache", "max_output_bytes"] => config.cache.max_output_bytes = parse_number(value)?,
        _ => return Err(PipecacheError::User(format!("Unknown config key: {}", key))),
    }

    Ok(())
}

fn parse_log_format(value: &str) -> PipecacheResult<String> {
    match value.to_lowercase().as_str() {
        format @ ("text" | "json") => Ok(format.to_string()),
        _ => Err(PipecacheError::User(format!(
            "Invalid log format: {}. Use text/json",
            value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> PipecacheResult<T> {
    value
        .parse()
        .map_err(|_| PipecacheError::User(format!("Invalid number: {}", value)))
}
