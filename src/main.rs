//! pipecache - command-driven build artifact cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use pipecache::cli::{Cli, Commands, LogFormat};
use pipecache::config::ConfigManager;
use pipecache::error::{PipecacheError, PipecacheResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

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

async fn run() -> PipecacheResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| PipecacheError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let mut config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;
    cli.apply_overrides(&mut config);

    let format = cli.log_format.unwrap_or(match config.general.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(cli.verbose, format);

    if let Some(ref path) = local_config_path {
        debug!("Using local config: {}", path.display());
    }

    match cli.command {
        Commands::Store(args) => pipecache::cli::commands::store(args, &config).await,
        Commands::Retrieve(args) => pipecache::cli::commands::retrieve(args, &config).await,
        Commands::Key(args) => pipecache::cli::commands::key(args).await,
        Commands::Config(args) => {
            pipecache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// Logs go to stderr so stdout stays usable by scripts
///
/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::new("pipecache=warn"),
        1 => EnvFilter::new("pipecache=info"),
        _ => EnvFilter::new("pipecache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
