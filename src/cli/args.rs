//! CLI argument definitions using clap derive

use crate::cache::{BuildTarget, CacheKey};
use crate::config::Config;
use crate::error::PipecacheResult;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// pipecache - command-driven build artifact cache
///
/// Streams build outputs as tar archives through user-supplied shell
/// commands, which decide where the archives actually live.
#[derive(Parser, Debug)]
#[command(name = "pipecache")]
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
    #[arg(short, long, global = true, env = "PIPECACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .pipecache.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,

    /// Log output format (defaults to general.log_format)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Store command, overriding cache.store_command
    #[arg(long, global = true, env = "PIPECACHE_STORE_COMMAND")]
    pub store_command: Option<String>,

    /// Retrieve command, overriding cache.retrieve_command
    #[arg(long, global = true, env = "PIPECACHE_RETRIEVE_COMMAND")]
    pub retrieve_command: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(command) = &self.store_command {
            config.cache.store_command = command.clone();
        }
        if let Some(command) = &self.retrieve_command {
            config.cache.retrieve_command = command.clone();
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive a target's outputs into the store command
    Store(StoreArgs),

    /// Restore a target's outputs from the retrieve command
    Retrieve(RetrieveArgs),

    /// Print the cache key derived from input files
    Key(KeyArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Where a target's outputs live
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Workspace root that the output directory is relative to
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Output directory of the target, relative to the root
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Target label used in logs (defaults to the output directory)
    #[arg(long)]
    pub label: Option<String>,
}

impl TargetArgs {
    /// Build the target identity
    pub fn build_target(&self) -> BuildTarget {
        let label = self
            .label
            .clone()
            .unwrap_or_else(|| self.out_dir.display().to_string());
        BuildTarget::new(label, self.out_dir.clone())
    }
}

/// How the cache key is supplied
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct KeySourceArgs {
    /// Cache key as hex
    #[arg(long)]
    pub key: Option<String>,

    /// Derive the key from the SHA256 of these files
    #[arg(long, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
}

impl KeySourceArgs {
    /// Resolve to a cache key
    pub fn resolve(&self) -> PipecacheResult<CacheKey> {
        match &self.key {
            Some(hex) => CacheKey::parse_hex(hex),
            None => CacheKey::digest_files(&self.inputs),
        }
    }
}

/// Arguments for the store command
#[derive(Parser, Debug)]
pub struct StoreArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub key: KeySourceArgs,

    /// Outputs to store, relative to the output directory
    #[arg(required = true, last = true)]
    pub outputs: Vec<String>,
}

/// Arguments for the retrieve command
#[derive(Parser, Debug)]
pub struct RetrieveArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub key: KeySourceArgs,
}

/// Arguments for the key command
#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Files whose contents make up the key
    #[arg(long, num_args = 1.., required = true)]
    pub inputs: Vec<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
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
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.store_command)
        key: String,

        /// Value to set
        value: String,
    },
}
