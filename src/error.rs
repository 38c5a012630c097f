//! Error types for pipecache
//!
//! All modules use `PipecacheResult<T>` as their return type.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipecache operations
pub type PipecacheResult<T> = Result<T, PipecacheError>;

/// All errors that can occur in pipecache
#[derive(Error, Debug)]
pub enum PipecacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    // Process errors
    #[error("Command failed to start: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` exited with {status}")]
    CommandExit { command: String, status: ExitStatus },

    #[error("Failed waiting for command `{command}`")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` timed out after {}s", .limit.as_secs_f64())]
    Timeout { command: String, limit: Duration },

    #[error("Command exited but left its output pipe open")]
    OrphanedPipe,

    // Archive errors
    #[error("Archive error: {context}")]
    Archive {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive stream was empty")]
    EmptyStream,

    #[error("Archive entry {path} truncated: expected {expected} bytes, found {found}")]
    TruncatedEntry {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("Refusing to extract unsafe archive path: {0}")]
    UnsafeArchivePath(PathBuf),

    #[error("Unsupported archive entry {path}: {kind}")]
    UnsupportedEntry { path: PathBuf, kind: String },

    // Cache errors
    #[error("Cache miss for key {0}")]
    CacheMiss(String),

    #[error("No {0} command configured")]
    CommandNotConfigured(&'static str),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl PipecacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an archive error with context
    pub fn archive(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Archive {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether the error means the archive stream itself was unusable
    pub fn is_stream_corruption(&self) -> bool {
        matches!(
            self,
            Self::Archive { .. }
                | Self::EmptyStream
                | Self::TruncatedEntry { .. }
                | Self::UnsafeArchivePath(_)
                | Self::UnsupportedEntry { .. }
                | Self::OrphanedPipe
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandNotConfigured("store") => {
                Some("Set cache.store_command or pass --store-command")
            }
            Self::CommandNotConfigured("retrieve") => {
                Some("Set cache.retrieve_command or pass --retrieve-command")
            }
            Self::InvalidKey { .. } => Some("Keys are lowercase hex, e.g. --key 00ff1a"),
            Self::CacheMiss(_) => Some("Run with -vv to see the retrieve command's stderr"),
            _ => None,
        }
    }
}
