//! Configuration schema for pipecache
//!
//! Configuration is stored at `~/.config/pipecache/config.toml`, optionally
//! layered with a project-local `.pipecache.toml`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Command cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Command cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Shell command that reads a tar stream on stdin and stores it under `$CACHE_KEY`
    pub store_command: String,

    /// Shell command that writes the tar stream stored under `$CACHE_KEY` to stdout
    pub retrieve_command: String,

    /// Shell used to run both commands (invoked as `<shell> -c <command>`)
    pub shell: String,

    /// Kill a command still running after N seconds (0 = disabled)
    pub timeout_secs: u64,

    /// How long a pipe may stay idle after its command exited before it is abandoned
    pub drain_grace_ms: u64,

    /// Maximum bytes of command output kept for logging, per stream
    pub max_output_bytes: usize,
}

impl CacheConfig {
    /// Whether a store command is configured
    pub fn has_store_command(&self) -> bool {
        !self.store_command.trim().is_empty()
    }

    /// Whether a retrieve command is configured
    pub fn has_retrieve_command(&self) -> bool {
        !self.retrieve_command.trim().is_empty()
    }

    /// Command timeout, if enabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Drain grace as a duration
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_command: String::new(),
            retrieve_command: String::new(),
            shell: "sh".to_string(),
            timeout_secs: 0,
            drain_grace_ms: 250,
            max_output_bytes: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.shell, "sh");
        assert!(!config.cache.has_store_command());
        assert_eq!(config.cache.timeout(), None);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            store_command = "cat > /tmp/$CACHE_KEY.tar"
            timeout_secs = 30
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.cache.has_store_command());
        assert!(!config.cache.has_retrieve_command());
        assert_eq!(config.cache.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.cache.drain_grace(), Duration::from_millis(250)); // default preserved
    }

    #[test]
    fn whitespace_command_counts_as_unset() {
        let cache = CacheConfig {
            store_command: "   ".to_string(),
            ..CacheConfig::default()
        };
        assert!(!cache.has_store_command());
    }
}
