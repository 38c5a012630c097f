//! Cache backend abstraction
//!
//! Provides the trait the build system talks to, plus a factory that picks
//! the command-driven backend when it is configured.

use crate::cache::command::CommandCache;
use crate::cache::key::CacheKey;
use crate::cache::target::BuildTarget;
use crate::config::CacheConfig;
use async_trait::async_trait;
use std::path::PathBuf;

/// Abstract artifact cache interface
///
/// Failures never escape: a failed store is logged and a failed retrieve is
/// a miss, so the cache can never abort a build.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store the given outputs of `target` under `key`, best effort
    async fn store(&self, target: &BuildTarget, key: &CacheKey, outputs: &[String]);

    /// Restore the outputs stored under `key`; true on a hit
    async fn retrieve(&self, target: &BuildTarget, key: &CacheKey, outputs: &[String]) -> bool;

    /// Remove anything cached for `target`
    async fn clean(&self, target: &BuildTarget);

    /// Remove everything cached
    async fn clean_all(&self);

    /// Release any resources held by the backend
    async fn shutdown(&self);
}

/// Create the command-driven cache if either command is configured
///
/// # Arguments
/// * `config` - The cache section of the configuration
/// * `root` - Workspace root that output directories are relative to
///
/// # Returns
/// * `Some(Box<dyn Cache>)` - When a store or retrieve command is set
/// * `None` - When the backend is not configured at all
pub fn create_cache(config: &CacheConfig, root: impl Into<PathBuf>) -> Option<Box<dyn Cache>> {
    if !config.has_store_command() && !config.has_retrieve_command() {
        return None;
    }
    Some(Box::new(CommandCache::new(config.clone(), root)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_skips_unconfigured_backend() {
        assert!(create_cache(&CacheConfig::default(), "/tmp").is_none());
    }

    #[test]
    fn factory_builds_with_either_command() {
        let store_only = CacheConfig {
            store_command: "cat > /dev/null".to_string(),
            ..CacheConfig::default()
        };
        assert!(create_cache(&store_only, "/tmp").is_some());

        let retrieve_only = CacheConfig {
            retrieve_command: "cat /dev/null".to_string(),
            ..CacheConfig::default()
        };
        assert!(create_cache(&retrieve_only, "/tmp").is_some());
    }
}
