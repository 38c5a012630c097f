//! Command-driven cache backend
//!
//! Store pipes a tar stream of the target's outputs into the configured
//! store command; retrieve extracts the tar stream printed by the retrieve
//! command. All persistent state lives wherever those commands put it, so
//! cleaning is a no-op here.

use crate::archive::{self, ArchiveSummary};
use crate::bridge::{BridgeOptions, ProcessBridge, RetrieveReport, StoreReport};
use crate::cache::backend::Cache;
use crate::cache::key::CacheKey;
use crate::cache::target::BuildTarget;
use crate::config::CacheConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Point-in-time view of a cache's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Commands spawned (or attempted)
    pub spawned: usize,
    /// Store calls that ran a command
    pub stores: u64,
    /// Retrieves that produced a hit
    pub hits: u64,
    /// Retrieves that missed
    pub misses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    stores: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache backend that delegates storage to external shell commands
#[derive(Debug)]
pub struct CommandCache {
    config: CacheConfig,
    root: PathBuf,
    bridge: ProcessBridge,
    counters: Counters,
}

impl CommandCache {
    /// Create a cache whose targets' output directories are relative to `root`
    pub fn new(config: CacheConfig, root: impl Into<PathBuf>) -> Self {
        let bridge = ProcessBridge::new(BridgeOptions::from(&config));
        Self {
            config,
            root: root.into(),
            bridge,
            counters: Counters::default(),
        }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            spawned: self.bridge.spawn_count(),
            stores: self.counters.stores.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    /// Store and return the full report; `None` when no store command is set
    pub async fn store_with_report(
        &self,
        target: &BuildTarget,
        key: &CacheKey,
        outputs: &[String],
    ) -> Option<StoreReport<ArchiveSummary>> {
        if !self.config.has_store_command() {
            return None;
        }
        debug!("Storing {}: {} in command cache...", target, key);

        let root = self.root.clone();
        let out_dir = target.out_dir.clone();
        let outputs = outputs.to_vec();
        let report = self
            .bridge
            .run_store(&self.config.store_command, key, move |sink| {
                archive::write_artifacts(sink, &root, &out_dir, &outputs)
            })
            .await;

        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        if let Ok(summary) = &report.fed {
            debug!("Sent {} for {}", summary, target);
        }
        Some(report)
    }

    /// Retrieve and return the full report
    pub async fn retrieve_with_report(
        &self,
        target: &BuildTarget,
        key: &CacheKey,
    ) -> RetrieveReport<ArchiveSummary> {
        debug!("Retrieve {}: {} from command cache...", target, key);

        let root = self.root.clone();
        let report = self
            .bridge
            .run_retrieve(&self.config.retrieve_command, key, move |source| {
                archive::read_artifacts(source, &root)
            })
            .await;

        if report.is_hit() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            if let Ok(summary) = &report.decoded {
                debug!("Restored {} for {}", summary, target);
            }
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        report
    }
}

#[async_trait]
impl Cache for CommandCache {
    async fn store(&self, target: &BuildTarget, key: &CacheKey, outputs: &[String]) {
        self.store_with_report(target, key, outputs).await;
    }

    async fn retrieve(&self, target: &BuildTarget, key: &CacheKey, _outputs: &[String]) -> bool {
        self.retrieve_with_report(target, key).await.is_hit()
    }

    async fn clean(&self, _target: &BuildTarget) {}

    async fn clean_all(&self) {}

    async fn shutdown(&self) {}
}
