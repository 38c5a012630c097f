//! Build target identity as seen by the cache

use std::fmt;
use std::path::{Path, PathBuf};

/// The build unit whose outputs are being stored or retrieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Human-readable label, used only for logging
    pub label: String,
    /// Output directory, relative to the cache's workspace root
    pub out_dir: PathBuf,
}

impl BuildTarget {
    /// Create a new target
    pub fn new(label: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            out_dir: out_dir.into(),
        }
    }

    /// Output directory relative to the workspace root
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
