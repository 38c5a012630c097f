//! Command-driven artifact cache
//!
//! Build outputs are stored and retrieved by user-supplied shell commands.
//! The cache itself keeps no state: it streams a tar archive of the outputs
//! into the store command, and extracts whatever the retrieve command prints.
//!
//! # Command Contract
//!
//! | Operation | stdin | stdout | Outcome |
//! |-----------|-------|--------|---------|
//! | store | tar stream | logged | always best effort |
//! | retrieve | none | tar stream | hit iff clean stream and exit 0 |
//!
//! Both commands see the key as lowercase hex in `$CACHE_KEY`.

pub mod backend;
pub mod command;
pub mod key;
pub mod target;

pub use backend::{create_cache, Cache};
pub use command::{CacheStats, CommandCache};
pub use key::{CacheKey, CACHE_KEY_ENV};
pub use target::BuildTarget;
