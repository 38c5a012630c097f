//! pipecache - command-driven build artifact cache
//!
//! Streams build outputs as tar archives through user-supplied shell
//! commands, and restores them from whatever those commands print back.

pub mod archive;
pub mod bridge;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod ui;

pub use error::{PipecacheError, PipecacheResult};
