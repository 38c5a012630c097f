//! Streaming tar archives of build outputs
//!
//! The writer turns an output directory listing into a tar stream; the reader
//! materializes such a stream under a destination root. Both work on plain
//! `std::io` streams so they can run on a blocking task against a pipe.

pub mod reader;
pub mod writer;

pub use reader::read_artifacts;
pub use writer::write_artifacts;

use std::fmt;

/// Counts of what went into (or came out of) one archive stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Regular files archived or extracted
    pub files: usize,
    /// Directories archived or extracted
    pub directories: usize,
    /// File payload bytes
    pub bytes: u64,
    /// Paths that could not be archived and were left out
    pub skipped: usize,
}

impl fmt::Display for ArchiveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files, {} directories, {} bytes",
            self.files, self.directories, self.bytes
        )?;
        if self.skipped > 0 {
            write!(f, " ({} skipped)", self.skipped)?;
        }
        Ok(())
    }
}
