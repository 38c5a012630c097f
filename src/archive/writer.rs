//! Archive writer
//!
//! Walks each requested output under the target's output directory and
//! appends it to a tar stream. Outputs that cannot be read are logged and
//! left out; the rest of the set is still archived.

use super::ArchiveSummary;
use crate::error::{PipecacheError, PipecacheResult};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tar::{EntryType, Header, HeaderMode};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Sink wrapper that can be poisoned once the stream is known to be broken.
///
/// `tar::Builder` appends the end-of-archive trailer when dropped. After a
/// failure mid-entry that trailer would make a truncated stream look
/// complete, so a poisoned sink rejects every further write.
struct StreamSink<W> {
    inner: W,
    poisoned: bool,
}

impl<W: Write> StreamSink<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            poisoned: false,
        }
    }

    fn poison(&mut self) {
        self.poisoned = true;
    }
}

impl<W: Write> Write for StreamSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "archive stream aborted",
            ));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.poisoned {
            return Ok(());
        }
        self.inner.flush()
    }
}

/// File contents capped at the size recorded in the header.
///
/// A file that grows while it is archived is cut at the header size; one
/// that shrinks fails the read, since the entry can no longer be completed.
struct SizedReader<R> {
    inner: io::Take<R>,
    remaining: u64,
}

impl<R: Read> SizedReader<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner: inner.take(size),
            remaining: size,
        }
    }
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && self.remaining > 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank by {} bytes while archiving", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// How appending a single path went wrong
enum AppendError {
    /// Nothing was written for this path; the stream is still consistent
    Skipped(PipecacheError),
    /// The stream may hold a partial entry and cannot be continued
    Fatal(PipecacheError),
}

/// Write `outputs` (relative to `root/out_dir`) to `sink` as a tar stream.
///
/// Entry names are relative to `root`. Entries appear in walk order, sorted
/// by file name within each directory. The sink is consumed and dropped on
/// every return path, which closes the stream for the reader.
///
/// Returns an error only when the stream itself broke; unreadable outputs
/// are counted in [`ArchiveSummary::skipped`].
pub fn write_artifacts<W: Write>(
    sink: W,
    root: &Path,
    out_dir: &Path,
    outputs: &[String],
) -> PipecacheResult<ArchiveSummary> {
    let mut builder = tar::Builder::new(StreamSink::new(sink));
    let mut summary = ArchiveSummary::default();
    let base = root.join(out_dir);

    for output in outputs {
        let start = base.join(output);

        for entry in WalkDir::new(&start).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        "Error sending artifacts to command cache: {}: {}",
                        start.display(),
                        e
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            let appended = append_entry(
                &mut builder,
                root,
                entry.path(),
                entry.file_type(),
                &mut summary,
            );
            match appended {
                Ok(()) => {}
                Err(AppendError::Skipped(e)) => {
                    warn!("Error sending artifacts to command cache: {}", e);
                    summary.skipped += 1;
                }
                Err(AppendError::Fatal(e)) => {
                    builder.get_mut().poison();
                    return Err(e);
                }
            }
        }
    }

    let mut sink = builder
        .into_inner()
        .map_err(|e| PipecacheError::archive("writing end-of-archive trailer", e))?;
    sink.flush()
        .map_err(|e| PipecacheError::archive("flushing archive stream", e))?;

    debug!("Archived {}", summary);
    Ok(summary)
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    path: &Path,
    file_type: std::fs::FileType,
    summary: &mut ArchiveSummary,
) -> Result<(), AppendError> {
    let name = match path.strip_prefix(root) {
        Ok(name) if !name.as_os_str().is_empty() => name,
        _ => {
            return Err(AppendError::Skipped(PipecacheError::UnsafeArchivePath(
                path.to_path_buf(),
            )))
        }
    };

    if file_type.is_dir() {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_mtime(0);
        builder
            .append_data(&mut header, name, io::empty())
            .map_err(|e| {
                AppendError::Fatal(PipecacheError::archive(
                    format!("appending directory {}", name.display()),
                    e,
                ))
            })?;
        summary.directories += 1;
        return Ok(());
    }

    if !file_type.is_file() {
        return Err(AppendError::Skipped(PipecacheError::UnsupportedEntry {
            path: path.to_path_buf(),
            kind: format!("{:?}", file_type),
        }));
    }

    let mut file = File::open(path).map_err(|e| {
        AppendError::Skipped(PipecacheError::io(format!("opening {}", path.display()), e))
    })?;
    let metadata = file.metadata().map_err(|e| {
        AppendError::Skipped(PipecacheError::io(
            format!("reading metadata of {}", path.display()),
            e,
        ))
    })?;

    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&metadata, HeaderMode::Deterministic);

    // From here on the header may already be in the stream
    let contents = SizedReader::new(&mut file, metadata.len());
    builder.append_data(&mut header, name, contents).map_err(|e| {
        AppendError::Fatal(PipecacheError::archive(
            format!("appending file {}", name.display()),
            e,
        ))
    })?;

    summary.files += 1;
    summary.bytes += metadata.len();
    Ok(())
}
