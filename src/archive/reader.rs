//! Archive reader
//!
//! Consumes a tar stream entry by entry and materializes it under a
//! destination root. Any malformed, truncated or unsafe entry fails the whole
//! read; a stream is only accepted after a clean end-of-archive.

use super::ArchiveSummary;
use crate::error::{PipecacheError, PipecacheResult};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use tracing::debug;

const BLOCK_SIZE: u64 = 512;

/// Reader adapter that remembers how many bytes went through it
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Extract the tar stream read from `source` under `dest`.
///
/// Only directories and regular files are accepted. Paths must be relative
/// and free of `..`. A stream of zero bytes is rejected: every archive the
/// writer produces carries an end-of-archive trailer, so silence means the
/// producer never got going. A stream that stops at an entry boundary
/// without that trailer is rejected too.
pub fn read_artifacts<R: Read>(source: R, dest: &Path) -> PipecacheResult<ArchiveSummary> {
    let mut source = CountingReader {
        inner: source,
        count: 0,
    };
    let mut summary = ArchiveSummary::default();
    // Offset just past the last entry's padded payload
    let mut entries_end = 0u64;

    {
        let mut archive = tar::Archive::new(&mut source);
        let entries = archive
            .entries()
            .map_err(|e| PipecacheError::archive("reading archive", e))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| PipecacheError::archive("reading archive entry", e))?;
            let path = entry
                .path()
                .map_err(|e| PipecacheError::archive("decoding entry path", e))?
                .into_owned();
            let relative = validate_relative_path(&path)?;
            let target = dest.join(&relative);
            entries_end = entry.raw_file_position() + padded_size(entry.size());

            match entry.header().entry_type() {
                EntryType::Directory => {
                    fs::create_dir_all(&target).map_err(|e| {
                        PipecacheError::io(format!("creating {}", target.display()), e)
                    })?;
                    summary.directories += 1;
                }
                EntryType::Regular | EntryType::Continuous => {
                    let expected = entry.size();
                    let mode = entry.header().mode().ok();
                    let found = extract_file(&mut entry, &target, mode)?;
                    if found != expected {
                        return Err(PipecacheError::TruncatedEntry {
                            path,
                            expected,
                            found,
                        });
                    }
                    summary.files += 1;
                    summary.bytes += found;
                }
                other => {
                    return Err(PipecacheError::UnsupportedEntry {
                        path,
                        kind: format!("{:?}", other),
                    })
                }
            }
        }
    }

    if source.count == 0 {
        return Err(PipecacheError::EmptyStream);
    }
    // `entries()` also ends on EOF at a header boundary; only a zero block
    // after the last entry marks a complete archive
    if source.count < entries_end + BLOCK_SIZE {
        return Err(PipecacheError::archive(
            "reading end-of-archive marker",
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended without an end-of-archive marker",
            ),
        ));
    }

    // Drain trailer padding so the producer never blocks on a full pipe
    io::copy(&mut source, &mut io::sink())
        .map_err(|e| PipecacheError::archive("draining archive trailer", e))?;

    debug!("Extracted {} into {}", summary, dest.display());
    Ok(summary)
}

fn padded_size(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

fn extract_file<R: Read>(entry: &mut R, target: &Path, mode: Option<u32>) -> PipecacheResult<u64> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| PipecacheError::io(format!("creating {}", parent.display()), e))?;
    }
    // Replace rather than rewrite in place; a previous copy may be read-only
    if target.is_file() {
        let _ = fs::remove_file(target);
    }

    let mut out = File::create(target)
        .map_err(|e| PipecacheError::io(format!("creating {}", target.display()), e))?;
    let written = io::copy(entry, &mut out)
        .map_err(|e| PipecacheError::archive(format!("extracting {}", target.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = mode {
            fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o777)).map_err(
                |e| PipecacheError::io(format!("setting permissions on {}", target.display()), e),
            )?;
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(written)
}

/// Reject absolute paths and `..`; strip `.` components
fn validate_relative_path(path: &Path) -> PipecacheResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PipecacheError::UnsafeArchivePath(path.to_path_buf()))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(PipecacheError::UnsafeArchivePath(path.to_path_buf()));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_artifacts;
    use tempfile::TempDir;

    fn sample_archive() -> (TempDir, Vec<u8>) {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out/pkg");
        fs::create_dir_all(out.join("dir")).unwrap();
        fs::write(out.join("big.bin"), vec![7u8; 5000]).unwrap();
        fs::write(out.join("dir/small.txt"), b"hello").unwrap();

        let mut buf = Vec::new();
        write_artifacts(
            &mut buf,
            temp.path(),
            Path::new("out/pkg"),
            &["big.bin".to_string(), "dir".to_string()],
        )
        .unwrap();
        (temp, buf)
    }

    #[test]
    fn extracts_written_archive() {
        let (_src, buf) = sample_archive();
        let dest = TempDir::new().unwrap();

        let summary = read_artifacts(buf.as_slice(), dest.path()).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 1);
        assert_eq!(
            fs::read(dest.path().join("out/pkg/big.bin")).unwrap(),
            vec![7u8; 5000]
        );
        assert_eq!(
            fs::read(dest.path().join("out/pkg/dir/small.txt")).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn empty_stream_is_an_error() {
        let dest = TempDir::new().unwrap();
        let err = read_artifacts(io::empty(), dest.path()).unwrap_err();
        assert!(matches!(err, PipecacheError::EmptyStream));
    }

    #[test]
    fn empty_archive_is_accepted() {
        let dest = TempDir::new().unwrap();
        let summary = read_artifacts(&[0u8; 1024][..], dest.path()).unwrap();
        assert_eq!(summary, ArchiveSummary::default());
    }

    #[test]
    fn truncated_mid_entry_is_an_error() {
        let (_src, buf) = sample_archive();
        let dest = TempDir::new().unwrap();

        // header (512) plus part of the 5000-byte payload
        let truncated = &buf[..2000];
        let err = read_artifacts(truncated, dest.path()).unwrap_err();
        assert!(
            matches!(err, PipecacheError::TruncatedEntry { expected: 5000, .. })
                || matches!(err, PipecacheError::Archive { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn truncated_mid_header_is_an_error() {
        let (_src, buf) = sample_archive();
        let dest = TempDir::new().unwrap();

        let err = read_artifacts(&buf[..100], dest.path()).unwrap_err();
        assert!(err.is_stream_corruption(), "unexpected error: {err:?}");
    }

    #[test]
    fn stream_cut_at_entry_boundary_is_an_error() {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in [("a.txt", &b"alpha"[..]), ("b.txt", &b"bravo"[..])] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, data).unwrap();
        }
        let buf = builder.into_inner().unwrap();
        let dest = TempDir::new().unwrap();

        // a.txt's header and padded payload, nothing after it
        let err = read_artifacts(&buf[..1024], dest.path()).unwrap_err();
        assert!(err.is_stream_corruption(), "unexpected error: {err:?}");

        // both entries, but no end-of-archive marker
        let err = read_artifacts(&buf[..2048], dest.path()).unwrap_err();
        assert!(err.is_stream_corruption(), "unexpected error: {err:?}");

        let summary = read_artifacts(buf.as_slice(), dest.path()).unwrap();
        assert_eq!(summary.files, 2);
    }

    #[test]
    fn single_zero_block_ends_archive() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        builder.append_data(&mut header, "a.txt", &b"alpha"[..]).unwrap();
        let buf = builder.into_inner().unwrap();
        let dest = TempDir::new().unwrap();

        let summary = read_artifacts(&buf[..1536], dest.path()).unwrap();
        assert_eq!(summary.files, 1);
    }

    #[test]
    fn parent_dir_entries_are_rejected() {
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..7].copy_from_slice(b"../evil");
        header.set_entry_type(EntryType::Regular);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder.append(&header, &b"evil"[..]).unwrap();
        let buf = builder.into_inner().unwrap();

        let dest = TempDir::new().unwrap();
        let err = read_artifacts(buf.as_slice(), dest.path()).unwrap_err();
        assert!(matches!(err, PipecacheError::UnsafeArchivePath(_)));
        assert!(!dest.path().parent().unwrap().join("evil").exists());
    }

    #[test]
    fn symlink_entries_are_unsupported() {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);

        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_link(&mut header, "out/link", "/etc/passwd")
            .unwrap();
        let buf = builder.into_inner().unwrap();

        let dest = TempDir::new().unwrap();
        let err = read_artifacts(buf.as_slice(), dest.path()).unwrap_err();
        assert!(matches!(err, PipecacheError::UnsupportedEntry { .. }));
    }

    #[test]
    fn validate_strips_current_dir() {
        assert_eq!(
            validate_relative_path(Path::new("./out/a")).unwrap(),
            PathBuf::from("out/a")
        );
        assert!(validate_relative_path(Path::new("/etc/passwd")).is_err());
        assert!(validate_relative_path(Path::new(".")).is_err());
    }
}
