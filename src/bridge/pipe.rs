//! Using a child's pipes without outliving the child
//!
//! A command can exit while something it started in the background still
//! holds its stdin, stdout or stderr open. A plain read or write would then
//! block until that grandchild goes away. [`ChildPipe`] watches an exit
//! token: once the command has exited, each read or write gets
//! `drain_grace` to make progress before the pipe is abandoned.

use crate::error::{PipecacheError, PipecacheResult};
use std::borrow::Cow;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const CHUNK_SIZE: usize = 16 * 1024;

/// One of a child's output pipes, tied to the child's exit
pub(crate) struct ChildPipe<R> {
    inner: R,
    exited: CancellationToken,
    grace: Duration,
}

impl<P> ChildPipe<P> {
    pub(crate) fn new(inner: P, exited: CancellationToken, grace: Duration) -> Self {
        Self {
            inner,
            exited,
            grace,
        }
    }
}

impl<R: AsyncRead + Unpin> ChildPipe<R> {
    /// Read the next chunk; `Ok(0)` is end-of-stream.
    ///
    /// Cancel safe: dropping the future loses no data.
    pub(crate) async fn read_chunk(&mut self, buf: &mut [u8]) -> PipecacheResult<usize> {
        if !self.exited.is_cancelled() {
            tokio::select! {
                biased;
                read = self.inner.read(buf) => {
                    return read.map_err(|e| PipecacheError::io("reading command output", e));
                }
                _ = self.exited.cancelled() => {}
            }
        }

        match tokio::time::timeout(self.grace, self.inner.read(buf)).await {
            Ok(read) => read.map_err(|e| PipecacheError::io("reading command output", e)),
            Err(_) => Err(PipecacheError::OrphanedPipe),
        }
    }
}

impl<W: AsyncWrite + Unpin> ChildPipe<W> {
    /// Write part of `buf`, returning how many bytes went through.
    ///
    /// Cancel safe, like `read_chunk`.
    pub(crate) async fn write_chunk(&mut self, buf: &[u8]) -> PipecacheResult<usize> {
        if !self.exited.is_cancelled() {
            tokio::select! {
                biased;
                written = self.inner.write(buf) => {
                    return written.map_err(|e| PipecacheError::io("writing command input", e));
                }
                _ = self.exited.cancelled() => {}
            }
        }

        match tokio::time::timeout(self.grace, self.inner.write(buf)).await {
            Ok(written) => written.map_err(|e| PipecacheError::io("writing command input", e)),
            Err(_) => Err(PipecacheError::OrphanedPipe),
        }
    }
}

/// Copy `source` into a child's stdin until end-of-stream.
///
/// Both `source` and the child's stdin are dropped on return, so a producer
/// writing into the other end of `source` sees a broken pipe if the copy
/// stopped early.
pub(crate) async fn feed<R, W>(mut source: R, mut sink: ChildPipe<W>) -> PipecacheResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = source
            .read(&mut buf)
            .await
            .map_err(|e| PipecacheError::io("reading archive stream", e))?;
        if n == 0 {
            break;
        }

        let mut written = 0;
        while written < n {
            let m = sink.write_chunk(&buf[written..n]).await?;
            if m == 0 {
                return Err(PipecacheError::io(
                    "writing command input",
                    std::io::Error::from(std::io::ErrorKind::WriteZero),
                ));
            }
            written += m;
        }
        total += n as u64;
    }

    Ok(total)
}

/// Copy a child's stdout into `sink` until end-of-stream.
///
/// `sink` is dropped on return, which is what lets the consumer on the other
/// side of the channel see end-of-stream, whichever way the copy ended.
pub(crate) async fn pump<R, W>(mut source: ChildPipe<R>, mut sink: W) -> PipecacheResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = source.read_chunk(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])
            .await
            .map_err(|e| PipecacheError::io("forwarding command output to archive reader", e))?;
        total += n as u64;
    }

    if let Err(e) = sink.shutdown().await {
        debug!("Failed to close archive channel: {}", e);
    }
    Ok(total)
}

/// Output captured from a command for diagnostics, capped in size
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    bytes: Vec<u8>,
    truncated: bool,
}

impl CapturedOutput {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether output beyond the cap was dropped
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Captured bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Captured output as text, lossily decoded
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Capture a single pipe until end-of-stream.
pub(crate) async fn capture<R>(mut source: ChildPipe<R>, limit: usize) -> CapturedOutput
where
    R: AsyncRead + Unpin,
{
    let mut output = CapturedOutput::default();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        match source.read_chunk(&mut buf).await {
            Ok(0) => break,
            Ok(n) => output.push(&buf[..n], limit),
            Err(e) => {
                debug!("Stopped capturing command output: {}", e);
                break;
            }
        }
    }

    output
}

/// Capture stdout and stderr together, in the order chunks arrive.
pub(crate) async fn capture_combined<A, B>(
    mut stdout: ChildPipe<A>,
    mut stderr: ChildPipe<B>,
    limit: usize,
) -> CapturedOutput
where
    A: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    let mut output = CapturedOutput::default();
    let mut out_buf = vec![0u8; CHUNK_SIZE];
    let mut err_buf = vec![0u8; CHUNK_SIZE];
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            read = stdout.read_chunk(&mut out_buf), if !stdout_done => {
                match read {
                    Ok(n) if n > 0 => output.push(&out_buf[..n], limit),
                    Ok(_) => stdout_done = true,
                    Err(e) => {
                        debug!("Stopped capturing command stdout: {}", e);
                        stdout_done = true;
                    }
                }
            }
            read = stderr.read_chunk(&mut err_buf), if !stderr_done => {
                match read {
                    Ok(n) if n > 0 => output.push(&err_buf[..n], limit),
                    Ok(_) => stderr_done = true,
                    Err(e) => {
                        debug!("Stopped capturing command stderr: {}", e);
                        stderr_done = true;
                    }
                }
            }
        }
    }

    output
}
