//! Bridge between in-process archive streams and an external command
//!
//! Every call spawns `<shell> -c <command>` with `CACHE_KEY` set and streams
//! a tar archive through the command's stdin (store) or stdout (retrieve).
//!
//! Retrieve runs three things at once: a pump copying the command's stdout
//! into a bounded in-process channel, the archive decoder reading that
//! channel on a blocking task, and the exit wait on the calling task. When
//! the command exits, the waiter cancels the exit token; pipes that then stay
//! idle are abandoned, which closes the channel and unblocks the decoder even
//! if the command never wrote a byte.
//!
//! Store mirrors this: the encoder writes into a bounded channel on a
//! blocking task, and an async feed copies the channel into the command's
//! stdin. A stdin left full after the command exited is abandoned the same
//! way, which breaks the channel under the encoder.

mod pipe;

pub use pipe::CapturedOutput;

use crate::cache::key::{CacheKey, CACHE_KEY_ENV};
use crate::config::CacheConfig;
use crate::error::{PipecacheError, PipecacheResult};
use pipe::ChildPipe;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::process::{Child, Command};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacity of the in-process channel between the stdout pump and the decoder
const CHANNEL_CAPACITY: usize = 64 * 1024;

/// Blocking writer handed to the store feed; dropping it ends the command's stdin
pub type StdinSink = SyncIoBridge<DuplexStream>;

/// Blocking reader handed to the retrieve drain
pub type StreamSource = SyncIoBridge<DuplexStream>;

/// Options controlling command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Shell used to run commands
    pub shell: String,
    /// Kill the command if it hasn't exited after this duration
    pub timeout: Option<Duration>,
    /// How long a pipe may stay idle after the command exited
    pub drain_grace: Duration,
    /// Maximum bytes of diagnostic output kept
    pub max_output_bytes: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for BridgeOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            timeout: config.timeout(),
            drain_grace: config.drain_grace(),
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// Outcome of one store invocation
#[derive(Debug)]
pub struct StoreReport<T> {
    /// Spawn, wait and exit status of the command
    pub exit: PipecacheResult<()>,
    /// Combined stdout and stderr of the command
    pub output: CapturedOutput,
    /// What the feed returned
    pub fed: PipecacheResult<T>,
}

impl<T> StoreReport<T> {
    fn not_started(err: PipecacheError) -> Self {
        Self {
            exit: Err(err),
            output: CapturedOutput::default(),
            fed: Err(not_started()),
        }
    }

    /// Whether the command ran to a successful exit and the feed completed
    pub fn succeeded(&self) -> bool {
        self.exit.is_ok() && self.fed.is_ok()
    }
}

/// Outcome of one retrieve invocation
#[derive(Debug)]
pub struct RetrieveReport<T> {
    /// Spawn, wait and exit status of the command
    pub exit: PipecacheResult<()>,
    /// Bytes forwarded from the command's stdout, or why forwarding stopped
    pub stream: PipecacheResult<u64>,
    /// What the drain returned
    pub decoded: PipecacheResult<T>,
    /// The command's stderr
    pub stderr: CapturedOutput,
}

impl<T> RetrieveReport<T> {
    fn not_started(err: PipecacheError) -> Self {
        Self {
            exit: Err(err),
            stream: Err(not_started()),
            decoded: Err(not_started()),
            stderr: CapturedOutput::default(),
        }
    }

    /// A hit needs a clean decode, a clean end-of-stream and a successful exit
    pub fn is_hit(&self) -> bool {
        self.exit.is_ok() && self.stream.is_ok() && self.decoded.is_ok()
    }

    /// Collapse the report into the first failure, or the decoded value
    pub fn into_result(self) -> PipecacheResult<T> {
        self.exit?;
        self.stream?;
        self.decoded
    }
}

fn not_started() -> PipecacheError {
    PipecacheError::Internal("command did not start".to_string())
}

/// Spawns cache commands and streams archives through them
#[derive(Debug)]
pub struct ProcessBridge {
    options: BridgeOptions,
    spawned: AtomicUsize,
}

impl ProcessBridge {
    /// Create a bridge with the given options
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            options,
            spawned: AtomicUsize::new(0),
        }
    }

    /// Options in effect
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Number of spawn attempts made so far
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    fn spawn(
        &self,
        command: &str,
        key: &CacheKey,
        stdin: Stdio,
        stdout: Stdio,
    ) -> PipecacheResult<Child> {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Executing: {} -c {:?} ({}={})",
            self.options.shell, command, CACHE_KEY_ENV, key
        );

        Command::new(&self.options.shell)
            .arg("-c")
            .arg(command)
            .env(CACHE_KEY_ENV, key.to_hex())
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipecacheError::command_failed(command, e))
    }

    /// Wait for the command, enforcing the timeout if one is set
    async fn wait(&self, child: &mut Child, command: &str) -> PipecacheResult<()> {
        let status = match self.options.timeout {
            None => child.wait().await,
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        debug!("Failed to kill timed out command: {}", e);
                    }
                    return Err(PipecacheError::Timeout {
                        command: command.to_string(),
                        limit,
                    });
                }
            },
        }
        .map_err(|e| PipecacheError::Wait {
            command: command.to_string(),
            source: e,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(PipecacheError::CommandExit {
                command: command.to_string(),
                status,
            })
        }
    }

    fn child_pipe<P>(&self, inner: P, exited: &CancellationToken) -> ChildPipe<P> {
        ChildPipe::new(inner, exited.clone(), self.options.drain_grace)
    }

    /// Run `command` with `feed` writing into its stdin.
    ///
    /// `feed` runs on a blocking task. Failures are logged and reported,
    /// never raised. If the command's stdin stops accepting data, `fed`
    /// reports why instead of whatever the feed made of its broken sink.
    pub async fn run_store<F, T>(
        &self,
        command: &str,
        key: &CacheKey,
        feed: F,
    ) -> StoreReport<T>
    where
        F: FnOnce(StdinSink) -> PipecacheResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut child = match self.spawn(command, key, Stdio::piped(), Stdio::piped()) {
            Ok(child) => child,
            Err(e) => {
                debug!("Unable to start store command: {}", e);
                return StoreReport::not_started(e);
            }
        };
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return StoreReport::not_started(PipecacheError::Internal(
                "store command pipes missing".to_string(),
            ));
        };

        let exited = CancellationToken::new();
        let (writer, reader) = tokio::io::duplex(CHANNEL_CAPACITY);

        let forward = tokio::spawn(pipe::feed(reader, self.child_pipe(stdin, &exited)));
        let sink = SyncIoBridge::new(writer);
        let feeder = tokio::task::spawn_blocking(move || feed(sink));

        let capture = pipe::capture_combined(
            self.child_pipe(stdout, &exited),
            self.child_pipe(stderr, &exited),
            self.options.max_output_bytes,
        );
        let waiting = async {
            let exit = self.wait(&mut child, command).await;
            exited.cancel();
            exit
        };
        let (output, exit) = tokio::join!(capture, waiting);

        let forwarded = forward.await.unwrap_or_else(|e| {
            Err(PipecacheError::Internal(format!("input feed failed: {}", e)))
        });
        let fed = feeder.await.unwrap_or_else(|e| {
            Err(PipecacheError::Internal(format!("archive writer failed: {}", e)))
        });
        let fed = match forwarded {
            Ok(bytes) => {
                debug!("Fed {} bytes to store command", bytes);
                fed
            }
            Err(e) => {
                if let Err(feed_err) = &fed {
                    debug!("Archive writer saw: {}", feed_err);
                }
                Err(e)
            }
        };

        match &exit {
            Ok(()) => debug!("Store command finished"),
            Err(e) => debug!("Failed to store files via command: {}", e),
        }
        if let Err(e) = &fed {
            debug!("Archive writer stopped early: {}", e);
        }
        if !output.is_empty() {
            info!("Store command output: {}", output.text());
        }

        StoreReport { exit, output, fed }
    }

    /// Run `command` with `drain` decoding its stdout.
    ///
    /// `drain` runs on a blocking task concurrently with the command. The
    /// report is a hit only when decoding, forwarding and the exit all
    /// succeeded.
    pub async fn run_retrieve<F, T>(
        &self,
        command: &str,
        key: &CacheKey,
        drain: F,
    ) -> RetrieveReport<T>
    where
        F: FnOnce(StreamSource) -> PipecacheResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut child = match self.spawn(command, key, Stdio::null(), Stdio::piped()) {
            Ok(child) => child,
            Err(e) => {
                debug!("Unable to start retrieve command: {}", e);
                return RetrieveReport::not_started(e);
            }
        };
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return RetrieveReport::not_started(PipecacheError::Internal(
                "retrieve command pipes missing".to_string(),
            ));
        };

        let exited = CancellationToken::new();
        let (writer, reader) = tokio::io::duplex(CHANNEL_CAPACITY);

        let pump = tokio::spawn(pipe::pump(self.child_pipe(stdout, &exited), writer));
        let stderr = tokio::spawn(pipe::capture(
            self.child_pipe(stderr, &exited),
            self.options.max_output_bytes,
        ));
        let source = SyncIoBridge::new(reader);
        let decoder = tokio::task::spawn_blocking(move || drain(source));

        let exit = self.wait(&mut child, command).await;
        // Unblocks the pump (and with it the decoder) if the pipe is left open
        exited.cancel();

        let stream = pump.await.unwrap_or_else(|e| {
            Err(PipecacheError::Internal(format!("output pump failed: {}", e)))
        });
        let decoded = decoder.await.unwrap_or_else(|e| {
            Err(PipecacheError::Internal(format!("archive reader failed: {}", e)))
        });
        let stderr = stderr.await.unwrap_or_default();

        if let Err(e) = &exit {
            debug!("Retrieve command failed: {}", e);
        }
        if let Err(e) = &stream {
            debug!("Retrieve command output interrupted: {}", e);
        }
        if let Err(e) = &decoded {
            debug!("Error in archive reader: {}", e);
        }
        if !stderr.is_empty() {
            debug!("Retrieve command stderr: {}", stderr.text());
        }

        RetrieveReport {
            exit,
            stream,
            decoded,
            stderr,
        }
    }
}

impl Default for ProcessBridge {
    fn default() -> Self {
        Self::new(BridgeOptions::default())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::time::Instant;

    fn bridge() -> ProcessBridge {
        ProcessBridge::new(BridgeOptions {
            drain_grace: Duration::from_millis(100),
            ..BridgeOptions::default()
        })
    }

    fn key() -> CacheKey {
        CacheKey::from_bytes(vec![0xca, 0xfe])
    }

    fn read_all(mut source: StreamSource) -> PipecacheResult<Vec<u8>> {
        let mut buf = Vec::new();
        source
            .read_to_end(&mut buf)
            .map_err(|e| PipecacheError::io("reading", e))?;
        Ok(buf)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retrieve_sees_key_in_environment() {
        let report = bridge()
            .run_retrieve("printf %s \"$CACHE_KEY\"", &key(), read_all)
            .await;

        assert!(report.is_hit());
        assert_eq!(report.into_result().unwrap(), b"cafe");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retrieve_nonzero_exit_is_not_a_hit() {
        let report = bridge()
            .run_retrieve("printf data; exit 3", &key(), read_all)
            .await;

        assert!(report.decoded.is_ok());
        assert!(matches!(report.exit, Err(PipecacheError::CommandExit { .. })));
        assert!(!report.is_hit());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retrieve_captures_stderr_separately() {
        let report = bridge()
            .run_retrieve("printf out; printf oops >&2", &key(), read_all)
            .await;

        assert_eq!(report.stderr.text(), "oops");
        assert_eq!(report.into_result().unwrap(), b"out");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retrieve_unblocks_when_background_job_holds_stdout() {
        let started = Instant::now();
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            bridge().run_retrieve("sleep 30 & exit 0", &key(), read_all),
        )
        .await
        .expect("retrieve must not hang");

        assert!(matches!(report.stream, Err(PipecacheError::OrphanedPipe)));
        assert!(!report.is_hit());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retrieve_timeout_kills_command() {
        let bridge = ProcessBridge::new(BridgeOptions {
            timeout: Some(Duration::from_millis(200)),
            drain_grace: Duration::from_millis(100),
            ..BridgeOptions::default()
        });

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            bridge.run_retrieve("sleep 30", &key(), read_all),
        )
        .await
        .expect("timeout must fire");

        assert!(matches!(report.exit, Err(PipecacheError::Timeout { .. })));
        assert!(!report.is_hit());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawn_failure_is_reported() {
        let bridge = ProcessBridge::new(BridgeOptions {
            shell: "/nonexistent/shell".to_string(),
            ..BridgeOptions::default()
        });

        let report = bridge.run_retrieve("true", &key(), read_all).await;

        assert!(matches!(report.exit, Err(PipecacheError::CommandFailed { .. })));
        assert!(!report.is_hit());
        assert_eq!(bridge.spawn_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_feeds_stdin_and_captures_output() {
        let report = bridge()
            .run_store("wc -c; echo done >&2", &key(), |mut sink| {
                sink.write_all(b"twelve bytes")
                    .map_err(|e| PipecacheError::io("feeding", e))?;
                Ok(12usize)
            })
            .await;

        assert!(report.succeeded());
        let output = report.output.text();
        assert!(output.contains("12"));
        assert!(output.contains("done"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_survives_command_that_ignores_stdin() {
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            bridge().run_store("exit 1", &key(), |mut sink| {
                // Enough to overflow the pipe buffer if nobody closed it
                let chunk = vec![0u8; 64 * 1024];
                for _ in 0..64 {
                    sink.write_all(&chunk)
                        .map_err(|e| PipecacheError::io("feeding", e))?;
                }
                Ok(())
            }),
        )
        .await
        .expect("store must not hang");

        assert!(matches!(report.exit, Err(PipecacheError::CommandExit { .. })));
        assert!(report.fed.is_err());
        assert!(!report.succeeded());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_unblocks_when_background_job_holds_stdin() {
        let started = Instant::now();
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            bridge().run_store(
                "exec 3<&0; sleep 30 <&3 >/dev/null 2>&1 & exit 0",
                &key(),
                |mut sink| {
                    let chunk = vec![0u8; 64 * 1024];
                    for _ in 0..64 {
                        sink.write_all(&chunk)
                            .map_err(|e| PipecacheError::io("feeding", e))?;
                    }
                    Ok(())
                },
            ),
        )
        .await
        .expect("store must not hang");

        assert!(report.exit.is_ok());
        assert!(matches!(report.fed, Err(PipecacheError::OrphanedPipe)));
        assert!(!report.succeeded());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
