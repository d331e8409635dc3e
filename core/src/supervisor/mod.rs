//! Process supervisor for the demo server
//!
//! This module spawns the server in its own process group, listens on both of
//! its output streams and turns the first output into a [`ConnectionDescriptor`]
//! (or a startup failure) via the [`Handshake`] state machine.
//!
//! ## Flow
//!
//! ```text
//! spawn_server() ──► PendingServer ──ready()──► (ConnectionDescriptor, RunningServer)
//!      │                  │                                  │
//!      │                  │ select! over                     │ wait(): Ok on exit 0,
//!      │                  │  - output chunks                 │ AbnormalExit otherwise
//!      │                  │  - child exit (+ drain window)   │
//!      │                  │  - handshake timeout             │ stdout ─► info!
//!      │                  ▼                                  │ stderr ─► warn!
//!      │             Err(..) + SIGKILL group                 ▼
//!      └─ reader task per stream, exit monitor task
//! ```
//!
//! The group id is available right after spawning ([`PendingServer::group`])
//! so a lifecycle guard can adopt it before the handshake completes.

pub mod handshake;

pub use handshake::{decode_certificate_hash, Handshake, HandshakeStep, ReadinessState};

use crate::process::unix::{self, ProcessGroup};
use crate::{CoreError, Result};
use schema::{ConnectionDescriptor, ExitOutcome, HarnessConfig, LogStream};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Read buffer size for the output streams
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// A chunk of raw output as returned by a single read
#[derive(Debug)]
struct OutputChunk {
    stream: LogStream,
    bytes: Vec<u8>,
}

type ExitReceiver = oneshot::Receiver<Result<ExitOutcome>>;

/// A spawned server whose readiness handshake has not been decided yet
#[derive(Debug)]
pub struct PendingServer {
    pid: u32,
    group: ProcessGroup,
    handshake: Handshake,
    output_rx: mpsc::UnboundedReceiver<OutputChunk>,
    exit_rx: ExitReceiver,
    handshake_timeout: Option<Duration>,
    exit_drain: Duration,
}

/// Spawn the configured server and start listening on its output
///
/// Must be called from within a tokio runtime.
pub fn spawn_server(config: &HarnessConfig) -> Result<PendingServer> {
    info!("SERVER start: {} {}", config.command, config.args.join(" "));

    let args: Vec<&str> = config.args.iter().map(String::as_str).collect();
    let working_dir = config.working_directory.as_deref().map(Path::new);
    let mut child = unix::spawn(&config.command, &args, working_dir)?;

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.take_stdout() {
        spawn_reader(stdout, LogStream::Stdout, output_tx.clone());
    }
    if let Some(stderr) = child.take_stderr() {
        spawn_reader(stderr, LogStream::Stderr, output_tx);
    }

    let pid = child.pid();
    let group = child.group();

    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = child.wait().await;
        debug!("Exit monitor for process {} finished: {:?}", pid, outcome);
        let _ = exit_tx.send(outcome);
    });

    Ok(PendingServer {
        pid,
        group,
        handshake: Handshake::new(config.address.clone()),
        output_rx,
        exit_rx,
        handshake_timeout: config.handshake_timeout(),
        exit_drain: config.exit_drain(),
    })
}

/// Spawn the server and wait for its readiness handshake
pub async fn start_server(config: &HarnessConfig) -> Result<(ConnectionDescriptor, RunningServer)> {
    spawn_server(config)?.ready().await
}

impl PendingServer {
    /// Process ID of the server
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Process group of the server
    pub fn group(&self) -> ProcessGroup {
        self.group
    }

    /// Wait until the handshake is decided
    ///
    /// On failure the server's process group is killed before the error is
    /// returned.
    pub async fn ready(mut self) -> Result<(ConnectionDescriptor, RunningServer)> {
        let handshake_deadline = self.handshake_timeout.map(|t| Instant::now() + t);
        // Exit seen while pending, and when to stop waiting for late output
        let mut exited: Option<(Result<ExitOutcome>, Instant)> = None;
        let mut streams_open = true;

        let decided = loop {
            let drain_deadline = exited.as_ref().map(|(_, deadline)| *deadline);

            tokio::select! {
                biased;

                chunk = self.output_rx.recv(), if streams_open => match chunk {
                    Some(chunk) => match self.handshake.on_chunk(chunk.stream, &chunk.bytes) {
                        HandshakeStep::Ready(descriptor) => break Ok(descriptor),
                        HandshakeStep::Failed(err) => break Err(err),
                        step => log_step(step),
                    },
                    None => {
                        debug!("Both output streams of process {} closed", self.pid);
                        streams_open = false;
                        if let Some((outcome, _)) = exited.take() {
                            break Err(exit_before_ready(outcome));
                        }
                    }
                },

                outcome = &mut self.exit_rx, if exited.is_none() => {
                    let outcome = flatten_exit(outcome);
                    if !streams_open {
                        break Err(exit_before_ready(outcome));
                    }
                    debug!(
                        "Process {} exited during handshake, draining output for {:?}",
                        self.pid, self.exit_drain
                    );
                    exited = Some((outcome, Instant::now() + self.exit_drain));
                }

                _ = sleep_until_opt(drain_deadline) => {
                    if let Some((outcome, _)) = exited.take() {
                        break Err(exit_before_ready(outcome));
                    }
                }

                _ = sleep_until_opt(handshake_deadline) => {
                    break Err(CoreError::HandshakeTimeout(
                        self.handshake_timeout.unwrap_or_default(),
                    ));
                }
            }
        };

        match decided {
            Ok(descriptor) => {
                info!("SERVER ready (pid {})", self.pid);
                if let Some(rest) = self.handshake.take_leftover() {
                    log_step(HandshakeStep::Output(rest));
                }

                let exit_rx = match exited {
                    Some((outcome, _)) => {
                        let (tx, rx) = oneshot::channel();
                        let _ = tx.send(outcome);
                        rx
                    }
                    None => self.exit_rx,
                };
                let forwarder = tokio::spawn(forward_output(self.handshake, self.output_rx));

                Ok((
                    descriptor,
                    RunningServer {
                        pid: self.pid,
                        group: self.group,
                        exit_rx: Some(exit_rx),
                        outcome: None,
                        forwarder: Some(forwarder),
                        exit_drain: self.exit_drain,
                    },
                ))
            }
            Err(err) => {
                self.handshake.abandon();
                error!("SERVER failed to start: {}", err);
                if let Err(e) = unix::signal_kill_group(self.group) {
                    warn!("Failed to kill process group {}: {}", self.group, e);
                }
                Err(err)
            }
        }
    }
}

/// A server that has completed its handshake
#[derive(Debug)]
pub struct RunningServer {
    pid: u32,
    group: ProcessGroup,
    exit_rx: Option<ExitReceiver>,
    outcome: Option<ExitOutcome>,
    forwarder: Option<JoinHandle<()>>,
    exit_drain: Duration,
}

impl RunningServer {
    /// Process ID of the server
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Process group of the server
    pub fn group(&self) -> ProcessGroup {
        self.group
    }

    /// Wait for the server to exit
    ///
    /// A graceful exit (code 0) is `Ok`; any other code or a signal death is
    /// [`CoreError::AbnormalExit`], even though the handshake succeeded.
    /// Output the server wrote before exiting is logged before this returns,
    /// waiting at most the exit drain window for the streams to close.
    /// Cancel-safe: dropping the future keeps the exit status for a later call.
    pub async fn wait(&mut self) -> Result<ExitOutcome> {
        let outcome = match self.outcome {
            Some(outcome) => outcome,
            None => {
                let rx = self.exit_rx.as_mut().ok_or_else(|| {
                    CoreError::ProcessWait(format!("exit status of process {} unavailable", self.pid))
                })?;
                let received = flatten_exit(rx.await);
                self.exit_rx = None;
                let outcome = received?;
                self.outcome = Some(outcome);
                outcome
            }
        };

        if let Some(forwarder) = self.forwarder.as_mut() {
            if tokio::time::timeout(self.exit_drain, forwarder).await.is_err() {
                debug!(
                    "Output of process {} still open after {:?}, not waiting for it",
                    self.pid, self.exit_drain
                );
            }
            self.forwarder = None;
        }

        if outcome.is_graceful() {
            info!("server exited with {}", outcome);
            Ok(outcome)
        } else {
            error!("server exited with {}", outcome);
            Err(CoreError::AbnormalExit { outcome })
        }
    }
}

fn spawn_reader<R>(mut reader: R, stream: LogStream, tx: mpsc::UnboundedSender<OutputChunk>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("{} reached EOF", stream);
                    break;
                }
                Ok(n) => {
                    let chunk = OutputChunk {
                        stream,
                        bytes: buf[..n].to_vec(),
                    };
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Error reading {} of server: {}", stream, e);
                    break;
                }
            }
        }
    });
}

async fn forward_output(
    mut handshake: Handshake,
    mut output_rx: mpsc::UnboundedReceiver<OutputChunk>,
) {
    while let Some(chunk) = output_rx.recv().await {
        log_step(handshake.on_chunk(chunk.stream, &chunk.bytes));
    }
}

fn log_step(step: HandshakeStep) {
    match step {
        HandshakeStep::Output(text) => info!(target: "server", "{}", text.trim_end()),
        HandshakeStep::Diagnostic(text) => warn!(target: "server", "{}", text.trim_end()),
        HandshakeStep::Ready(_) | HandshakeStep::Failed(_) => {}
    }
}

fn flatten_exit(
    received: std::result::Result<Result<ExitOutcome>, oneshot::error::RecvError>,
) -> Result<ExitOutcome> {
    received.unwrap_or_else(|_| {
        Err(CoreError::ProcessWait(
            "exit monitor stopped without reporting".to_string(),
        ))
    })
}

fn exit_before_ready(outcome: Result<ExitOutcome>) -> CoreError {
    match outcome {
        Ok(outcome) if outcome.is_graceful() => CoreError::ExitedBeforeReady { outcome },
        Ok(outcome) => CoreError::AbnormalExit { outcome },
        Err(e) => e,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
