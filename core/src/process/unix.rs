//! Unix process management with safe spawn/kill using process groups
//!
//! This module spawns the supervised server in its own session (and therefore
//! its own process group) via `setsid()`, so that the server together with
//! everything it forks can later be killed with one signal.
//!
//! ## Process Groups
//!
//! When a process calls `setsid()`, it:
//! - Creates a new session and becomes the session leader
//! - Creates a new process group and becomes the process group leader
//! - Has no controlling terminal
//!
//! The group id equals the leader's pid, and it stays valid for signaling as
//! long as any member of the group is alive, even after the leader itself
//! has been reaped. `go run` is the typical case: the Go toolchain process
//! is the leader, the compiled server binary is its child.

// Allow unsafe code for this module since process management requires libc::setsid() calls
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use schema::ExitOutcome;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, error};

/// Identifier of a process group that can be signaled as a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGroup(Pid);

impl ProcessGroup {
    /// Wrap a raw process group id
    pub fn from_raw(pgid: i32) -> Self {
        Self(Pid::from_raw(pgid))
    }

    /// The numeric group id
    pub fn id(&self) -> u32 {
        self.0.as_raw() as u32
    }

    /// Whether any process in the group is still around (signal 0 probe)
    pub fn is_alive(&self) -> bool {
        killpg(self.0, None).is_ok()
    }
}

impl std::fmt::Display for ProcessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A child process managed with Unix process groups
///
/// The process is guaranteed to be the leader of its own process group.
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Get the process group ID (same as PID for session leaders)
    pub fn pgid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// The process group this child leads
    pub fn group(&self) -> ProcessGroup {
        ProcessGroup(self.pid)
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitOutcome> {
        let status = self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })?;
        Ok(exit_outcome(self.pid(), status))
    }

    /// Take the stdout handle for async reading, if available
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the stderr handle for async reading, if available
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }
}

fn exit_outcome(pid: u32, status: std::process::ExitStatus) -> ExitOutcome {
    ExitOutcome {
        pid,
        code: status.code(),
        // Only set when there is no exit code
        signal: status.signal(),
    }
}

/// Spawn a new process in its own process group
///
/// The child gets a null stdin and piped stdout/stderr, which the supervisor
/// reads for the readiness handshake.
///
/// ## Safety
///
/// `setsid()` runs in the child between `fork()` and `exec()`. It is
/// async-signal-safe, so it is allowed in `pre_exec`.
///
/// ## Example
///
/// ```rust,no_run
/// use harness_core::process::unix::spawn;
///
/// let child = spawn("echo", &["aGVsbG8="], None)?;
/// println!("Spawned process with PID: {}", child.pid());
/// # Ok::<(), harness_core::CoreError>(())
/// ```
pub fn spawn(cmd: &str, args: &[&str], working_dir: Option<&Path>) -> Result<ChildProcess> {
    debug!("Spawning process: {} {:?}", cmd, args);

    let mut command = Command::new(cmd);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    #[deny(unsafe_op_in_unsafe_fn)]
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", cmd, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", cmd, e))
    })?;

    let raw_pid = child
        .id()
        .ok_or_else(|| CoreError::ProcessSpawn("Spawned child did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Successfully spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

/// Send SIGKILL to every process in the group
///
/// `ESRCH` (group already gone) and `EPERM` (group emptied and the id is in
/// limbo) both count as success: there is nothing left to kill.
///
/// ## Example
///
/// ```rust,no_run
/// use harness_core::process::unix::{spawn, signal_kill_group};
///
/// let child = spawn("sleep", &["30"], None)?;
/// signal_kill_group(child.group())?;
/// # Ok::<(), harness_core::CoreError>(())
/// ```
pub fn signal_kill_group(group: ProcessGroup) -> Result<()> {
    signal_group(group, Signal::SIGKILL)
}

fn signal_group(group: ProcessGroup, signal: Signal) -> Result<()> {
    debug!("Sending {} to process group {}", signal, group);

    match killpg(group.0, signal) {
        Ok(()) => {
            debug!("Successfully sent {} to process group {}", signal, group);
            Ok(())
        }
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process group {} already exited", group);
            Ok(())
        }
        Err(nix::errno::Errno::EPERM) => {
            debug!(
                "Permission denied signaling process group {} (likely already exited)",
                group
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process group {}: {}", signal, group, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send {} to process group {}: {}",
                signal, group, e
            )))
        }
    }
}
