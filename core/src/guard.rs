//! Lifecycle guard: the server's process group never outlives the harness
//!
//! The guard is created once at startup and adopts the server's process group
//! as soon as it has been spawned. Every way the harness can end goes through
//! [`LifecycleGuard::shutdown`], which kills the whole group with SIGKILL
//! before anything else happens:
//!
//! | Path                         | Trigger                          | Status  |
//! |------------------------------|----------------------------------|---------|
//! | [`ShutdownReason::Interrupted`] | SIGINT / SIGTERM               | success |
//! | [`ShutdownReason::Completed`]   | supervised future returned Ok  | success |
//! | [`ShutdownReason::Fault`]       | supervised future returned Err | failure |
//! | panic hook                      | any panic in the harness       | exit 1  |
//! | `Drop`                          | guard dropped without shutdown | -       |

use crate::os_signals::wait_for_interrupt;
use crate::process::unix::{signal_kill_group, ProcessGroup};
use crate::{CoreError, Result};
use std::future::Future;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};

static PANIC_HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Why the harness is shutting down
#[derive(Debug)]
pub enum ShutdownReason {
    /// The operator asked the harness to stop
    Interrupted,
    /// The supervised work finished normally
    Completed,
    /// The supervised work failed
    Fault(CoreError),
}

impl ShutdownReason {
    /// Whether the harness should report success
    pub fn is_success(&self) -> bool {
        !matches!(self, ShutdownReason::Fault(_))
    }

    /// Process exit code for this reason
    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Default)]
struct GuardState {
    group: OnceLock<ProcessGroup>,
    terminated: AtomicBool,
}

impl GuardState {
    fn terminate_group(&self) -> Result<()> {
        let Some(group) = self.group.get() else {
            debug!("No process group adopted, nothing to terminate");
            return Ok(());
        };
        if self.terminated.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        signal_kill_group(*group)
    }
}

/// Owner of the "kill the server group before exiting" invariant
#[derive(Debug, Default)]
pub struct LifecycleGuard {
    state: Arc<GuardState>,
}

impl LifecycleGuard {
    /// Guard without a panic hook
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard with the process-wide panic hook installed
    ///
    /// Any panic kills the adopted group, is logged, and ends the process with
    /// status 1. Only one guard per process may be installed.
    pub fn install() -> Result<Self> {
        if PANIC_HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(CoreError::InitializationError(
                "lifecycle guard already installed".to_string(),
            ));
        }

        let guard = Self::new();
        let state = guard.state.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Err(e) = state.terminate_group() {
                eprintln!("failed to terminate server process group: {}", e);
            }
            error!("uncaught fault: {}", info);
            previous(info);
            std::process::exit(1);
        }));
        debug!("Lifecycle guard installed");
        Ok(guard)
    }

    /// Take responsibility for the server's process group
    ///
    /// A guard adopts exactly one group; adopting a different one fails.
    pub fn adopt(&self, group: ProcessGroup) -> Result<()> {
        match self.state.group.set(group) {
            Ok(()) => {
                debug!("Lifecycle guard adopted process group {}", group);
                Ok(())
            }
            Err(_) if self.state.group.get() == Some(&group) => Ok(()),
            Err(_) => Err(CoreError::InitializationError(format!(
                "lifecycle guard already owns a process group, cannot adopt {}",
                group
            ))),
        }
    }

    /// The adopted process group, if any
    pub fn group(&self) -> Option<ProcessGroup> {
        self.state.group.get().copied()
    }

    /// Kill the process group, then report how the harness should end
    pub fn shutdown(&self, reason: ShutdownReason) -> ShutdownReason {
        if let Err(e) = self.state.terminate_group() {
            warn!("Failed to terminate server process group: {}", e);
        }

        match &reason {
            ShutdownReason::Interrupted => info!("Interrupted, server stopped"),
            ShutdownReason::Completed => info!("Done, server stopped"),
            ShutdownReason::Fault(err) => error!("{}", err),
        }
        reason
    }

    /// Run `work` until it finishes or an interrupt arrives, then shut down
    pub async fn run_until<F>(&self, work: F) -> ShutdownReason
    where
        F: Future<Output = Result<()>>,
    {
        // Interrupt branch first so its handlers exist before `work` spawns anything
        let reason = tokio::select! {
            biased;

            interrupted = wait_for_interrupt() => match interrupted {
                Ok(()) => ShutdownReason::Interrupted,
                Err(e) => ShutdownReason::Fault(CoreError::IoError(e)),
            },
            finished = work => match finished {
                Ok(()) => ShutdownReason::Completed,
                Err(e) => ShutdownReason::Fault(e),
            },
        };
        self.shutdown(reason)
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        if let Err(e) = self.state.terminate_group() {
            warn!("Failed to terminate server process group on drop: {}", e);
        }
    }
}
