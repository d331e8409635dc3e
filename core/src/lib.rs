//! Core functionality for the WebTransport demo harness
//!
//! This crate launches the demo server in its own process group, waits for
//! the certificate-hash handshake on its stdout, and guarantees the whole
//! group is killed on every exit path of the harness.

pub mod config;
pub mod error;
#[cfg(unix)]
pub mod guard;
pub mod os_signals;
#[cfg(unix)]
pub mod process;
#[cfg(unix)]
pub mod supervisor;

#[cfg(test)]
mod error_tests;

// Re-export schema types for convenience
pub use schema::*;

pub use error::{CoreError, Result};
#[cfg(unix)]
pub use guard::{LifecycleGuard, ShutdownReason};
#[cfg(unix)]
pub use supervisor::{spawn_server, start_server, PendingServer, RunningServer};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` wins over `level`. Logs go to stderr so stdout stays free for
    /// the connection descriptor.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
