//! wt-harness binary
//!
//! Starts the WebTransport demo server, prints how to connect to it, and
//! keeps running until the server exits or the operator interrupts.

use clap::Parser;
use cli::{resolve_config, supervise, Cli};
use harness_core::utils::init_tracing;
use harness_core::LifecycleGuard;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Error [{}]: {}", e.code(), e);
        return ExitCode::FAILURE;
    }

    let guard = match LifecycleGuard::install() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            return ExitCode::FAILURE;
        }
    };

    let format = cli.output_format();
    guard
        .run_until(supervise(&guard, &config, format))
        .await
        .exit_code()
}
