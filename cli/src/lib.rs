//! wt-harness command-line front end
//!
//! Resolves a [`HarnessConfig`] from flags and an optional TOML file, runs the
//! demo server under a [`LifecycleGuard`], and prints the connection details
//! once the server is ready.

pub mod error;

pub use error::{CliError, Result};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use harness_core::config::{load_config_from_toml_path, validate_config};
use harness_core::{spawn_server, ConnectionDescriptor, HarnessConfig, LifecycleGuard};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "wt-harness")]
#[command(about = "Run the WebTransport demo server and print how to connect to it")]
#[command(version)]
pub struct Cli {
    /// TOML config file; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Endpoint address handed to the client
    #[arg(long, value_name = "URI")]
    pub address: Option<String>,

    /// Give up if the server has not announced itself after this many seconds
    #[arg(long, value_name = "SECS")]
    pub handshake_timeout: Option<u64>,

    /// Print the connection descriptor as JSON instead of a client snippet
    #[arg(long)]
    pub json: bool,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Server command and its arguments (default: go run server.go)
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// How the descriptor is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Browser snippet for a copy-paste client
    Snippet,
    /// One line of JSON
    Json,
}

impl Cli {
    /// Output format selected by the flags
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Snippet
        }
    }
}

/// Build the effective configuration: file (or defaults), then flags
pub fn resolve_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from_toml_path(path)?,
        None => HarnessConfig::default(),
    };

    if let Some((command, args)) = cli.command.split_first() {
        if command.trim().is_empty() {
            return Err(CliError::InvalidArgument(
                "COMMAND cannot be empty".to_string(),
            ));
        }
        config.command = command.clone();
        config.args = args.to_vec();
    }
    if let Some(address) = &cli.address {
        config.address = address.clone();
    }
    if let Some(secs) = cli.handshake_timeout {
        config.handshake_timeout_secs = Some(secs);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    validate_config(&config)?;
    debug!("Resolved configuration: {:?}", config);
    Ok(config)
}

/// Spawn the server under `guard`, print its connection details once ready,
/// and wait for it to exit
pub async fn supervise(
    guard: &LifecycleGuard,
    config: &HarnessConfig,
    format: OutputFormat,
) -> harness_core::Result<()> {
    let pending = spawn_server(config)?;
    guard.adopt(pending.group())?;

    let (descriptor, mut server) = pending.ready().await?;

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string(&descriptor)?,
        OutputFormat::Snippet => render_client_snippet(&descriptor),
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", rendered)?;
    stdout.flush()?;
    drop(stdout);

    server.wait().await?;
    Ok(())
}

/// Browser console snippet that opens a session to the server with its
/// certificate hash pinned
pub fn render_client_snippet(descriptor: &ConnectionDescriptor) -> String {
    let hashes: Vec<String> = descriptor
        .server_certificate_hashes
        .iter()
        .map(|hash| {
            format!(
                "{{\n      algorithm: '{}',\n      value: Uint8Array.from(atob('{}'), (m) => m.codePointAt(0))\n    }}",
                hash.algorithm,
                STANDARD.encode(&hash.value)
            )
        })
        .collect();

    format!(
        "\nPaste the following code into https://codepen.io/pen/?editors=0012 or similar:\n\n\
         (async function main () {{\n  \
         console.info('CLIENT create session')\n  \
         const transport = new WebTransport('{}', {{\n    \
         serverCertificateHashes: [{}]\n  \
         }})\n{}",
        descriptor.address,
        hashes.join(", "),
        SNIPPET_SESSION
    )
}

const SNIPPET_SESSION: &str = r#"
  console.info('CLIENT wait for session')
  await transport.ready
  console.info('CLIENT session ready')

  console.info('CLIENT create bidi stream')
  const stream = await transport.createBidirectionalStream()
  const reader = stream.readable.getReader()

  let bytes = 0

  try {
    while (true) {
      const res = await reader.read()

      if (res.done) {
        console.info('CLIENT read stream finished')
        break
      }

      bytes += res.value.byteLength
    }

    console.info('CLIENT received', bytes, 'bytes')
  } catch (err) {
    console.info('CLIENT read errored', err)
  }
})()
"#;
