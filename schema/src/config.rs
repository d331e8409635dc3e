//! Harness configuration
//!
//! Every field has a serde default so a configuration file only needs to list
//! what it overrides. An empty file yields the stock demo setup: `go run
//! server.go` announcing itself on the well-known say-hello endpoint.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Address handed to the client when nothing else is configured
pub const DEFAULT_ADDRESS: &str = "https://127.0.0.1:12345/say-hello";

/// Configuration for a single supervised run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HarnessConfig {
    /// Server command to execute
    #[serde(default = "default_command")]
    pub command: String,

    /// Command-line arguments
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory for the server process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// Endpoint address placed in the connection descriptor
    #[serde(default = "default_address")]
    pub address: String,

    /// Give up on the handshake after this many seconds (None waits forever)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_timeout_secs: Option<u64>,

    /// How long to keep reading output after the server exited mid-handshake
    #[serde(default = "default_exit_drain_ms")]
    pub exit_drain_ms: u64,

    /// Log level for the harness itself
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl HarnessConfig {
    /// Handshake timeout as a Duration
    #[must_use]
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }

    /// Exit drain window as a Duration
    #[must_use]
    pub fn exit_drain(&self) -> Duration {
        Duration::from_millis(self.exit_drain_ms)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            working_directory: None,
            address: default_address(),
            handshake_timeout_secs: None,
            exit_drain_ms: default_exit_drain_ms(),
            log_level: default_log_level(),
        }
    }
}

fn default_command() -> String {
    "go".to_string()
}

fn default_args() -> Vec<String> {
    vec!["run".to_string(), "server.go".to_string()]
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_exit_drain_ms() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_string()
}
