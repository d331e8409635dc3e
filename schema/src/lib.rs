//! Schema definitions for wt-harness
//!
//! This crate contains the data structures shared between the supervisor
//! library and the CLI: the connection descriptor handed to the session
//! consumer, process exit information, and the harness configuration.
//! All types here implement JSON Schema generation for external consumption.

pub mod config;
pub mod connection;
pub mod process;


pub use config::{HarnessConfig, DEFAULT_ADDRESS};
pub use connection::{CertificateHash, ConnectionDescriptor, HashAlgorithm};
pub use process::{ExitOutcome, LogStream};
