//! Process management for the supervised server
//!
//! The server is always spawned as the leader of a fresh process group so
//! that it and any descendants can be torn down with a single signal.
//!
//! ## Platform Support
//!
//! - **Unix**: process groups via `setsid()` and `killpg()`
//! - **Other platforms**: not supported

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
