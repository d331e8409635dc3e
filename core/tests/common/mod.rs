//! Test utilities for integration tests in the core crate.

#![allow(dead_code)]

use schema::HarnessConfig;
use std::path::Path;
use std::time::Duration;

/// Run the given future with a timeout, failing the test if it elapses.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Run a future with a default timeout of 20 seconds.
pub async fn run_with_default_timeout<F, T>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    run_with_timeout(Duration::from_secs(20), fut).await
}

/// Harness config that runs `script` under `sh -c`
pub fn sh_config(script: &str) -> HarnessConfig {
    HarnessConfig {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        ..HarnessConfig::default()
    }
}

/// Whether `pid` is a live (non-zombie) process
///
/// Zombies count as gone: a killed grandchild may sit unreaped under a
/// container init that never waits.
pub fn is_running(pid: u32) -> bool {
    let stat = format!("/proc/{}/stat", pid);
    if Path::new("/proc/self/stat").exists() {
        return match std::fs::read_to_string(stat) {
            Ok(contents) => {
                // state is the first field after the parenthesised command name
                let state = contents
                    .rsplit_once(')')
                    .and_then(|(_, rest)| rest.split_whitespace().next());
                !matches!(state, Some("Z") | Some("X") | None)
            }
            Err(_) => false,
        };
    }
    // SAFETY: signal 0 only probes for existence
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid as i32, 0) };
    rc == 0
}

/// Poll until `pid` is gone or the deadline passes
pub async fn wait_until_gone(pid: u32, deadline: Duration) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    !is_running(pid)
}

/// Poll until `path` holds a pid written by a test script
pub async fn read_pid_file(path: &Path) -> u32 {
    for _ in 0..200 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no pid written to {:?}", path);
}
