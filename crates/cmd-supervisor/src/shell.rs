//! One-shot helpers for running a shell command string.
//!
//! The wait may take up to twice the timeout: the child is asked to stop at
//! `timeout` and abandoned at `2 * timeout`. See [`Supervisor::execute`].

use std::path::Path;
use std::time::Duration;

use crate::result::ExecResult;
use crate::supervisor::Supervisor;

/// Run `sh -c <command>` in `dir` (empty path: current directory).
pub async fn execute_in(command: &str, timeout: Duration, dir: impl AsRef<Path>) -> ExecResult {
    Supervisor::shell(command)
        .with_dir(dir.as_ref())
        .execute(timeout)
        .await
}

/// Run `sh -c <command>` in the current directory.
pub async fn execute(command: &str, timeout: Duration) -> ExecResult {
    Supervisor::shell(command).execute(timeout).await
}
