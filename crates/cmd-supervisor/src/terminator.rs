//! Platform-specific termination of a running child.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, SupervisorError};

/// Handle on a launched child, valid while the supervisor is `Running`.
///
/// The OS child handle itself stays with the run routine; `request_kill`
/// asks that routine to force-kill it.
#[derive(Debug, Clone)]
pub struct ChildHandle {
    pid: u32,
    kill_tx: mpsc::UnboundedSender<()>,
}

impl ChildHandle {
    pub(crate) fn new(pid: u32, kill_tx: mpsc::UnboundedSender<()>) -> Self {
        Self { pid, kill_tx }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask the run routine to force-kill the direct child.
    pub fn request_kill(&self) -> Result<()> {
        self.kill_tx.send(()).map_err(|_| SupervisorError::ChildGone)
    }
}

/// Strategy used by `Supervisor::stop` to terminate a running child.
pub trait Terminator: Send + Sync + fmt::Debug {
    fn terminate(&self, child: &ChildHandle) -> Result<()>;
}

/// Signals the child's whole process group.
///
/// The child must be spawned as a process group leader (`process_group(0)`),
/// which the supervisor does on Unix. The group is addressed by the child's
/// pid, so descendants are still reached after the leader has exited.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct ProcessGroupTerminator {
    signal: nix::sys::signal::Signal,
}

#[cfg(unix)]
impl ProcessGroupTerminator {
    pub fn new(signal: nix::sys::signal::Signal) -> Self {
        Self { signal }
    }
}

#[cfg(unix)]
impl Default for ProcessGroupTerminator {
    fn default() -> Self {
        Self::new(nix::sys::signal::Signal::SIGTERM)
    }
}

#[cfg(unix)]
impl Terminator for ProcessGroupTerminator {
    fn terminate(&self, child: &ChildHandle) -> Result<()> {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        // The child leads its own group, so its pid is the pgid. That stays
        // valid after the leader is reaped while descendants remain.
        let pid = child.pid();
        let pgid = i32::try_from(pid).map_err(|_| SupervisorError::InvalidPid(pid))?;
        debug!(pid, signal = ?self.signal, "signalling process group");
        killpg(Pid::from_raw(pgid), self.signal).map_err(|e| SupervisorError::Terminate {
            pid,
            detail: format!("killpg {pgid}: {e}"),
        })
    }
}

/// Best-effort forced kill of the direct child only.
///
/// Descendants are not reliably terminated; if one of them keeps an output
/// pipe open the run routine keeps waiting until the detach timer fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectKillTerminator;

impl Terminator for DirectKillTerminator {
    fn terminate(&self, child: &ChildHandle) -> Result<()> {
        debug!(pid = child.pid(), "requesting direct kill");
        child.request_kill()
    }
}

/// Process-group termination on Unix, direct kill elsewhere.
pub fn default_terminator() -> Arc<dyn Terminator> {
    #[cfg(unix)]
    {
        Arc::new(ProcessGroupTerminator::default())
    }

    #[cfg(not(unix))]
    {
        Arc::new(DirectKillTerminator)
    }
}
