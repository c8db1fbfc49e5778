//! Lifecycle of one supervised command.
//!
//! `start` spawns a run routine on the ambient tokio runtime. The routine
//! launches the child, waits for it to exit and for both capture routines to
//! hit end-of-file, then marks the supervisor `Finished` and publishes the
//! result exactly once. `execute` races that publication against a soft
//! timeout (which calls `stop`) and a detach timeout (which abandons the
//! wait). An abandoned run routine keeps running until its child goes away;
//! there is no way to reclaim it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::result::{ExecResult, PID_NONE, exit_outcome};
use crate::sink::{BoundedSink, CapacityExceeded};
use crate::terminator::{ChildHandle, Terminator, default_terminator};

/// Read size used by the capture routines.
const READ_CHUNK: usize = 32 * 1024;

/// Monotonic lifecycle state: `Created -> Running -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Created,
    Running,
    Finished,
}

#[derive(Debug)]
struct Lifecycle {
    state: State,
    /// Set by the first `start`; later calls are no-ops.
    launched: bool,
    child: Option<ChildHandle>,
    started_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    done: watch::Sender<Option<ExecResult>>,
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Supervises a single execution of an external command.
///
/// A supervisor runs its command at most once; a new command needs a new
/// supervisor.
#[derive(Debug)]
pub struct Supervisor {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    config: SupervisorConfig,
    terminator: Arc<dyn Terminator>,
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (done, _) = watch::channel(None);
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            config: SupervisorConfig::default(),
            terminator: default_terminator(),
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle {
                    state: State::Created,
                    launched: false,
                    child: None,
                    started_at: None,
                }),
                done,
            }),
        }
    }

    /// `sh -c <command>`.
    pub fn shell(command: &str) -> Self {
        Self::new("sh", ["-c", command])
    }

    /// Working directory for the child. An empty path means the current
    /// directory. Has no effect once the command has been started.
    pub fn set_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.dir = (!dir.as_os_str().is_empty()).then_some(dir);
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.set_dir(dir);
        self
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.shared.lifecycle().state
    }

    /// The published result, once the supervisor is `Finished`.
    pub fn result(&self) -> Option<ExecResult> {
        self.shared.done.borrow().clone()
    }

    /// Launch the command in the background. Only the first call does
    /// anything.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        {
            let mut lifecycle = self.shared.lifecycle();
            if lifecycle.launched {
                debug!(program = %self.program, state = ?lifecycle.state, "already started");
                return;
            }
            lifecycle.launched = true;
        }

        let cmd = self.command();
        let program = self.program.clone();
        let limit = self.config.output_limit;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = launch_and_wait(cmd, &program, limit, &shared).await;
            finish(&shared, result);
        });
    }

    /// Run the command and wait at most `timeout * detach_multiplier` for it.
    ///
    /// At `timeout` the child is sent a termination request via [`stop`].
    /// If it still hasn't finished when the detach timer fires, a
    /// `Detached` result is returned and the child may still be running.
    ///
    /// [`stop`]: Supervisor::stop
    pub async fn execute(&self, timeout: Duration) -> ExecResult {
        self.start();

        let mut done = self.shared.done.subscribe();
        let soft = tokio::time::sleep(timeout);
        let detach = tokio::time::sleep(self.config.detach_after(timeout));
        tokio::pin!(soft);
        tokio::pin!(detach);
        let mut soft_fired = false;

        loop {
            tokio::select! {
                biased;

                result = wait_published(&mut done) => return result,
                () = &mut soft, if !soft_fired => {
                    soft_fired = true;
                    match self.stop() {
                        Ok(()) => info!(program = %self.program, ?timeout, "timeout reached, terminating command"),
                        Err(e) => debug!(program = %self.program, error = %e, "stop on timeout failed"),
                    }
                }
                () = &mut detach => return self.detach(),
            }
        }
    }

    /// Run the command and wait for it without any timeout.
    pub async fn wait(&self) -> ExecResult {
        self.start();
        let mut done = self.shared.done.subscribe();
        wait_published(&mut done).await
    }

    /// Ask the running child (and, on Unix, its whole process group) to
    /// terminate. Advisory: the run routine keeps waiting for the child.
    pub fn stop(&self) -> Result<()> {
        let child = {
            let lifecycle = self.shared.lifecycle();
            if lifecycle.state != State::Running {
                return Err(SupervisorError::NotRunning);
            }
            lifecycle.child.clone().ok_or(SupervisorError::NotRunning)?
        };
        self.terminator.terminate(&child)
    }

    fn detach(&self) -> ExecResult {
        let now = Utc::now();
        let (pid, started_at) = {
            let lifecycle = self.shared.lifecycle();
            (
                lifecycle.child.as_ref().map(ChildHandle::pid),
                lifecycle.started_at,
            )
        };
        warn!(program = %self.program, ?pid, "timeout too long, detaching from command");
        ExecResult::detached(pid, started_at.unwrap_or(now), now)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("COLUMNS", self.config.terminal_columns.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        // Own process group so `stop` can signal the child's descendants too.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

async fn wait_published(done: &mut watch::Receiver<Option<ExecResult>>) -> ExecResult {
    match done.wait_for(Option::is_some).await {
        Ok(published) => (*published)
            .clone()
            .unwrap_or_else(|| ExecResult::unset(Utc::now())),
        Err(_) => ExecResult::unset(Utc::now()),
    }
}

/// Final step of every run: mark `Finished`, then publish.
fn finish(shared: &Shared, result: ExecResult) {
    {
        let mut lifecycle = shared.lifecycle();
        lifecycle.state = State::Finished;
        lifecycle.child = None;
    }
    shared.done.send_replace(Some(result));
}

async fn launch_and_wait(
    mut cmd: Command,
    program: &str,
    limit: usize,
    shared: &Shared,
) -> ExecResult {
    let started_at = Utc::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(program, error = %e, "failed to start command");
            return ExecResult::start_failed(&e, started_at);
        }
    };

    let pid = child.id();
    let (kill_tx, mut kill_rx) = mpsc::unbounded_channel();
    {
        let mut lifecycle = shared.lifecycle();
        lifecycle.state = State::Running;
        lifecycle.started_at = Some(started_at);
        lifecycle.child = pid.map(|pid| ChildHandle::new(pid, kill_tx));
    }
    info!(program, ?pid, "command started");

    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(capture(out, limit, "stdout")));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(capture(err, limit, "stderr")));

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(()) = kill_rx.recv() => {
                if let Err(e) = child.start_kill() {
                    warn!(program, ?pid, error = %e, "failed to kill command");
                }
            }
        }
    };
    // Later kill requests have nothing left to act on; report them as `ChildGone`.
    drop(kill_rx);
    let (code, err_msg) = exit_outcome(status);

    let stdout = collect(stdout).await;
    let stderr = collect(stderr).await;
    let stopped_at = Utc::now();
    info!(program, ?pid, code, "command exited");

    ExecResult {
        code,
        err_msg,
        stdout,
        stderr,
        pid: pid.and_then(|p| i32::try_from(p).ok()).unwrap_or(PID_NONE),
        started_at,
        stopped_at,
    }
}

/// Copy a child pipe into a bounded sink until end-of-file.
///
/// Reads never exceed the sink's remaining capacity, so a stream longer than
/// the cap captures exactly `limit` bytes. After the first rejected write the
/// rest of the stream is drained and discarded so the child never blocks on
/// a full pipe.
async fn capture<R>(mut reader: R, limit: usize, stream: &'static str) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut sink = BoundedSink::new(Vec::new(), limit);
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut capturing = true;

    loop {
        let want = if capturing {
            sink.remaining().clamp(1, READ_CHUNK)
        } else {
            READ_CHUNK
        };
        buf.resize(want, 0);

        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(stream, error = %e, "read from child pipe failed");
                break;
            }
        };
        if !capturing {
            continue;
        }

        if let Err(e) = sink.write_all(buf.get(..n).unwrap_or_default()) {
            match CapacityExceeded::find(&e) {
                Some(rejected) => {
                    debug!(stream, limit, requested = rejected.requested, "output limit reached, discarding rest")
                }
                None => debug!(stream, error = %e, "capture failed, discarding rest"),
            }
            capturing = false;
        }
    }

    sink.into_inner()
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match task.await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(error = %e, "capture task failed");
            String::new()
        }
    }
}
