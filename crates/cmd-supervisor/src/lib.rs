//! Supervised execution of a single external command.
//!
//! A [`Supervisor`] launches one child process, captures a size-bounded copy
//! of its stdout/stderr, terminates its whole process group when a soft
//! timeout expires, and stops waiting altogether once a hard "detach"
//! timeout expires. Every run produces an [`ExecResult`]; failures of the
//! child are encoded in the result rather than returned as errors.

mod config;
mod error;
mod result;
mod shell;
mod sink;
mod supervisor;
mod terminator;

pub use config::SupervisorConfig;
pub use error::{Result, SupervisorError};
pub use result::{ExecResult, PID_NONE, ReservedCode, is_reserved_code};
pub use shell::{execute, execute_in};
pub use sink::{BoundedSink, CapacityExceeded};
pub use supervisor::{State, Supervisor};
#[cfg(unix)]
pub use terminator::ProcessGroupTerminator;
pub use terminator::{ChildHandle, DirectKillTerminator, Terminator, default_terminator};
