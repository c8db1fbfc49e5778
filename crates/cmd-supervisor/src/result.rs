use std::fmt;
use std::process::ExitStatus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `pid` value of a result whose process never started.
pub const PID_NONE: i32 = -1;

pub(crate) const MSG_SUCCESS: &str = "success";
pub(crate) const MSG_DEFAULT: &str = "default msg";
pub(crate) const MSG_DETACHED: &str = "timeout too long, detach cmd";

/// Codes produced by the supervisor itself, never by the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReservedCode {
    /// Result was never filled in.
    Unset = 1001,
    /// The caller stopped waiting; the child may still be alive.
    Detached = 1002,
    /// The process could not be launched.
    StartFailed = 1003,
    /// Waiting failed, or the exit status carried neither code nor signal.
    UnknownFailure = 1004,
}

impl ReservedCode {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1001 => Some(Self::Unset),
            1002 => Some(Self::Detached),
            1003 => Some(Self::StartFailed),
            1004 => Some(Self::UnknownFailure),
            _ => None,
        }
    }
}

impl From<ReservedCode> for i32 {
    fn from(code: ReservedCode) -> Self {
        code as i32
    }
}

/// Whether `code` means "the supervisor couldn't tell" rather than a child status.
pub fn is_reserved_code(code: i32) -> bool {
    ReservedCode::from_code(code).is_some()
}

/// Outcome of one supervised run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub code: i32,
    pub err_msg: String,
    pub stdout: String,
    pub stderr: String,
    pub pid: i32,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "stopedAt", alias = "stoppedAt")]
    pub stopped_at: DateTime<Utc>,
}

impl ExecResult {
    /// A result that has not been filled in yet.
    pub(crate) fn unset(now: DateTime<Utc>) -> Self {
        Self {
            code: ReservedCode::Unset.into(),
            err_msg: MSG_DEFAULT.to_string(),
            stdout: String::new(),
            stderr: String::new(),
            pid: PID_NONE,
            started_at: now,
            stopped_at: now,
        }
    }

    pub(crate) fn start_failed(err: &std::io::Error, at: DateTime<Utc>) -> Self {
        Self {
            code: ReservedCode::StartFailed.into(),
            err_msg: err.to_string(),
            ..Self::unset(at)
        }
    }

    pub(crate) fn detached(pid: Option<u32>, started_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            code: ReservedCode::Detached.into(),
            err_msg: MSG_DETACHED.to_string(),
            pid: pid.and_then(|p| i32::try_from(p).ok()).unwrap_or(PID_NONE),
            started_at,
            ..Self::unset(now)
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved_code(self.code)
    }

    pub fn reserved(&self) -> Option<ReservedCode> {
        ReservedCode::from_code(self.code)
    }

    pub fn pid(&self) -> Option<u32> {
        u32::try_from(self.pid).ok()
    }
}

impl fmt::Display for ExecResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(e) => write!(f, "{e}"),
        }
    }
}

/// Map a wait outcome to `(code, message)`.
pub(crate) fn exit_outcome(status: std::io::Result<ExitStatus>) -> (i32, String) {
    match status {
        Ok(status) if status.success() => (0, MSG_SUCCESS.to_string()),
        Ok(status) => (extract_exit_code(status), status.to_string()),
        Err(e) => (ReservedCode::UnknownFailure.into(), e.to_string()),
    }
}

/// Extract exit code from ExitStatus, mapping signals to 128 + signal number
#[cfg(unix)]
fn extract_exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().unwrap_or_else(|| {
        status
            .signal()
            .map(|sig| 128 + sig)
            .unwrap_or(ReservedCode::UnknownFailure.into())
    })
}

#[cfg(not(unix))]
fn extract_exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or(ReservedCode::UnknownFailure.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecResult {
        let at = DateTime::parse_from_rfc3339("2026-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ExecResult {
            code: 0,
            err_msg: "success".to_string(),
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            pid: 4242,
            started_at: at,
            stopped_at: at,
        }
    }

    #[test]
    fn reserved_codes_are_recognised() {
        for code in [1001, 1002, 1003, 1004] {
            assert!(is_reserved_code(code), "{code} should be reserved");
        }
        for code in [0, 1, 2, 127, 143, 1000, 1005] {
            assert!(!is_reserved_code(code), "{code} should not be reserved");
        }
    }

    #[test]
    fn reserved_code_round_trips_through_i32() {
        let code: i32 = ReservedCode::Detached.into();
        assert_eq!(code, 1002);
        assert_eq!(ReservedCode::from_code(code), Some(ReservedCode::Detached));
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["errMsg"], "success");
        assert_eq!(json["stdout"], "hello\n");
        assert_eq!(json["stderr"], "");
        assert_eq!(json["pid"], 4242);
        assert!(json.get("startedAt").is_some());
        assert!(json.get("stopedAt").is_some());
        assert!(json.get("stoppedAt").is_none());
    }

    #[test]
    fn deserializes_either_stop_spelling() {
        let json = r#"{"code":3,"errMsg":"exit status: 3","stdout":"","stderr":"",
            "pid":7,"startedAt":"2026-01-15T10:00:00Z","stoppedAt":"2026-01-15T10:00:01Z"}"#;
        let result: ExecResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.code, 3);
        assert_eq!(result.pid(), Some(7));
    }

    #[test]
    fn display_renders_json() {
        let rendered = sample().to_string();
        let parsed: ExecResult = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn unset_result_has_sentinels() {
        let result = ExecResult::unset(Utc::now());
        assert_eq!(result.reserved(), Some(ReservedCode::Unset));
        assert_eq!(result.err_msg, "default msg");
        assert_eq!(result.pid, PID_NONE);
        assert_eq!(result.pid(), None);
    }

    #[test]
    fn start_failure_has_identical_timestamps() {
        let at = Utc::now();
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let result = ExecResult::start_failed(&err, at);
        assert_eq!(result.reserved(), Some(ReservedCode::StartFailed));
        assert_eq!(result.err_msg, "no such file");
        assert_eq!(result.started_at, result.stopped_at);
        assert_eq!(result.pid, PID_NONE);
    }

    #[test]
    fn detached_keeps_pid_and_start() {
        let started = Utc::now();
        let result = ExecResult::detached(Some(99), started, Utc::now());
        assert_eq!(result.reserved(), Some(ReservedCode::Detached));
        assert_eq!(result.err_msg, "timeout too long, detach cmd");
        assert_eq!(result.pid, 99);
        assert_eq!(result.started_at, started);
        assert!(result.is_reserved());
        assert!(!result.success());
    }

    #[test]
    fn wait_error_maps_to_unknown_failure() {
        let (code, msg) = exit_outcome(Err(std::io::Error::other("wait broke")));
        assert_eq!(code, 1004);
        assert_eq!(msg, "wait broke");
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_mapping() {
        use std::os::unix::process::ExitStatusExt;

        let (code, msg) = exit_outcome(Ok(ExitStatus::from_raw(0)));
        assert_eq!((code, msg.as_str()), (0, "success"));

        // Raw wait status: exit code lives in the high byte.
        let (code, msg) = exit_outcome(Ok(ExitStatus::from_raw(3 << 8)));
        assert_eq!(code, 3);
        assert_eq!(msg, "exit status: 3");

        // Terminated by SIGTERM (15).
        let (code, _) = exit_outcome(Ok(ExitStatus::from_raw(15)));
        assert_eq!(code, 143);
    }
}
