#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("command isn't running")]
    NotRunning,

    #[error("failed to terminate pid {pid}: {detail}")]
    Terminate { pid: u32, detail: String },

    #[error("pid out of range: {0}")]
    InvalidPid(u32),

    #[error("child already reaped, kill request dropped")]
    ChildGone,
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
