use serde::{Deserialize, Serialize};

/// Per-stream capture cap (1 MiB).
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;
/// Value injected as `COLUMNS` so line-oriented tools don't wrap.
pub const DEFAULT_TERMINAL_COLUMNS: u16 = 512;
/// The detach timer fires at `timeout * DEFAULT_DETACH_MULTIPLIER`.
pub const DEFAULT_DETACH_MULTIPLIER: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Maximum bytes captured per stream.
    pub output_limit: usize,
    pub terminal_columns: u16,
    pub detach_multiplier: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            output_limit: DEFAULT_OUTPUT_LIMIT,
            terminal_columns: DEFAULT_TERMINAL_COLUMNS,
            detach_multiplier: DEFAULT_DETACH_MULTIPLIER,
        }
    }
}

impl SupervisorConfig {
    /// Deadline after which `execute` gives up waiting for the child.
    pub(crate) fn detach_after(&self, timeout: std::time::Duration) -> std::time::Duration {
        timeout.saturating_mul(self.detach_multiplier.max(1))
    }
}
