use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use cmd_supervisor::{ExecResult, Supervisor, SupervisorConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

/// Run a shell command under supervision and print the result as JSON.
#[derive(Parser)]
#[command(name = "cmd-run", version)]
struct Cli {
    /// Shell command, passed to `sh -c`
    command: String,

    /// Soft timeout in milliseconds; the wait is abandoned at twice this
    #[arg(long, env = "CMD_RUN_TIMEOUT_MS", default_value_t = 60_000)]
    timeout_ms: u64,

    /// Working directory for the command
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Maximum bytes captured per output stream
    #[arg(long, env = "CMD_RUN_OUTPUT_LIMIT")]
    output_limit: Option<usize>,

    /// Value injected as COLUMNS
    #[arg(long, env = "CMD_RUN_COLUMNS")]
    columns: Option<u16>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

impl Cli {
    fn config(&self) -> SupervisorConfig {
        let defaults = SupervisorConfig::default();
        SupervisorConfig {
            output_limit: self.output_limit.unwrap_or(defaults.output_limit),
            terminal_columns: self.columns.unwrap_or(defaults.terminal_columns),
            ..defaults
        }
    }
}

/// Child's code if it reported one that fits, 1 otherwise.
fn exit_status(result: &ExecResult) -> u8 {
    if result.is_reserved() {
        return 1;
    }
    u8::try_from(result.code).unwrap_or(1)
}

fn render(result: &ExecResult, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(result)
    } else {
        serde_json::to_string(result)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut supervisor = Supervisor::shell(&cli.command).with_config(cli.config());
    if let Some(dir) = &cli.dir {
        supervisor.set_dir(dir);
    }

    let result = supervisor
        .execute(Duration::from_millis(cli.timeout_ms))
        .await;
    info!(code = result.code, pid = result.pid, "finished");

    match render(&result, cli.pretty) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::from(exit_status(&result))
}
