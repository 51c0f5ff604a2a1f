use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use chat_hover_translate::{init_tracing, run, RunOptions};

/// Replay a chat page session with hover-gated translation.
#[derive(Parser, Debug)]
#[command(name = "chat-hover-translate", version, about)]
struct Cli {
    /// Translator configuration (JSON). Defaults are used when absent or unreadable.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay script (JSON) describing page events.
    #[arg(long)]
    script: PathBuf,

    /// Use the offline stub translator instead of the remote service.
    #[arg(long)]
    offline: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // One logical thread: every mutation, hover and timer reaction runs here.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    let options = RunOptions {
        config_path: cli.config,
        script_path: cli.script,
        offline: cli.offline,
    };

    match runtime.block_on(run(options)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "chat-hover-translate failed");
            ExitCode::FAILURE
        }
    }
}
