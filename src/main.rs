//! `npipe` command-line tool.
//!
//! Thin wrapper around [`npipe_session::cli`]: installs logging, runs the
//! plan and reports a single outcome. Logs go to stderr; stdout carries
//! only response bytes and the `--json` outcome.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use npipe_session::cli::{execute, Args};
use npipe_session::report::write_stdout_json;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let outcome = execute(&args).await;

    if outcome.success {
        info!("{}", outcome.summary());
    } else {
        error!("{}", outcome.summary());
    }
    if args.json {
        if let Err(e) = write_stdout_json(&outcome) {
            error!("Failed to write outcome: {}", e);
        }
    }

    ExitCode::from(outcome.exit_code(args.legacy_exit_codes))
}
