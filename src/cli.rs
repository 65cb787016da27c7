//! Command-line surface of the `npipe` binary.
//!
//! Arguments are parsed with clap and turned into a [`Plan`] by
//! [`build_plan`]. Every numeric value is validated there, before any file
//! is opened or endpoint touched. [`execute`] runs the plan and folds the
//! result into one [`SessionOutcome`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{SessionConfig, WaitTimeout, WriteMode};
use crate::driver::{Input, Output, Plan, RelayRequest, SessionDriver, TransactionRequest};
use crate::endpoint::{AccessMode, Endpoint, PipeMode};
use crate::error::{PipeError, Result};
use crate::options::{parse_buffer_size, parse_number};
use crate::report::{write_stdout_bytes, SessionOutcome};
use crate::transport::generate_pipe_name;

#[derive(Parser, Debug)]
#[command(name = "npipe")]
#[command(about = "Named-pipe calls and single-connection relays")]
#[command(version)]
pub struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Keep writing until the sink accepted every byte read
    #[arg(long, global = true)]
    pub strict: bool,

    /// Print the outcome as one JSON line on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Exit with 1 on success and 0 on failure
    #[arg(long, global = true)]
    pub legacy_exit_codes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request and print or store the response
    Call {
        /// Target pipe, e.g. \\.\pipe\test1
        target: String,

        /// Request payload file (empty request when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Response file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Response buffer size, decimal or 0x-hex
        #[arg(short, long)]
        buffer_size: Option<String>,

        /// Milliseconds to wait for the listener (0xFFFFFFFF waits forever)
        #[arg(short, long)]
        timeout: Option<String>,
    },

    /// Create an endpoint, serve one peer and relay until end-of-stream
    Listen {
        /// Pipe name or full \\.\pipe\name (a unique name when omitted)
        name: Option<String>,

        #[command(flatten)]
        io: RelayIo,

        /// Open mode: 1 inbound, 2 outbound, 3 duplex
        #[arg(long)]
        open_mode: Option<String>,

        /// Pipe mode bits: 0x4 message type, 0x2 message read, 0x1 no-wait
        #[arg(long)]
        pipe_mode: Option<String>,

        /// Transfer buffer size, decimal or 0x-hex
        #[arg(short, long)]
        buffer_size: Option<String>,
    },

    /// Connect to an endpoint as a stream and relay until end-of-stream
    Open {
        /// Target pipe, e.g. \\.\pipe\test1
        target: String,

        #[command(flatten)]
        io: RelayIo,

        /// Desired access: 0x80000000 read, 0x40000000 write
        #[arg(long)]
        access: Option<String>,

        /// Milliseconds to wait for the listener (0xFFFFFFFF waits forever)
        #[arg(short, long)]
        timeout: Option<String>,

        /// Transfer buffer size, decimal or 0x-hex
        #[arg(short, long)]
        buffer_size: Option<String>,
    },
}

/// Relay endpoints. Each side defaults to the pipe itself.
#[derive(clap::Args, Debug)]
pub struct RelayIo {
    /// Read from this file
    #[arg(short, long, conflicts_with = "input_pipe")]
    pub input: Option<PathBuf>,

    /// Read from the pipe
    #[arg(long)]
    pub input_pipe: bool,

    /// Write to this file
    #[arg(short, long, conflicts_with = "output_pipe")]
    pub output: Option<PathBuf>,

    /// Write to the pipe
    #[arg(long)]
    pub output_pipe: bool,
}

impl RelayIo {
    pub fn input(&self) -> Input {
        match &self.input {
            Some(path) if !self.input_pipe => Input::File(path.clone()),
            _ => Input::Pipe,
        }
    }

    pub fn output(&self) -> Output {
        match &self.output {
            Some(path) if !self.output_pipe => Output::File(path.clone()),
            _ => Output::Pipe,
        }
    }
}

/// Build and run the plan described by `args`.
pub async fn execute(args: &Args) -> SessionOutcome {
    match build_plan(args) {
        Ok((config, plan)) => run(config, &plan).await,
        Err(e) => SessionOutcome::failure(None, None, &e),
    }
}

async fn run(config: SessionConfig, plan: &Plan) -> SessionOutcome {
    let driver = SessionDriver::new(config);
    let result = driver.run(plan).await.and_then(|report| {
        if let Some(response) = &report.response {
            write_stdout_bytes(response)?;
        }
        Ok(report)
    });

    match result {
        Ok(report) => SessionOutcome::success(&report),
        Err(e) => SessionOutcome::failure(Some(plan.flow()), Some(plan.endpoint()), &e),
    }
}

/// Validate every argument before any OS call.
pub fn build_plan(args: &Args) -> Result<(SessionConfig, Plan)> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if args.strict {
        config = config.write_mode(WriteMode::Strict);
    }

    let plan = match &args.command {
        Command::Call {
            target,
            input,
            output,
            buffer_size,
            timeout,
        } => {
            config = apply_common(config, buffer_size.as_deref(), timeout.as_deref())?;
            Plan::Transaction(TransactionRequest {
                endpoint: parse_endpoint(target)?,
                input: input.clone(),
                output: output.clone(),
            })
        }
        Command::Listen {
            name,
            io,
            open_mode,
            pipe_mode,
            buffer_size,
        } => {
            config = apply_common(config, buffer_size.as_deref(), None)?;
            let access = match open_mode {
                Some(text) => AccessMode::from_open_mode(parse_number(text)?)?,
                None => AccessMode::Duplex,
            };
            let mode = match pipe_mode {
                Some(text) => PipeMode::from_bits(parse_number(text)?)?,
                None => PipeMode::byte(),
            };
            Plan::Serve {
                relay: RelayRequest {
                    endpoint: match name {
                        Some(name) => parse_endpoint(name)?,
                        None => {
                            let endpoint = Endpoint::local(&generate_pipe_name("npipe"))?;
                            tracing::info!("Listening on generated endpoint {}", endpoint);
                            endpoint
                        }
                    },
                    access,
                    input: io.input(),
                    output: io.output(),
                },
                mode,
            }
        }
        Command::Open {
            target,
            io,
            access,
            timeout,
            buffer_size,
        } => {
            config = apply_common(config, buffer_size.as_deref(), timeout.as_deref())?;
            let access = match access {
                Some(text) => AccessMode::from_desired_access(parse_number(text)?)?,
                None => AccessMode::Duplex,
            };
            Plan::Connect(RelayRequest {
                endpoint: parse_endpoint(target)?,
                access,
                input: io.input(),
                output: io.output(),
            })
        }
    };

    config.validate()?;
    Ok((config, plan))
}

fn apply_common(
    mut config: SessionConfig,
    buffer_size: Option<&str>,
    timeout: Option<&str>,
) -> Result<SessionConfig> {
    if let Some(text) = buffer_size {
        config = config.buffer_size(parse_buffer_size(text)?);
    }
    if let Some(text) = timeout {
        config = config.wait(WaitTimeout::from_millis(parse_number(text)?));
    }
    Ok(config)
}

/// Accept a full `\\server\pipe\name` or a bare local name.
pub fn parse_endpoint(text: &str) -> Result<Endpoint> {
    if text.starts_with(r"\\") || text.starts_with("//") {
        Endpoint::parse(text)
    } else if text.is_empty() {
        Err(PipeError::invalid("missing target"))
    } else {
        Endpoint::local(text)
    }
}
