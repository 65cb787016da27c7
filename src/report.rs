//! Session outcome reporting.
//!
//! Every flow ends in a single pass/fail [`SessionOutcome`]. The CLI prints
//! it to stderr as a diagnostic, or to stdout as one JSON line with
//! `--json`.
//!
//! # Important
//!
//! - **stdout**: payload bytes and the JSON outcome only
//! - **stderr**: logs and diagnostics
//! - **Never use `println!`**: it may add `\r\n` on Windows

use std::io::Write;

use serde::Serialize;

use crate::driver::SessionReport;
use crate::endpoint::Endpoint;
use crate::error::{ErrorKind, PipeError};

/// Which flow a session ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Transaction,
    ServerRelay,
    ClientRelay,
}

impl Flow {
    pub fn as_str(self) -> &'static str {
        match self {
            Flow::Transaction => "transaction",
            Flow::ServerRelay => "server_relay",
            Flow::ClientRelay => "client_relay",
        }
    }
}

/// Final pass/fail outcome of one flow.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    /// `None` when the flow never started (e.g. argument errors).
    pub flow: Option<Flow>,
    pub endpoint: Option<String>,
    pub success: bool,
    /// Bytes relayed (or received) before the flow ended.
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_code: Option<i32>,
    /// Human-readable cause of a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl SessionOutcome {
    pub fn success(report: &SessionReport) -> Self {
        Self {
            flow: Some(report.flow),
            endpoint: Some(report.endpoint.to_string()),
            success: true,
            bytes: report.bytes,
            error: None,
            os_code: None,
            cause: None,
        }
    }

    pub fn failure(flow: Option<Flow>, endpoint: Option<&Endpoint>, err: &PipeError) -> Self {
        let bytes = match err {
            PipeError::RelayReadFailed { transferred, .. }
            | PipeError::RelayWriteFailed { transferred, .. } => *transferred,
            _ => 0,
        };
        Self {
            flow,
            endpoint: endpoint.map(ToString::to_string),
            success: false,
            bytes,
            error: Some(err.kind()),
            os_code: err.os_code(),
            cause: Some(err.to_string()),
        }
    }

    /// Process exit code.
    ///
    /// By default 0 on success and the error kind's code on failure. The
    /// legacy convention is 1 on success and 0 on failure.
    pub fn exit_code(&self, legacy: bool) -> u8 {
        match (legacy, self.error) {
            (true, _) => u8::from(self.success),
            (false, None) => 0,
            (false, Some(kind)) => kind.exit_code(),
        }
    }

    /// One-line diagnostic.
    pub fn summary(&self) -> String {
        let flow = self.flow.map_or("npipe", Flow::as_str);
        match (&self.cause, self.os_code) {
            (None, _) => format!("{}: ok, {} bytes", flow, self.bytes),
            (Some(cause), Some(code)) => format!("{}: {} (os error {})", flow, cause, code),
            (Some(cause), None) => format!("{}: {}", flow, cause),
        }
    }
}

/// Write a line to stdout.
///
/// Writes the string followed by a single `\n` and flushes.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()?;
    Ok(())
}

/// Write a value to stdout as a single JSON line.
pub fn write_stdout_json<T: Serialize>(value: &T) -> crate::error::Result<()> {
    let json = serde_json::to_string(value)?;
    write_stdout_line(&json)?;
    Ok(())
}

/// Write raw payload bytes to stdout, unmodified.
pub fn write_stdout_bytes(data: &[u8]) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(data)?;
    handle.flush()
}
