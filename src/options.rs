//! Numeric option parsing.
//!
//! Command-line values such as buffer sizes and mode masks are written in
//! decimal or `0x`-prefixed hexadecimal. Everything here is pure: parsing
//! either yields a typed value or an [`PipeError::InvalidArgument`], and no
//! OS call is ever made.

use crate::endpoint::{AccessMode, PipeKind, PipeMode, WaitMode};
use crate::error::{PipeError, Result};

/// Open-mode bit: data flows from the peer to the server.
pub const PIPE_ACCESS_INBOUND: u32 = 0x0000_0001;
/// Open-mode bit: data flows from the server to the peer.
pub const PIPE_ACCESS_OUTBOUND: u32 = 0x0000_0002;
/// Both directions.
pub const PIPE_ACCESS_DUPLEX: u32 = PIPE_ACCESS_INBOUND | PIPE_ACCESS_OUTBOUND;

/// Pipe-mode bit: accept returns immediately when no peer is pending.
pub const PIPE_NOWAIT: u32 = 0x0000_0001;
/// Pipe-mode bit: reads return whole messages.
pub const PIPE_READMODE_MESSAGE: u32 = 0x0000_0002;
/// Pipe-mode bit: data is written as messages.
pub const PIPE_TYPE_MESSAGE: u32 = 0x0000_0004;

/// Desired-access bit for reading.
pub const GENERIC_READ: u32 = 0x8000_0000;
/// Desired-access bit for writing.
pub const GENERIC_WRITE: u32 = 0x4000_0000;

/// Parse a decimal or `0x`-prefixed hexadecimal `u32`.
pub fn parse_number(text: &str) -> Result<u32> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse::<u32>(),
    };
    parsed.map_err(|e| PipeError::invalid(format!("{:?} is not a valid number: {}", text, e)))
}

/// Parse a buffer size; zero is rejected.
pub fn parse_buffer_size(text: &str) -> Result<usize> {
    match parse_number(text)? {
        0 => Err(PipeError::invalid("buffer size must be greater than zero")),
        n => Ok(n as usize),
    }
}

impl AccessMode {
    /// Decode a server open-mode mask (`PIPE_ACCESS_*`).
    pub fn from_open_mode(bits: u32) -> Result<Self> {
        match bits {
            PIPE_ACCESS_INBOUND => Ok(AccessMode::ReadOnly),
            PIPE_ACCESS_OUTBOUND => Ok(AccessMode::WriteOnly),
            PIPE_ACCESS_DUPLEX => Ok(AccessMode::Duplex),
            other => Err(PipeError::invalid(format!(
                "unsupported open mode {:#x}",
                other
            ))),
        }
    }

    /// Decode a client desired-access mask (`GENERIC_READ | GENERIC_WRITE`).
    pub fn from_desired_access(bits: u32) -> Result<Self> {
        if bits & !(GENERIC_READ | GENERIC_WRITE) != 0 {
            return Err(PipeError::invalid(format!(
                "unsupported access bits {:#x}",
                bits & !(GENERIC_READ | GENERIC_WRITE)
            )));
        }
        match (bits & GENERIC_READ != 0, bits & GENERIC_WRITE != 0) {
            (true, true) => Ok(AccessMode::Duplex),
            (true, false) => Ok(AccessMode::ReadOnly),
            (false, true) => Ok(AccessMode::WriteOnly),
            (false, false) => Err(PipeError::invalid("access mask requests neither read nor write")),
        }
    }
}

impl PipeMode {
    /// Decode a pipe-mode mask (`PIPE_TYPE_*`, `PIPE_READMODE_*`, `PIPE_NOWAIT`).
    ///
    /// Only unknown bits are rejected here; whether the combination is
    /// usable is decided when the endpoint is created.
    pub fn from_bits(bits: u32) -> Result<Self> {
        let known = PIPE_NOWAIT | PIPE_READMODE_MESSAGE | PIPE_TYPE_MESSAGE;
        if bits & !known != 0 {
            return Err(PipeError::invalid(format!(
                "unsupported pipe mode bits {:#x}",
                bits & !known
            )));
        }
        let kind = |flag: u32| {
            if bits & flag != 0 {
                PipeKind::Message
            } else {
                PipeKind::Byte
            }
        };
        Ok(PipeMode {
            pipe_type: kind(PIPE_TYPE_MESSAGE),
            read_mode: kind(PIPE_READMODE_MESSAGE),
            wait: if bits & PIPE_NOWAIT != 0 {
                WaitMode::NonBlocking
            } else {
                WaitMode::Blocking
            },
        })
    }
}
