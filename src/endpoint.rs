//! Endpoint names and the capabilities requested on them.
//!
//! An [`Endpoint`] is the named address of a pipe, written
//! `\\<server>\pipe\<name>`. The server part `.` (or `localhost`) means the
//! local machine. [`AccessMode`] and [`PipeMode`] are fixed when an endpoint
//! is created or opened and never change afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipeError, Result};

/// Maximum length of a full pipe name, `\\server\pipe\name` included.
pub const MAX_PIPE_NAME_LEN: usize = 256;

/// Namespace segment between server and pipe name.
const PIPE_SEGMENT: &str = "pipe";

/// Identifies a named pipe. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    server: String,
    name: String,
}

impl Endpoint {
    /// Parse `\\server\pipe\name`. Forward slashes are accepted as well.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > MAX_PIPE_NAME_LEN {
            return Err(PipeError::invalid(format!(
                "pipe name longer than {} characters",
                MAX_PIPE_NAME_LEN
            )));
        }

        let rest = text
            .strip_prefix(r"\\")
            .or_else(|| text.strip_prefix("//"))
            .ok_or_else(|| {
                PipeError::invalid(format!(r"expected \\server\pipe\name, got {:?}", text))
            })?;

        let mut parts = rest.splitn(3, ['\\', '/']);
        let server = parts.next().unwrap_or_default();
        let segment = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();

        if server.is_empty() {
            return Err(PipeError::invalid(format!("missing server in {:?}", text)));
        }
        if !segment.eq_ignore_ascii_case(PIPE_SEGMENT) {
            return Err(PipeError::invalid(format!(
                r"expected \pipe\ after the server in {:?}",
                text
            )));
        }

        Self::build(server, name)
    }

    /// Endpoint on the local machine: `\\.\pipe\<name>`.
    pub fn local(name: &str) -> Result<Self> {
        let endpoint = Self::build(".", name)?;
        if endpoint.to_string().len() > MAX_PIPE_NAME_LEN {
            return Err(PipeError::invalid(format!(
                "pipe name longer than {} characters",
                MAX_PIPE_NAME_LEN
            )));
        }
        Ok(endpoint)
    }

    fn build(server: &str, name: &str) -> Result<Self> {
        validate_name(name)?;
        if server.contains(['\\', '/', '\0']) {
            return Err(PipeError::invalid(format!("invalid server name {:?}", server)));
        }
        Ok(Self {
            server: server.to_string(),
            name: name.to_string(),
        })
    }

    /// Server part (`.` for the local machine).
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Pipe name without the `\\server\pipe\` prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this endpoint lives on the local machine.
    pub fn is_local(&self) -> bool {
        self.server == "." || self.server.eq_ignore_ascii_case("localhost")
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PipeError::invalid("pipe name is empty"));
    }
    if name == "." || name == ".." {
        return Err(PipeError::invalid(format!("pipe name {:?} is reserved", name)));
    }
    if name.contains(['\\', '/', '\0']) {
        return Err(PipeError::invalid(format!(
            "pipe name {:?} contains a path separator or NUL",
            name
        )));
    }
    Ok(())
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r"\\{}\{}\{}", self.server, PIPE_SEGMENT, self.name)
    }
}

impl FromStr for Endpoint {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Direction of data flow permitted to the holder of a channel or session.
///
/// For a server, `ReadOnly` is an inbound pipe (peer writes, server reads)
/// and `WriteOnly` an outbound one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    Duplex,
}

impl AccessMode {
    #[inline]
    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::Duplex)
    }

    #[inline]
    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::Duplex)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessMode::ReadOnly => "read-only",
            AccessMode::WriteOnly => "write-only",
            AccessMode::Duplex => "duplex",
        })
    }
}

/// Byte stream or message semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipeKind {
    #[default]
    Byte,
    Message,
}

/// Whether waiting for a peer blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    #[default]
    Blocking,
    NonBlocking,
}

/// Pipe semantics requested at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PipeMode {
    pub pipe_type: PipeKind,
    pub read_mode: PipeKind,
    pub wait: WaitMode,
}

impl PipeMode {
    /// Byte pipe, byte reads, blocking accept.
    pub fn byte() -> Self {
        Self::default()
    }

    pub fn with_wait(mut self, wait: WaitMode) -> Self {
        self.wait = wait;
        self
    }

    /// Reject combinations no pipe can honor.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.pipe_type == PipeKind::Byte && self.read_mode == PipeKind::Message {
            return Err("message read mode requires a message-type pipe");
        }
        Ok(())
    }
}
