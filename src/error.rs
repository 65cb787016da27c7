//! Error types for npipe-session.
//!
//! Every operation returns a typed [`PipeError`]. Failures at an I/O
//! boundary keep the originating [`std::io::Error`] as their source, so the
//! OS error code is always recoverable through [`PipeError::os_code`].

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::endpoint::AccessMode;

/// Main error type for all pipe session operations.
#[derive(Debug, Error)]
pub enum PipeError {
    /// Malformed option, endpoint name or configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A file collaborator could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No listener became available before the wait expired, or the
    /// endpoint does not exist.
    #[error("endpoint {endpoint} unavailable: {source}")]
    EndpointUnavailable {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The endpoint could not be created with the requested capabilities.
    #[error("failed to create endpoint {endpoint}: {source}")]
    CreateFailed {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Waiting for a peer failed at the OS level.
    #[error("failed to accept a connection on {endpoint}: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The send-then-receive exchange did not complete.
    #[error("transaction on {endpoint} failed: {source}")]
    TransactionFailed {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Reading from the relay source failed.
    #[error("relay read failed after {transferred} bytes: {source}")]
    RelayReadFailed {
        transferred: u64,
        #[source]
        source: Box<PipeError>,
    },

    /// Writing to the relay sink failed.
    #[error("relay write failed after {transferred} bytes: {source}")]
    RelayWriteFailed {
        transferred: u64,
        #[source]
        source: Box<PipeError>,
    },

    /// The operation is not permitted by the channel's access mode.
    #[error("{op} is not permitted on a {access} channel")]
    AccessDenied { op: &'static str, access: AccessMode },

    /// The channel was already closed.
    #[error("channel closed")]
    Closed,

    /// I/O error on an already established channel.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl PipeError {
    /// Stable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipeError::InvalidArgument(_) | PipeError::Config(_) => ErrorKind::InvalidArgument,
            PipeError::FileOpenFailed { .. } => ErrorKind::FileOpenFailed,
            PipeError::EndpointUnavailable { .. } => ErrorKind::EndpointUnavailable,
            PipeError::CreateFailed { .. } => ErrorKind::CreateFailed,
            PipeError::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            PipeError::TransactionFailed { .. } => ErrorKind::TransactionFailed,
            PipeError::RelayReadFailed { .. } => ErrorKind::RelayReadFailed,
            PipeError::RelayWriteFailed { .. } => ErrorKind::RelayWriteFailed,
            PipeError::AccessDenied { .. } => ErrorKind::AccessDenied,
            PipeError::Closed => ErrorKind::Closed,
            PipeError::Io(_) => ErrorKind::Io,
        }
    }

    /// Raw OS error code of the underlying failure, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            PipeError::FileOpenFailed { source, .. }
            | PipeError::EndpointUnavailable { source, .. }
            | PipeError::CreateFailed { source, .. }
            | PipeError::ConnectFailed { source, .. }
            | PipeError::TransactionFailed { source, .. }
            | PipeError::Io(source) => source.raw_os_error(),
            PipeError::RelayReadFailed { source, .. }
            | PipeError::RelayWriteFailed { source, .. } => source.os_code(),
            _ => None,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PipeError::InvalidArgument(msg.into())
    }
}

/// Error category with a stable name and exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    FileOpenFailed,
    EndpointUnavailable,
    CreateFailed,
    ConnectFailed,
    TransactionFailed,
    RelayReadFailed,
    RelayWriteFailed,
    AccessDenied,
    Closed,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::FileOpenFailed => "file_open_failed",
            ErrorKind::EndpointUnavailable => "endpoint_unavailable",
            ErrorKind::CreateFailed => "create_failed",
            ErrorKind::ConnectFailed => "connect_failed",
            ErrorKind::TransactionFailed => "transaction_failed",
            ErrorKind::RelayReadFailed => "relay_read_failed",
            ErrorKind::RelayWriteFailed => "relay_write_failed",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::Closed => "closed",
            ErrorKind::Io => "io",
        }
    }

    /// Process exit code for this kind. Never 0.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Io => 1,
            ErrorKind::InvalidArgument => 2,
            ErrorKind::FileOpenFailed => 3,
            ErrorKind::EndpointUnavailable => 4,
            ErrorKind::CreateFailed => 5,
            ErrorKind::ConnectFailed => 6,
            ErrorKind::TransactionFailed => 7,
            ErrorKind::RelayReadFailed => 8,
            ErrorKind::RelayWriteFailed => 9,
            ErrorKind::AccessDenied => 10,
            ErrorKind::Closed => 11,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias using PipeError.
pub type Result<T> = std::result::Result<T, PipeError>;
