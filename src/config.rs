//! Session configuration.
//!
//! [`SessionConfig`] carries the knobs shared by every flow: transfer buffer
//! size, how long a client waits for a listener, how the relay treats short
//! writes, and where local endpoints live on Unix. It can be built with the
//! fluent setters or loaded from a JSON file; missing fields take defaults.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{PipeError, Result};

/// Default transfer buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 65535;

/// Millisecond value meaning "wait indefinitely".
pub const WAIT_FOREVER: u32 = u32::MAX;

/// Environment variable overriding the default namespace directory.
pub const NAMESPACE_DIR_ENV: &str = "NPIPE_NAMESPACE_DIR";

/// How long a client waits for a listener to become available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum WaitTimeout {
    #[default]
    Forever,
    Bounded(Duration),
}

impl WaitTimeout {
    /// `WAIT_FOREVER` maps to [`WaitTimeout::Forever`], `0` to "do not wait".
    pub fn from_millis(ms: u32) -> Self {
        if ms == WAIT_FOREVER {
            WaitTimeout::Forever
        } else {
            WaitTimeout::Bounded(Duration::from_millis(u64::from(ms)))
        }
    }

    /// Instant after which waiting stops, `None` for indefinitely.
    pub fn deadline_from(self, start: Instant) -> Option<Instant> {
        match self {
            WaitTimeout::Forever => None,
            WaitTimeout::Bounded(d) => Some(start + d),
        }
    }
}

impl From<u32> for WaitTimeout {
    fn from(ms: u32) -> Self {
        Self::from_millis(ms)
    }
}

impl From<WaitTimeout> for u32 {
    fn from(wait: WaitTimeout) -> Self {
        match wait {
            WaitTimeout::Forever => WAIT_FOREVER,
            WaitTimeout::Bounded(d) => {
                u32::try_from(d.as_millis()).map_or(WAIT_FOREVER - 1, |ms| ms.min(WAIT_FOREVER - 1))
            }
        }
    }
}

/// How the relay handles a sink that accepts fewer bytes than offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// One write per read; the unaccepted remainder is dropped and logged.
    #[default]
    Legacy,
    /// Keep writing until every byte read has been accepted.
    Strict,
}

/// Configuration shared by clients, servers and the session driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Transfer buffer capacity, allocated once per session.
    pub buffer_size: usize,
    /// Client wait for a listener.
    pub wait: WaitTimeout,
    /// Relay write behavior.
    pub write_mode: WriteMode,
    /// Directory holding local endpoint sockets (Unix only).
    pub namespace_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            wait: WaitTimeout::Forever,
            write_mode: WriteMode::Legacy,
            namespace_dir: default_namespace_dir(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PipeError::FileOpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SessionConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the transfer buffer size.
    ///
    /// Default: 65535
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the client wait for a listener.
    ///
    /// Default: forever
    pub fn wait(mut self, wait: WaitTimeout) -> Self {
        self.wait = wait;
        self
    }

    /// Set the relay write mode.
    ///
    /// Default: legacy
    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Set the directory holding local endpoints.
    pub fn namespace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.namespace_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(PipeError::invalid("buffer size must be greater than zero"));
        }
        Ok(())
    }
}

fn default_namespace_dir() -> PathBuf {
    match std::env::var_os(NAMESPACE_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join("npipe"),
    }
}
