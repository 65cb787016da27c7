//! File collaborators.
//!
//! Plain files are consumed as channels only; no file-system semantics
//! beyond open-for-read and create-or-truncate-for-write live here.

use std::path::Path;

use tokio::fs::File;

use super::IoChannel;
use crate::error::{PipeError, Result};

/// Open an existing file as a read-only channel.
pub async fn open_read(path: &Path) -> Result<IoChannel> {
    let file = File::open(path)
        .await
        .map_err(|source| PipeError::FileOpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!("Opened {} for reading", path.display());
    Ok(IoChannel::reader(path.display().to_string(), file))
}

/// Create (or truncate) a file as a write-only channel.
pub async fn open_write(path: &Path) -> Result<IoChannel> {
    let file = File::create(path)
        .await
        .map_err(|source| PipeError::FileOpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!("Opened {} for writing", path.display());
    Ok(IoChannel::writer(path.display().to_string(), file))
}
