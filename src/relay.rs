//! Chunked copy from a source channel to a sink channel.
//!
//! [`StreamRelay::relay`] reads into a caller-owned [`TransferBuffer`] and
//! writes what was read until the source reports end-of-stream.
//!
//! # Write modes
//!
//! - [`WriteMode::Legacy`]: each chunk gets exactly one `write`. If the sink
//!   accepts fewer bytes than offered, the remainder is dropped (logged at
//!   WARN) and only the accepted bytes are counted.
//! - [`WriteMode::Strict`]: each chunk is written until the sink has
//!   accepted all of it. A sink that accepts nothing fails the relay.

use std::io;

use crate::channel::{ByteChannel, TransferBuffer};
use crate::config::WriteMode;
use crate::error::{PipeError, Result};

/// Copies bytes between two channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamRelay {
    mode: WriteMode,
}

impl StreamRelay {
    pub fn new(mode: WriteMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Relay `source` into `sink` until end-of-stream.
    ///
    /// Returns the number of bytes the sink accepted. A read failure is
    /// `RelayReadFailed`, a write failure `RelayWriteFailed`; both carry the
    /// count transferred before the failure.
    pub async fn relay<S, K>(
        &self,
        source: &mut S,
        sink: &mut K,
        buffer: &mut TransferBuffer,
    ) -> Result<u64>
    where
        S: ByteChannel,
        K: ByteChannel,
    {
        let mut total: u64 = 0;

        loop {
            let n = match source.read(buffer.as_mut_slice()).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    return Err(PipeError::RelayReadFailed {
                        transferred: total,
                        source: Box::new(e),
                    })
                }
            };
            let chunk = &buffer.as_slice()[..n];

            match self.mode {
                WriteMode::Legacy => {
                    let written = sink.write(chunk).await.map_err(|e| write_failed(total, e))?;
                    if written < n {
                        tracing::warn!(
                            "Sink accepted {} of {} bytes, dropping {}",
                            written,
                            n,
                            n - written
                        );
                    }
                    total += written as u64;
                }
                WriteMode::Strict => {
                    let mut offset = 0;
                    while offset < n {
                        let written = sink
                            .write(&chunk[offset..])
                            .await
                            .map_err(|e| write_failed(total, e))?;
                        if written == 0 {
                            return Err(write_failed(
                                total,
                                PipeError::Io(io::Error::new(
                                    io::ErrorKind::WriteZero,
                                    "sink accepted no bytes",
                                )),
                            ));
                        }
                        offset += written;
                        total += written as u64;
                    }
                }
            }
        }

        tracing::debug!("Relay reached end-of-stream after {} bytes", total);
        Ok(total)
    }
}

fn write_failed(transferred: u64, source: PipeError) -> PipeError {
    PipeError::RelayWriteFailed {
        transferred,
        source: Box::new(source),
    }
}
