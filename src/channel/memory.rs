//! In-memory loopback channel.

use bytes::{Buf, Bytes, BytesMut};

use super::ByteChannel;
use crate::endpoint::AccessMode;
use crate::error::{PipeError, Result};

/// Loopback [`ByteChannel`]: reads drain a fixed payload, writes append to
/// an internal buffer.
///
/// The transaction flow uses it to feed a response into the relay as a
/// single source chunk, and to collect a request from a file.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    input: Bytes,
    output: BytesMut,
    closed: bool,
}

impl MemoryChannel {
    /// Empty channel; reads report end-of-stream immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel whose reads yield `data` and then end-of-stream.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            input: data.into(),
            ..Self::default()
        }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.output
    }

    /// Take ownership of everything written.
    pub fn into_written(self) -> Bytes {
        self.output.freeze()
    }
}

impl ByteChannel for MemoryChannel {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(PipeError::Closed);
        }
        let n = buf.len().min(self.input.len());
        buf[..n].copy_from_slice(&self.input[..n]);
        self.input.advance(n);
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(PipeError::Closed);
        }
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn access(&self) -> AccessMode {
        AccessMode::Duplex
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
