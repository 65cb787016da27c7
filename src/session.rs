//! Connected pipe session.
//!
//! A [`Session`] is the live state of one connected endpoint: the split
//! connection, the transfer buffer allocated for it, and a cumulative byte
//! counter. It is produced by [`PipeServer::accept_one`] and
//! [`PipeClient::open`], and releases the connection when closed or dropped.
//!
//! [`PipeServer::accept_one`]: crate::server::PipeServer::accept_one
//! [`PipeClient::open`]: crate::client::PipeClient::open

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::channel::{ByteChannel, IoChannel, TransferBuffer};
use crate::endpoint::{AccessMode, Endpoint};
use crate::error::{PipeError, Result};
use crate::transport::PipeStream;

/// Live state bound to one connected endpoint.
pub struct Session {
    endpoint: Endpoint,
    access: AccessMode,
    /// Present only when `access` permits reading.
    reader: Option<IoChannel>,
    /// Present only when `access` permits writing.
    writer: Option<IoChannel>,
    buffer: TransferBuffer,
    transferred: Arc<AtomicU64>,
    closed: bool,
}

/// Borrowed view of a session's channels and buffer for one relay.
///
/// Each side can be taken once.
#[derive(Debug)]
pub struct SessionChannels<'a> {
    reader: Option<&'a mut IoChannel>,
    writer: Option<&'a mut IoChannel>,
    access: AccessMode,
    pub buffer: &'a mut TransferBuffer,
}

impl<'a> SessionChannels<'a> {
    /// The pipe as a source.
    pub fn reader(&mut self) -> Result<&'a mut IoChannel> {
        self.reader.take().ok_or(PipeError::AccessDenied {
            op: "read",
            access: self.access,
        })
    }

    /// The pipe as a sink.
    pub fn writer(&mut self) -> Result<&'a mut IoChannel> {
        self.writer.take().ok_or(PipeError::AccessDenied {
            op: "write",
            access: self.access,
        })
    }
}

impl Session {
    /// Bind a connected stream, keeping only the directions `access` permits.
    pub(crate) fn new(
        endpoint: Endpoint,
        access: AccessMode,
        stream: PipeStream,
        buffer_size: usize,
    ) -> Result<Self> {
        let buffer = TransferBuffer::new(buffer_size)?;
        let transferred = Arc::new(AtomicU64::new(0));
        let label = endpoint.to_string();

        let (read_half, write_half) = stream.into_split();
        let reader = access.can_read().then(|| {
            IoChannel::from_boxed_reader(label.clone(), read_half).with_counter(transferred.clone())
        });
        let writer = access.can_write().then(|| {
            IoChannel::from_boxed_writer(label, write_half).with_counter(transferred.clone())
        });

        tracing::debug!("Session on {} opened ({})", endpoint, access);

        Ok(Self {
            endpoint,
            access,
            reader,
            writer,
            buffer,
            transferred,
            closed: false,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.capacity()
    }

    /// Bytes read plus bytes written through this session so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Borrow the pipe sides and the transfer buffer.
    ///
    /// Fails with `Closed` once the session has been closed.
    pub fn channels(&mut self) -> Result<SessionChannels<'_>> {
        if self.closed {
            return Err(PipeError::Closed);
        }
        Ok(SessionChannels {
            reader: self.reader.as_mut(),
            writer: self.writer.as_mut(),
            access: self.access,
            buffer: &mut self.buffer,
        })
    }

    /// Close both sides. The write side is shut down first so the peer sees
    /// end-of-stream. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_err = None;
        for channel in [self.writer.as_mut(), self.reader.as_mut()].into_iter().flatten() {
            if let Err(e) = channel.close().await {
                tracing::warn!("Error closing session side on {}: {}", self.endpoint, e);
                first_err.get_or_insert(e);
            }
        }

        tracing::debug!(
            "Session on {} closed after {} bytes",
            self.endpoint,
            self.bytes_transferred()
        );
        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint.to_string())
            .field("access", &self.access)
            .field("buffer_size", &self.buffer.capacity())
            .field("transferred", &self.bytes_transferred())
            .field("closed", &self.closed)
            .finish()
    }
}
