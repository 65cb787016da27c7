//! Channel over tokio `AsyncRead`/`AsyncWrite` halves.
//!
//! Pipe sessions split their connection into a read half and a write half,
//! each wrapped in its own `IoChannel`; files are wrapped the same way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::ByteChannel;
use crate::endpoint::AccessMode;
use crate::error::{PipeError, Result};

/// Boxed read half.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// [`ByteChannel`] backed by tokio I/O objects.
pub struct IoChannel {
    /// Human-readable origin (path or endpoint) for logs.
    label: String,
    access: AccessMode,
    reader: Option<BoxedReader>,
    writer: Option<BoxedWriter>,
    closed: bool,
    /// Shared byte counter, incremented on every successful transfer.
    counter: Option<Arc<AtomicU64>>,
}

impl IoChannel {
    /// Read-only channel.
    pub fn reader<R>(label: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::from_parts(label.into(), AccessMode::ReadOnly, Some(Box::new(reader)), None)
    }

    /// Write-only channel.
    pub fn writer<W>(label: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_parts(label.into(), AccessMode::WriteOnly, None, Some(Box::new(writer)))
    }

    /// Channel permitting both directions.
    pub fn duplex<R, W>(label: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_parts(
            label.into(),
            AccessMode::Duplex,
            Some(Box::new(reader)),
            Some(Box::new(writer)),
        )
    }

    pub(crate) fn from_boxed_reader(label: impl Into<String>, reader: BoxedReader) -> Self {
        Self::from_parts(label.into(), AccessMode::ReadOnly, Some(reader), None)
    }

    pub(crate) fn from_boxed_writer(label: impl Into<String>, writer: BoxedWriter) -> Self {
        Self::from_parts(label.into(), AccessMode::WriteOnly, None, Some(writer))
    }

    fn from_parts(
        label: String,
        access: AccessMode,
        reader: Option<BoxedReader>,
        writer: Option<BoxedWriter>,
    ) -> Self {
        debug_assert_eq!(reader.is_some(), access.can_read());
        debug_assert_eq!(writer.is_some(), access.can_write());
        Self {
            label,
            access,
            reader,
            writer,
            closed: false,
            counter: None,
        }
    }

    /// Count transferred bytes into `counter`.
    pub fn with_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    fn record(&self, n: usize) {
        if let Some(counter) = &self.counter {
            counter.fetch_add(n as u64, Ordering::AcqRel);
        }
    }
}

impl ByteChannel for IoChannel {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(PipeError::Closed);
        }
        let access = self.access;
        let reader = self.reader.as_mut().ok_or(PipeError::AccessDenied {
            op: "read",
            access,
        })?;
        let n = reader.read(buf).await?;
        self.record(n);
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(PipeError::Closed);
        }
        let access = self.access;
        let writer = self.writer.as_mut().ok_or(PipeError::AccessDenied {
            op: "write",
            access,
        })?;
        let n = writer.write(buf).await?;
        self.record(n);
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader = None;

        if let Some(mut writer) = self.writer.take() {
            // Flushes files; half-closes sockets so the peer sees end-of-stream.
            match writer.shutdown().await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {
                    tracing::debug!("{}: peer already gone at close", self.label);
                }
                Err(e) => return Err(PipeError::Io(e)),
            }
        }
        tracing::debug!("Closed channel {}", self.label);
        Ok(())
    }

    fn access(&self) -> AccessMode {
        self.access
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for IoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoChannel")
            .field("label", &self.label)
            .field("access", &self.access)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_until_end_of_stream() {
        let mut channel = IoChannel::reader("cursor", Cursor::new(b"hello".to_vec()));
        let mut buf = [0u8; 3];

        assert_eq!(channel.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(channel.read(&mut buf).await.unwrap(), 2);
        assert_eq!(channel.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wrong_direction_is_rejected() {
        let mut reader = IoChannel::reader("r", Cursor::new(Vec::new()));
        let err = reader.write(b"x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);

        let (a, _b) = duplex(64);
        let mut writer = IoChannel::writer("w", a);
        let mut buf = [0u8; 4];
        let err = writer.read(&mut buf).await.unwrap_err();
        assert!(matches!(
            err,
            PipeError::AccessDenied {
                op: "read",
                access: AccessMode::WriteOnly
            }
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (a, b) = duplex(64);
        let mut channel = IoChannel::duplex("d", b, a);

        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert!(channel.is_closed());

        let mut buf = [0u8; 4];
        assert_eq!(
            channel.read(&mut buf).await.unwrap_err().kind(),
            ErrorKind::Closed
        );
        assert_eq!(channel.write(b"x").await.unwrap_err().kind(), ErrorKind::Closed);
    }

    #[tokio::test]
    async fn test_close_signals_end_of_stream_to_peer() {
        let (near, far) = duplex(64);
        let (far_read, _far_write) = tokio::io::split(far);
        let mut writer = IoChannel::writer("near", near);
        let mut peer = IoChannel::reader("far", far_read);

        assert_eq!(writer.write(b"bye").await.unwrap(), 3);
        writer.close().await.unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).await.unwrap(), 3);
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counter_tracks_both_directions() {
        let counter = Arc::new(AtomicU64::new(0));
        let (a, b) = duplex(64);
        let (b_read, b_write) = tokio::io::split(b);
        let mut near = IoChannel::duplex("near", Cursor::new(b"abcd".to_vec()), a)
            .with_counter(counter.clone());
        let _far = (b_read, b_write);

        let mut buf = [0u8; 8];
        let n = near.read(&mut buf).await.unwrap();
        near.write(&buf[..n]).await.unwrap();

        assert_eq!(counter.load(Ordering::Acquire), 8);
    }

    #[tokio::test]
    async fn test_constructors_report_their_access() {
        let (a, b) = duplex(64);
        let (c, d) = duplex(64);
        let (e, f) = duplex(64);

        assert_eq!(IoChannel::reader("r", a).access(), AccessMode::ReadOnly);
        assert_eq!(IoChannel::writer("w", b).access(), AccessMode::WriteOnly);
        assert_eq!(IoChannel::duplex("d", c, d).access(), AccessMode::Duplex);
        assert_eq!(
            IoChannel::from_boxed_reader("br", Box::new(e)).access(),
            AccessMode::ReadOnly
        );
        assert_eq!(
            IoChannel::from_boxed_writer("bw", Box::new(f)).access(),
            AccessMode::WriteOnly
        );
    }
}
