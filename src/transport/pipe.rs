//! Platform-specific pipe implementation.
//!
//! - Unix: Unix Domain Socket placed in the namespace directory
//! - Windows: Named Pipe
//!
//! # Example
//!
//! ```ignore
//! use npipe_session::transport::{connect, ListenOptions, PipeListener};
//!
//! let mut listener = PipeListener::bind(&endpoint, &options, &namespace_dir).await?;
//! let (stream, peer) = listener.accept().await?;
//! ```

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::channel::{BoxedReader, BoxedWriter};
use crate::config::WaitTimeout;
use crate::endpoint::{AccessMode, Endpoint, PipeMode};

/// Pause between attempts while every instance of an endpoint is busy.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Capabilities requested when creating an endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ListenOptions {
    pub access: AccessMode,
    pub mode: PipeMode,
    pub buffer_size: usize,
}

/// Generate a unique pipe name for this process.
///
/// Format: `{prefix}-{pid}-{random}`
pub fn generate_pipe_name(prefix: &str) -> String {
    format!("{}-{}-{:x}", prefix, std::process::id(), rand_u64())
}

/// Simple random u64 using system time and process ID.
fn rand_u64() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static SEQ: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let pid = std::process::id() as u64;
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    (nanos ^ seq.rotate_left(32)).wrapping_mul(0x517cc1b727220a95) ^ pid
}

/// Connect to `endpoint`, waiting while the endpoint exists but is busy.
///
/// A missing endpoint fails immediately. `WaitTimeout::Forever` keeps
/// retrying a busy endpoint indefinitely.
pub async fn connect(
    endpoint: &Endpoint,
    access: AccessMode,
    wait: WaitTimeout,
    namespace_dir: &Path,
) -> io::Result<PipeStream> {
    let deadline = wait.deadline_from(Instant::now());

    loop {
        match connect_once(endpoint, access, namespace_dir).await {
            Ok(stream) => return Ok(stream),
            Err(e) if is_busy(&e) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no instance of {} became available", endpoint),
                    ));
                }
                tracing::trace!("{} busy, retrying", endpoint);
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use crate::endpoint::PipeKind;
    use fs2::FileExt;
    use std::fs::{File, OpenOptions};
    use std::net::Shutdown;
    use std::path::PathBuf;
    use tokio::net::{UnixListener, UnixStream};

    /// Attempts at taking the name lock before giving up with `AddrInUse`.
    /// Clients hold a shared lock for an instant while checking ownership.
    const LOCK_ATTEMPTS: u32 = 3;
    const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);

    /// Socket path of a local endpoint.
    pub fn socket_path(endpoint: &Endpoint, namespace_dir: &Path) -> PathBuf {
        namespace_dir.join(endpoint.name())
    }

    /// Lock file that marks the owner of an endpoint name.
    ///
    /// It is left in place after the owner goes away; only the lock on it
    /// carries meaning.
    pub fn lock_path(endpoint: &Endpoint, namespace_dir: &Path) -> PathBuf {
        namespace_dir.join(format!(".{}.lock", endpoint.name()))
    }

    pub(super) fn is_busy(e: &io::Error) -> bool {
        // Listener backlog full, or the owner already serves its peer.
        e.kind() == io::ErrorKind::WouldBlock
    }

    fn is_contended(e: &io::Error) -> bool {
        e.kind() == fs2::lock_contended_error().kind()
    }

    /// Whether a live listener holds the name lock at `path`.
    fn name_owned(path: &Path) -> bool {
        match File::open(path) {
            Ok(file) => matches!(FileExt::try_lock_shared(&file), Err(e) if is_contended(&e)),
            Err(_) => false,
        }
    }

    async fn lock_name(endpoint: &Endpoint, namespace_dir: &Path) -> io::Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(endpoint, namespace_dir))?;

        let mut attempt = 1;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(file),
                Err(e) if !is_contended(&e) => return Err(e),
                Err(_) if attempt < LOCK_ATTEMPTS => {
                    attempt += 1;
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("{} is owned by a live listener", endpoint),
                    ))
                }
            }
        }
    }

    pub(super) async fn connect_once(
        endpoint: &Endpoint,
        _access: AccessMode,
        namespace_dir: &Path,
    ) -> io::Result<PipeStream> {
        if !endpoint.is_local() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("remote server {} is not reachable from this platform", endpoint.server()),
            ));
        }
        match UnixStream::connect(socket_path(endpoint, namespace_dir)).await {
            Ok(stream) => Ok(PipeStream { stream }),
            Err(e)
                if e.kind() == io::ErrorKind::ConnectionRefused
                    && name_owned(&lock_path(endpoint, namespace_dir)) =>
            {
                Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("{} is serving another peer", endpoint),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Unix Domain Socket listener.
    ///
    /// The name lock is held for the listener's whole life. The socket
    /// itself stops accepting after the first peer, so later clients are
    /// refused and see the endpoint as busy.
    pub struct PipeListener {
        listener: Option<UnixListener>,
        path: PathBuf,
        _lock: File,
    }

    /// Unix Domain Socket stream (connected).
    pub struct PipeStream {
        stream: UnixStream,
    }

    /// Server-side hold on an accepted connection, independent of the
    /// stream halves handed to the session.
    pub struct PeerHandle {
        stream: std::os::unix::net::UnixStream,
    }

    impl PipeListener {
        /// Bind to the socket path of a local endpoint.
        ///
        /// Ownership is decided by the name lock: a held lock fails with
        /// `AddrInUse`, otherwise any leftover socket file is stale and is
        /// replaced.
        pub async fn bind(
            endpoint: &Endpoint,
            options: &ListenOptions,
            namespace_dir: &Path,
        ) -> io::Result<Self> {
            if options.mode.pipe_type == PipeKind::Message
                || options.mode.read_mode == PipeKind::Message
            {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "message pipes are not supported on this platform",
                ));
            }

            std::fs::create_dir_all(namespace_dir)?;
            let lock = lock_name(endpoint, namespace_dir).await?;
            let path = socket_path(endpoint, namespace_dir);

            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed stale endpoint {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }

            let listener = UnixListener::bind(&path)?;

            Ok(Self {
                listener: Some(listener),
                path,
                _lock: lock,
            })
        }

        /// Accept the single peer. Later calls fail with `NotConnected`.
        pub async fn accept(&mut self) -> io::Result<(PipeStream, PeerHandle)> {
            let listener = self.listener.as_ref().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "endpoint already has its peer")
            })?;
            let (stream, _addr) = listener.accept().await?;
            self.listener = None;

            let stream = stream.into_std()?;
            let peer = PeerHandle {
                stream: stream.try_clone()?,
            };
            let stream = UnixStream::from_std(stream)?;
            Ok((PipeStream { stream }, peer))
        }

        /// Get the socket path.
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            // Remove the socket before the lock field is released
            let _ = std::fs::remove_file(&self.path);
        }
    }

    impl PeerHandle {
        /// Tear the connection down in both directions. The peer reads
        /// end-of-stream; the session's halves stop working.
        pub fn disconnect(&self) -> io::Result<()> {
            match self.stream.shutdown(Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                Err(e) => Err(e),
            }
        }
    }

    impl PipeStream {
        /// Split into boxed read and write halves.
        ///
        /// Shutting down the write half signals end-of-stream to the peer.
        pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
            let (reader, writer) = self.stream.into_split();
            (Box::new(reader), Box::new(writer))
        }

        /// Send `request`, half-close, then collect up to `buffer_size`
        /// response bytes or until the peer closes.
        pub async fn transact(self, request: &[u8], buffer_size: usize) -> io::Result<Bytes> {
            let mut stream = self.stream;
            stream.write_all(request).await?;
            match stream.shutdown().await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e),
            }

            let mut response = BytesMut::zeroed(buffer_size);
            let mut filled = 0;
            while filled < buffer_size {
                let n = stream.read(&mut response[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            response.truncate(filled);
            Ok(response.freeze())
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use crate::endpoint::PipeKind;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{ready, Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, PipeMode as NpMode, ServerOptions,
    };

    /// All pipe instances are busy.
    const ERROR_PIPE_BUSY: i32 = 231;

    pub(super) fn is_busy(e: &io::Error) -> bool {
        e.raw_os_error() == Some(ERROR_PIPE_BUSY)
    }

    pub(super) async fn connect_once(
        endpoint: &Endpoint,
        access: AccessMode,
        _namespace_dir: &Path,
    ) -> io::Result<PipeStream> {
        let client = ClientOptions::new()
            .read(access.can_read())
            .write(access.can_write())
            .open(endpoint.to_string())?;
        Ok(PipeStream::Client(client))
    }

    /// Windows Named Pipe listener.
    pub struct PipeListener {
        server: Option<NamedPipeServer>,
        path: String,
    }

    /// Windows Named Pipe stream (connected).
    pub enum PipeStream {
        Server(SharedPipe),
        Client(NamedPipeClient),
    }

    /// Server-side hold on the connected pipe instance.
    pub struct PeerHandle {
        pipe: Arc<NamedPipeServer>,
    }

    /// Server pipe instance shared between the session and its
    /// [`PeerHandle`].
    pub struct SharedPipe(Arc<NamedPipeServer>);

    impl AsyncRead for SharedPipe {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            loop {
                ready!(self.0.poll_read_ready(cx))?;
                match self.0.try_read(buf.initialize_unfilled()) {
                    Ok(n) => {
                        buf.advance(n);
                        return Poll::Ready(Ok(()));
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Poll::Ready(Err(e)),
                }
            }
        }
    }

    impl AsyncWrite for SharedPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            loop {
                ready!(self.0.poll_write_ready(cx))?;
                match self.0.try_write(buf) {
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    result => return Poll::Ready(result),
                }
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl PeerHandle {
        /// Disconnect the server end of the pipe instance.
        pub fn disconnect(&self) -> io::Result<()> {
            self.pipe.disconnect()
        }
    }

    impl PipeListener {
        /// Create the first (and only) instance of a Named Pipe.
        pub async fn bind(
            endpoint: &Endpoint,
            options: &ListenOptions,
            _namespace_dir: &Path,
        ) -> io::Result<Self> {
            let path = endpoint.to_string();
            let buffer_size = u32::try_from(options.buffer_size).unwrap_or(u32::MAX);
            let server = ServerOptions::new()
                .first_pipe_instance(true)
                .max_instances(1)
                .access_inbound(options.access.can_read())
                .access_outbound(options.access.can_write())
                .pipe_mode(match options.mode.pipe_type {
                    PipeKind::Byte => NpMode::Byte,
                    PipeKind::Message => NpMode::Message,
                })
                .in_buffer_size(buffer_size)
                .out_buffer_size(buffer_size)
                .create(&path)?;

            Ok(Self {
                server: Some(server),
                path,
            })
        }

        /// Wait for the peer of the single pipe instance.
        pub async fn accept(&mut self) -> io::Result<(PipeStream, PeerHandle)> {
            let server = self.server.take().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "pipe instance already used")
            })?;
            server.connect().await?;

            let pipe = Arc::new(server);
            let peer = PeerHandle { pipe: Arc::clone(&pipe) };
            Ok((PipeStream::Server(SharedPipe(pipe)), peer))
        }

        /// Get the pipe path.
        pub fn path(&self) -> &Path {
            Path::new(&self.path)
        }
    }

    impl PipeStream {
        /// Split into boxed read and write halves.
        pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
            match self {
                PipeStream::Server(pipe) => {
                    let (reader, writer) = tokio::io::split(pipe);
                    (Box::new(reader), Box::new(writer))
                }
                PipeStream::Client(pipe) => {
                    let (reader, writer) = tokio::io::split(pipe);
                    (Box::new(reader), Box::new(writer))
                }
            }
        }

        /// Send `request`, then take a single read of at most `buffer_size`
        /// bytes. Named pipes have no half-close, so the reply is whatever
        /// the server wrote in one piece.
        pub async fn transact(self, request: &[u8], buffer_size: usize) -> io::Result<Bytes> {
            match self {
                PipeStream::Server(pipe) => exchange(pipe, request, buffer_size).await,
                PipeStream::Client(pipe) => exchange(pipe, request, buffer_size).await,
            }
        }
    }

    async fn exchange<S>(mut pipe: S, request: &[u8], buffer_size: usize) -> io::Result<Bytes>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        pipe.write_all(request).await?;
        pipe.flush().await?;
        let mut response = BytesMut::zeroed(buffer_size);
        let n = pipe.read(&mut response).await?;
        response.truncate(n);
        Ok(response.freeze())
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::{lock_path, socket_path, PeerHandle, PipeListener, PipeStream};
#[cfg(unix)]
use unix_impl::{connect_once, is_busy};

#[cfg(windows)]
pub use windows_impl::{PeerHandle, PipeListener, PipeStream};
#[cfg(windows)]
use windows_impl::{connect_once, is_busy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_pipe_name_format() {
        let name = generate_pipe_name("npipe");
        assert!(name.starts_with("npipe-"));
        assert!(Endpoint::local(&name).is_ok());
    }

    #[test]
    fn test_generate_pipe_name_uniqueness() {
        let names: Vec<String> = (0..10).map(|_| generate_pipe_name("u")).collect();

        for (i, n1) in names.iter().enumerate() {
            for (j, n2) in names.iter().enumerate() {
                if i != j {
                    assert_ne!(n1, n2, "Names should be unique");
                }
            }
        }
    }

    #[test]
    fn test_pipe_name_contains_pid() {
        let name = generate_pipe_name("p");
        let pid = std::process::id().to_string();
        assert!(name.contains(&pid), "Name should contain PID");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_missing_endpoint_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::local("nobody-home").unwrap();

        let started = Instant::now();
        let err = connect(&endpoint, AccessMode::Duplex, WaitTimeout::Forever, dir.path())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bind_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::local("stale").unwrap();
        let options = ListenOptions {
            access: AccessMode::Duplex,
            mode: PipeMode::byte(),
            buffer_size: 1024,
        };

        // Leave a socket file behind without a listener.
        let path = socket_path(&endpoint, dir.path());
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = PipeListener::bind(&endpoint, &options, dir.path()).await.unwrap();
        assert_eq!(listener.path(), path.as_path());

        let err = PipeListener::bind(&endpoint, &options, dir.path())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);

        drop(listener);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transact_truncates_to_buffer_size() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::local("truncate").unwrap();
        let options = ListenOptions {
            access: AccessMode::Duplex,
            mode: PipeMode::byte(),
            buffer_size: 1024,
        };
        let mut listener = PipeListener::bind(&endpoint, &options, dir.path()).await.unwrap();

        let server = tokio::spawn(async move {
            let (stream, _peer) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let mut request = Vec::new();
            reader.read_to_end(&mut request).await.unwrap();
            assert_eq!(request, b"hi");
            // Peer may hang up after its buffer fills.
            let _ = writer.write_all(b"0123456789").await;
        });

        let stream = connect(&endpoint, AccessMode::Duplex, WaitTimeout::Forever, dir.path())
            .await
            .unwrap();
        let response = stream.transact(b"hi", 4).await.unwrap();
        assert_eq!(&response[..], b"0123");
        server.await.unwrap();
    }

    #[cfg(unix)]
    fn byte_options() -> ListenOptions {
        ListenOptions {
            access: AccessMode::Duplex,
            mode: PipeMode::byte(),
            buffer_size: 1024,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_bind_leaves_no_pending_connection() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::local("owned").unwrap();
        let mut listener = PipeListener::bind(&endpoint, &byte_options(), dir.path())
            .await
            .unwrap();

        let err = PipeListener::bind(&endpoint, &byte_options(), dir.path())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);

        // The owner must not have been handed a connection by the attempt.
        let pending = tokio::time::timeout(Duration::from_millis(50), listener.accept()).await;
        assert!(pending.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_serviced_endpoint_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::local("single").unwrap();
        let mut listener = PipeListener::bind(&endpoint, &byte_options(), dir.path())
            .await
            .unwrap();

        let first = connect(&endpoint, AccessMode::Duplex, WaitTimeout::Forever, dir.path())
            .await
            .unwrap();
        let (_stream, _peer) = listener.accept().await.unwrap();

        let started = Instant::now();
        let err = connect(
            &endpoint,
            AccessMode::Duplex,
            WaitTimeout::from_millis(100),
            dir.path(),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(2));

        let err = listener.accept().await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        drop(first);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ownerless_socket_refused_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::local("abandoned").unwrap();
        let path = socket_path(&endpoint, dir.path());
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());

        let started = Instant::now();
        let err = connect(&endpoint, AccessMode::Duplex, WaitTimeout::Forever, dir.path())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_peer_handle_disconnects_client() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::local("hangup").unwrap();
        let mut listener = PipeListener::bind(&endpoint, &byte_options(), dir.path())
            .await
            .unwrap();

        let client = connect(&endpoint, AccessMode::Duplex, WaitTimeout::Forever, dir.path())
            .await
            .unwrap();
        let (_stream, peer) = listener.accept().await.unwrap();
        peer.disconnect().unwrap();
        // A second disconnect is harmless.
        peer.disconnect().unwrap();

        let (mut reader, _writer) = client.into_split();
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(1), reader.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }
}
