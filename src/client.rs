//! Pipe client: transactional calls and stream sessions.
//!
//! [`PipeClient::call`] performs one send-then-receive exchange and returns
//! the raw response. [`PipeClient::open`] connects and hands the connection
//! back as a [`Session`] for relaying.
//!
//! Both wait for the endpoint according to the configured [`WaitTimeout`]:
//! an endpoint that does not exist fails at once, a busy one is retried
//! until the wait expires.
//!
//! # Example
//!
//! ```ignore
//! use npipe_session::{Endpoint, PipeClient, SessionConfig};
//!
//! let client = PipeClient::new(SessionConfig::default());
//! let target = Endpoint::parse(r"\\.\pipe\test1")?;
//! let response = client.call(&target, b"PING").await?;
//! assert_eq!(&response[..], b"PONG");
//! ```

use bytes::Bytes;

use crate::config::{SessionConfig, WaitTimeout};
use crate::endpoint::{AccessMode, Endpoint};
use crate::error::{PipeError, Result};
use crate::session::Session;
use crate::transport::{self, PipeStream};

/// Client side of a pipe endpoint.
#[derive(Debug, Clone, Default)]
pub struct PipeClient {
    config: SessionConfig,
}

impl PipeClient {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Call `endpoint` with the configured buffer size and wait.
    pub async fn call(&self, endpoint: &Endpoint, request: &[u8]) -> Result<Bytes> {
        self.call_with(endpoint, request, self.config.buffer_size, self.config.wait)
            .await
    }

    /// Send `request` and return at most `buffer_size` bytes of response.
    ///
    /// An empty request is still sent. A response longer than `buffer_size`
    /// is truncated without error.
    ///
    /// On Unix the request is followed by a half-close, and the response is
    /// read until the server closes its end of the connection or
    /// `buffer_size` bytes have arrived. A server that replies and then
    /// keeps the connection open blocks this call until it closes or fills
    /// the buffer. On Windows the response is the result of a single read.
    pub async fn call_with(
        &self,
        endpoint: &Endpoint,
        request: &[u8],
        buffer_size: usize,
        wait: WaitTimeout,
    ) -> Result<Bytes> {
        if buffer_size == 0 {
            return Err(PipeError::invalid("buffer size must be greater than zero"));
        }

        let stream = self.wait_for(endpoint, AccessMode::Duplex, wait).await?;
        tracing::debug!("Calling {} with {} bytes", endpoint, request.len());

        let response = stream
            .transact(request, buffer_size)
            .await
            .map_err(|source| PipeError::TransactionFailed {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if response.len() == buffer_size {
            tracing::debug!(
                "Response from {} filled the {}-byte buffer and may be truncated",
                endpoint,
                buffer_size
            );
        }
        Ok(response)
    }

    /// Connect to `endpoint` as a stream and return the session.
    ///
    /// Directions not permitted by `access` are released immediately.
    pub async fn open(&self, endpoint: &Endpoint, access: AccessMode) -> Result<Session> {
        self.config.validate()?;
        let stream = self.wait_for(endpoint, access, self.config.wait).await?;
        Session::new(endpoint.clone(), access, stream, self.config.buffer_size)
    }

    async fn wait_for(
        &self,
        endpoint: &Endpoint,
        access: AccessMode,
        wait: WaitTimeout,
    ) -> Result<PipeStream> {
        tracing::debug!("Connecting to {} (wait {:?})", endpoint, wait);
        transport::connect(endpoint, access, wait, &self.config.namespace_dir)
            .await
            .map_err(|source| PipeError::EndpointUnavailable {
                endpoint: endpoint.to_string(),
                source,
            })
    }
}
