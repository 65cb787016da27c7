//! Single-connection pipe server.
//!
//! A [`PipeServer`] owns one endpoint and services exactly one peer:
//!
//! ```text
//! Created --accept_one ok--> Connected --close--> Closed
//! Created --accept_one err-> Closed
//! ```
//!
//! After the accepted [`Session`] ends the server is exhausted; serving
//! another peer means creating another server. While connected the
//! endpoint reports busy to other clients. Closing (or dropping) the server
//! disconnects the peer and releases the endpoint.
//!
//! # Example
//!
//! ```ignore
//! use npipe_session::{AccessMode, Endpoint, PipeMode, PipeServer, SessionConfig};
//!
//! let endpoint = Endpoint::local("test1")?;
//! let mut server = PipeServer::create(&endpoint, AccessMode::Duplex, PipeMode::byte(), &config).await?;
//! let mut session = server.accept_one().await?;
//! // ... relay through session.channels()? ...
//! session.close().await?;
//! server.close();
//! ```

use std::io;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::endpoint::{AccessMode, Endpoint, PipeMode, WaitMode};
use crate::error::{PipeError, Result};
use crate::session::Session;
use crate::transport::{ListenOptions, PeerHandle, PipeListener};

/// Externally visible server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Created,
    Connected,
    Closed,
}

enum ServerState {
    Created(PipeListener),
    /// The listener is kept so the name stays owned for the session.
    Connected(PipeListener, PeerHandle),
    Closed,
}

/// Pipe endpoint servicing a single connection.
pub struct PipeServer {
    endpoint: Endpoint,
    options: ListenOptions,
    state: ServerState,
}

impl PipeServer {
    /// Create the endpoint with the requested capabilities.
    ///
    /// Fails with `CreateFailed` when the endpoint is remote, already owned,
    /// or the mode combination is invalid.
    pub async fn create(
        endpoint: &Endpoint,
        access: AccessMode,
        mode: PipeMode,
        config: &SessionConfig,
    ) -> Result<Self> {
        config.validate()?;

        let create_failed = |source: io::Error| PipeError::CreateFailed {
            endpoint: endpoint.to_string(),
            source,
        };

        if !endpoint.is_local() {
            return Err(create_failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                "pipe servers can only be created on the local machine",
            )));
        }
        mode.validate()
            .map_err(|msg| create_failed(io::Error::new(io::ErrorKind::InvalidInput, msg)))?;

        let options = ListenOptions {
            access,
            mode,
            buffer_size: config.buffer_size,
        };
        let listener = PipeListener::bind(endpoint, &options, &config.namespace_dir)
            .await
            .map_err(create_failed)?;

        tracing::debug!("Created endpoint {} ({}, {:?})", endpoint, access, mode);

        Ok(Self {
            endpoint: endpoint.clone(),
            options,
            state: ServerState::Created(listener),
        })
    }

    /// Wait for exactly one peer and return its session.
    ///
    /// With a non-blocking pipe mode this fails immediately when no peer is
    /// pending. Any failure leaves the server closed.
    pub async fn accept_one(&mut self) -> Result<Session> {
        let connect_failed = |endpoint: &Endpoint, source: io::Error| PipeError::ConnectFailed {
            endpoint: endpoint.to_string(),
            source,
        };

        let mut listener = match std::mem::replace(&mut self.state, ServerState::Closed) {
            ServerState::Created(listener) => listener,
            ServerState::Connected(listener, peer) => {
                self.state = ServerState::Connected(listener, peer);
                return Err(connect_failed(
                    &self.endpoint,
                    io::Error::new(io::ErrorKind::Other, "endpoint already serviced its peer"),
                ));
            }
            ServerState::Closed => {
                return Err(connect_failed(
                    &self.endpoint,
                    io::Error::new(io::ErrorKind::NotConnected, "endpoint is closed"),
                ));
            }
        };

        tracing::debug!("Waiting for a peer on {}", self.endpoint);
        let accepted = match self.options.mode.wait {
            WaitMode::Blocking => listener.accept().await,
            WaitMode::NonBlocking => tokio::time::timeout(Duration::ZERO, listener.accept())
                .await
                .unwrap_or_else(|_| {
                    Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "no peer is waiting to connect",
                    ))
                }),
        };

        match accepted {
            Ok((stream, peer)) => {
                self.state = ServerState::Connected(listener, peer);
                tracing::debug!("Peer connected on {}", self.endpoint);
                Session::new(
                    self.endpoint.clone(),
                    self.options.access,
                    stream,
                    self.options.buffer_size,
                )
            }
            Err(source) => {
                drop(listener);
                Err(connect_failed(&self.endpoint, source))
            }
        }
    }

    /// Disconnect the peer, if any, and release the endpoint. Safe to call
    /// in any state, any number of times.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, ServerState::Closed) {
            ServerState::Closed => {}
            ServerState::Created(listener) => {
                tracing::debug!("Releasing endpoint {}", self.endpoint);
                drop(listener);
            }
            ServerState::Connected(listener, peer) => {
                tracing::debug!("Disconnecting peer and releasing endpoint {}", self.endpoint);
                if let Err(e) = peer.disconnect() {
                    tracing::warn!("Failed to disconnect peer on {}: {}", self.endpoint, e);
                }
                drop(peer);
                drop(listener);
            }
        }
    }

    pub fn phase(&self) -> ServerPhase {
        match self.state {
            ServerState::Created(_) => ServerPhase::Created,
            ServerState::Connected(..) => ServerPhase::Connected,
            ServerState::Closed => ServerPhase::Closed,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for PipeServer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PipeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeServer")
            .field("endpoint", &self.endpoint.to_string())
            .field("access", &self.options.access)
            .field("phase", &self.phase())
            .finish()
    }
}
