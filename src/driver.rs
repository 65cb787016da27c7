//! Session driver: the supported flows end to end.
//!
//! - **Transaction**: optional file supplies the request, one
//!   [`PipeClient::call`], response to a file or back to the caller.
//! - **Server relay**: [`PipeServer::create`] + `accept_one`, then relay
//!   between the pipe and files until the input reaches end-of-stream.
//! - **Client relay**: [`PipeClient::open`], then the same relay.
//!
//! Every file, session and server a flow acquires is closed before the
//! flow returns, whichever step failed.

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::channel::{open_read, open_write, ByteChannel, IoChannel, MemoryChannel, TransferBuffer};
use crate::client::PipeClient;
use crate::config::SessionConfig;
use crate::endpoint::{AccessMode, Endpoint, PipeMode};
use crate::error::{PipeError, Result};
use crate::relay::StreamRelay;
use crate::report::Flow;
use crate::server::PipeServer;
use crate::session::Session;

/// Where a relay reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    File(PathBuf),
    /// The pipe itself.
    Pipe,
}

/// Where a relay writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    File(PathBuf),
    /// The pipe itself.
    Pipe,
}

/// Parameters of the transaction flow.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub endpoint: Endpoint,
    /// Request payload file; an empty request when absent.
    pub input: Option<PathBuf>,
    /// Response file; the response is returned in the report when absent.
    pub output: Option<PathBuf>,
}

/// Parameters shared by the relay flows.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub endpoint: Endpoint,
    pub access: AccessMode,
    pub input: Input,
    pub output: Output,
}

impl RelayRequest {
    /// Reject pipe directions the access mode forbids, before any I/O.
    fn check_directions(&self) -> Result<()> {
        if self.input == Input::Pipe && !self.access.can_read() {
            return Err(PipeError::AccessDenied {
                op: "read",
                access: self.access,
            });
        }
        if self.output == Output::Pipe && !self.access.can_write() {
            return Err(PipeError::AccessDenied {
                op: "write",
                access: self.access,
            });
        }
        Ok(())
    }
}

/// A fully parsed flow, ready to run.
#[derive(Debug, Clone)]
pub enum Plan {
    Transaction(TransactionRequest),
    Serve { relay: RelayRequest, mode: PipeMode },
    Connect(RelayRequest),
}

impl Plan {
    pub fn flow(&self) -> Flow {
        match self {
            Plan::Transaction(_) => Flow::Transaction,
            Plan::Serve { .. } => Flow::ServerRelay,
            Plan::Connect(_) => Flow::ClientRelay,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Plan::Transaction(request) => &request.endpoint,
            Plan::Serve { relay, .. } | Plan::Connect(relay) => &relay.endpoint,
        }
    }
}

/// Result of a successful flow.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub flow: Flow,
    pub endpoint: Endpoint,
    /// Bytes relayed, or the response length for a transaction without an
    /// output file.
    pub bytes: u64,
    /// Transaction response, when no output file was given.
    pub response: Option<Bytes>,
}

/// Runs flows with one shared configuration.
#[derive(Debug, Clone)]
pub struct SessionDriver {
    config: SessionConfig,
    relay: StreamRelay,
}

impl SessionDriver {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            relay: StreamRelay::new(config.write_mode),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn run(&self, plan: &Plan) -> Result<SessionReport> {
        match plan {
            Plan::Transaction(request) => self.transact(request).await,
            Plan::Serve { relay, mode } => self.serve(relay, *mode).await,
            Plan::Connect(relay) => self.connect(relay).await,
        }
    }

    /// One-shot call. The output file is only created once the call has
    /// succeeded.
    pub async fn transact(&self, request: &TransactionRequest) -> Result<SessionReport> {
        self.config.validate()?;

        let payload = match &request.input {
            Some(path) => self.read_request(path).await?,
            None => Bytes::new(),
        };
        let client = PipeClient::new(self.config.clone());
        let response = client.call(&request.endpoint, &payload).await?;

        let (bytes, response) = match &request.output {
            Some(path) => (self.write_response(path, response).await?, None),
            None => (response.len() as u64, Some(response)),
        };

        tracing::info!("Transaction on {} returned {} bytes", request.endpoint, bytes);
        Ok(SessionReport {
            flow: Flow::Transaction,
            endpoint: request.endpoint.clone(),
            bytes,
            response,
        })
    }

    /// Create the endpoint, serve one peer, relay until end-of-stream.
    pub async fn serve(&self, request: &RelayRequest, mode: PipeMode) -> Result<SessionReport> {
        self.config.validate()?;
        request.check_directions()?;

        let mut files = FileSides::open(&request.input, &request.output).await?;
        let relayed = self.serve_one(request, mode, &mut files).await;
        let bytes = files.finish(relayed).await?;

        tracing::info!("Server relay on {} moved {} bytes", request.endpoint, bytes);
        Ok(SessionReport {
            flow: Flow::ServerRelay,
            endpoint: request.endpoint.clone(),
            bytes,
            response: None,
        })
    }

    /// Connect to an existing endpoint and relay until end-of-stream.
    pub async fn connect(&self, request: &RelayRequest) -> Result<SessionReport> {
        self.config.validate()?;
        request.check_directions()?;

        let mut files = FileSides::open(&request.input, &request.output).await?;
        let client = PipeClient::new(self.config.clone());
        let relayed = match client.open(&request.endpoint, request.access).await {
            Ok(mut session) => self.run_session(&mut session, &mut files).await,
            Err(e) => Err(e),
        };
        let bytes = files.finish(relayed).await?;

        tracing::info!("Client relay on {} moved {} bytes", request.endpoint, bytes);
        Ok(SessionReport {
            flow: Flow::ClientRelay,
            endpoint: request.endpoint.clone(),
            bytes,
            response: None,
        })
    }

    async fn serve_one(
        &self,
        request: &RelayRequest,
        mode: PipeMode,
        files: &mut FileSides,
    ) -> Result<u64> {
        let mut server =
            PipeServer::create(&request.endpoint, request.access, mode, &self.config).await?;
        let relayed = match server.accept_one().await {
            Ok(mut session) => self.run_session(&mut session, files).await,
            Err(e) => Err(e),
        };
        server.close();
        relayed
    }

    /// Relay through `session`, then close it.
    async fn run_session(&self, session: &mut Session, files: &mut FileSides) -> Result<u64> {
        let relayed = self.relay_session(session, files).await;
        let closed = session.close().await;
        let bytes = relayed?;
        closed?;
        Ok(bytes)
    }

    async fn relay_session(&self, session: &mut Session, files: &mut FileSides) -> Result<u64> {
        let mut sides = session.channels()?;
        let source = match files.input.as_mut() {
            Some(file) => file,
            None => sides.reader()?,
        };
        let sink = match files.output.as_mut() {
            Some(file) => file,
            None => sides.writer()?,
        };
        let buffer = sides.buffer;
        self.relay.relay(source, sink, buffer).await
    }

    async fn read_request(&self, path: &Path) -> Result<Bytes> {
        let mut source = open_read(path).await?;
        let mut sink = MemoryChannel::new();
        let mut buffer = TransferBuffer::new(self.config.buffer_size)?;

        let relayed = self.relay.relay(&mut source, &mut sink, &mut buffer).await;
        let closed = source.close().await;
        relayed?;
        closed?;
        Ok(sink.into_written())
    }

    async fn write_response(&self, path: &Path, response: Bytes) -> Result<u64> {
        let mut sink = open_write(path).await?;
        let mut source = MemoryChannel::from_bytes(response);
        let mut buffer = TransferBuffer::new(self.config.buffer_size)?;

        let relayed = self.relay.relay(&mut source, &mut sink, &mut buffer).await;
        let closed = sink.close().await;
        let bytes = relayed?;
        closed?;
        Ok(bytes)
    }
}

/// File channels standing in for either side of a relay.
#[derive(Default)]
struct FileSides {
    input: Option<IoChannel>,
    output: Option<IoChannel>,
}

impl FileSides {
    async fn open(input: &Input, output: &Output) -> Result<Self> {
        let mut sides = Self::default();
        if let Input::File(path) = input {
            sides.input = Some(open_read(path).await?);
        }
        if let Output::File(path) = output {
            sides.output = Some(open_write(path).await?);
        }
        Ok(sides)
    }

    /// Close both files and fold the outcome into `relayed`.
    async fn finish(&mut self, relayed: Result<u64>) -> Result<u64> {
        let mut first_err = None;
        for file in [self.output.as_mut(), self.input.as_mut()].into_iter().flatten() {
            if let Err(e) = file.close().await {
                tracing::error!("Failed to close {}: {}", file.label(), e);
                first_err.get_or_insert(e);
            }
        }
        let bytes = relayed?;
        first_err.map_or(Ok(bytes), Err)
    }
}
