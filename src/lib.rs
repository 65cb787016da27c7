//! # npipe-session
//!
//! Session layer over named pipes: one-shot transactional calls and
//! single-connection relays between a pipe and files.
//!
//! ## Architecture
//!
//! - **Channels**: files, pipe halves and in-memory buffers behind one
//!   [`ByteChannel`] contract
//! - **Client / Server**: [`PipeClient`] calls or opens an endpoint,
//!   [`PipeServer`] creates one and services exactly one peer
//! - **Relay**: [`StreamRelay`] copies between channels in bounded chunks
//! - **Driver**: [`SessionDriver`] composes the above into complete flows
//!
//! On Unix an endpoint `\\.\pipe\<name>` is a Unix domain socket named
//! `<name>` inside [`SessionConfig::namespace_dir`]; on Windows it is a
//! native named pipe.
//!
//! ## Example
//!
//! ```ignore
//! use npipe_session::{Endpoint, PipeClient, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> npipe_session::Result<()> {
//!     let client = PipeClient::new(SessionConfig::default());
//!     let response = client.call(&Endpoint::local("test1")?, b"PING").await?;
//!     println!("{:?}", response);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod cli;
pub mod client;
pub mod config;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod options;
pub mod relay;
pub mod report;
pub mod server;
pub mod session;
pub mod transport;

pub use channel::{ByteChannel, IoChannel, MemoryChannel, TransferBuffer};
pub use client::PipeClient;
pub use config::{SessionConfig, WaitTimeout, WriteMode};
pub use driver::{Input, Output, Plan, RelayRequest, SessionDriver, SessionReport, TransactionRequest};
pub use endpoint::{AccessMode, Endpoint, PipeKind, PipeMode, WaitMode};
pub use error::{ErrorKind, PipeError, Result};
pub use relay::StreamRelay;
pub use report::{Flow, SessionOutcome};
pub use server::{PipeServer, ServerPhase};
pub use session::{Session, SessionChannels};
