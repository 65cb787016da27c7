//! Channel module - uniform byte source/sink abstraction.
//!
//! A [`ByteChannel`] is anything bytes can be read from and/or written to:
//!
//! - [`IoChannel`] - a tokio reader/writer pair (pipe halves, files)
//! - [`MemoryChannel`] - an in-memory loopback buffer
//! - [`open_read`] / [`open_write`] - file collaborators producing `IoChannel`s
//!
//! # Contract
//!
//! - `read` returns `Ok(0)` at end-of-stream.
//! - `write` returns the number of bytes actually accepted, which may be
//!   fewer than offered.
//! - `close` is idempotent. After it, `read` and `write` fail with
//!   [`PipeError::Closed`](crate::PipeError::Closed).
//! - A direction not permitted by the channel's [`AccessMode`] fails with
//!   [`PipeError::AccessDenied`](crate::PipeError::AccessDenied).

mod buffer;
mod file;
mod memory;
mod stream;

use std::future::Future;

use crate::endpoint::AccessMode;
use crate::error::Result;

pub use buffer::TransferBuffer;
pub use file::{open_read, open_write};
pub use memory::MemoryChannel;
pub use stream::{BoxedReader, BoxedWriter, IoChannel};

/// Something bytes can be read from and/or written to.
pub trait ByteChannel: Send {
    /// Read into `buf`. `Ok(0)` signals end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Write from `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Release the channel. Safe to call more than once.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Directions this channel permits.
    fn access(&self) -> AccessMode;

    fn is_closed(&self) -> bool;
}
