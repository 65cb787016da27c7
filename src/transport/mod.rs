//! Transport module - the OS side of an endpoint.
//!
//! One API, two backends:
//! - Unix: a domain socket per local endpoint in the namespace directory,
//!   owned through a lock file next to it
//! - Windows: a single-instance named pipe

mod pipe;

#[cfg(unix)]
pub use pipe::{lock_path, socket_path};
pub use pipe::{connect, generate_pipe_name, ListenOptions, PeerHandle, PipeListener, PipeStream};
