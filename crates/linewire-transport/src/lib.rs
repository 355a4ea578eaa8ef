//! Byte-stream plumbing for linewire channels.
//!
//! A channel only needs an ordered, reliable byte stream. This crate provides
//! the stream types the rest of the workspace binds to:
//! - connected socket pairs for in-process endpoints and tests
//! - Unix domain sockets (bind/accept/connect) for local IPC
//!
//! [`IpcStream`] is the common handle. It implements `Read + Write`, can be
//! cloned into independent read and write halves, and implements
//! [`ReadInterrupt`] so a blocked reader can be woken on shutdown.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{IpcStream, ReadInterrupt};

#[cfg(unix)]
pub use uds::UnixSocketListener;
