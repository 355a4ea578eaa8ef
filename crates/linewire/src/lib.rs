//! Line-framed, bidirectional message channels over byte streams.
//!
//! Two endpoints exchange text and binary messages over any ordered byte
//! stream. Each message is one `\n`-terminated line; binary payloads travel
//! as Base64. Inbound messages are delivered to listeners on a dedicated
//! thread, in order and one at a time.
//!
//! # Crate Structure
//!
//! - [`transport`]: socket pairs and Unix domain sockets
//! - [`frame`]: the line codec, blocking reader/writer, optional tokio codec
//! - [`channel`]: listener dispatch, lifecycle and connection helpers
//!   (behind the `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use linewire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linewire_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use linewire_channel::*;
}
