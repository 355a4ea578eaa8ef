use std::io::ErrorKind;

use crate::kind::MessageKind;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A message exceeds the configured limit for its kind.
    #[error("{kind} message \"{excerpt}...\" is bigger than allowed {max} {}", .kind.unit())]
    PayloadTooLarge {
        kind: MessageKind,
        max: usize,
        /// Leading part of the offending payload, for diagnostics.
        excerpt: String,
    },

    /// A binary frame is not valid standard Base64.
    #[error("problem decoding binary message: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The stream carried bytes that are not valid UTF-8.
    #[error("invalid UTF-8 sequence in stream")]
    InvalidUtf8,

    /// Outgoing text contains the line delimiter and cannot be framed.
    #[error("text message contains a line delimiter")]
    EmbeddedDelimiter,

    /// An I/O error occurred while reading or writing.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for read/write timeouts, after which the operation can be retried.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FrameError::Io(err)
            if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut))
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
