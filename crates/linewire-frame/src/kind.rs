//! Wire markers and message kinds.
//!
//! A frame starts with at most one marker character. Text whose first
//! character collides with a marker is sent behind [`TEXT_ESCAPE`].

use std::fmt;

/// Terminates every frame.
pub const DELIMITER: char = '\n';

/// Escaped text follows.
pub const TEXT_ESCAPE: char = '#';

/// Base64-encoded binary payload follows.
pub const BINARY_MARKER: char = '$';

/// Error description follows.
pub const ERROR_MARKER: char = '!';

/// Returns true if `c` would be read as a type marker at the start of a line.
pub fn is_marker(c: char) -> bool {
    matches!(c, TEXT_ESCAPE | BINARY_MARKER | ERROR_MARKER)
}

/// The three message categories carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Binary,
    Error,
}

impl MessageKind {
    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Binary => "binary",
            MessageKind::Error => "error",
        }
    }

    /// Unit the size limit for this kind is measured in.
    pub fn unit(self) -> &'static str {
        match self {
            MessageKind::Text | MessageKind::Error => "characters",
            MessageKind::Binary => "bytes",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
