//! Line-delimited message framing for linewire channels.
//!
//! Every message occupies exactly one `\n`-terminated line. The first
//! character selects the message type:
//! - `#` escaped text (the marker is dropped)
//! - `$` binary payload, standard Base64 with padding
//! - `!` error description
//! - anything else: the whole line is text
//!
//! The reader decodes UTF-8 incrementally, so a character split across any
//! number of underlying reads is reassembled before the line is scanned.
//! Size limits apply to both directions: an oversized message is never
//! written and never returned by the reader.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::LineMessageCodec;
pub use buffer::{CharBuffer, Line};
pub use codec::{
    decode_line, encode_binary, encode_error, encode_message, encode_text, Limits, Message,
    DEFAULT_MAX_BINARY_BYTES, DEFAULT_MAX_TEXT_CHARS, EXCERPT_CHARS,
};
pub use error::{FrameError, Result};
pub use kind::{MessageKind, BINARY_MARKER, DELIMITER, ERROR_MARKER, TEXT_ESCAPE};
pub use reader::MessageReader;
pub use writer::MessageWriter;
