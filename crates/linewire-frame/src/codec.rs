use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};
use crate::kind::{is_marker, MessageKind, BINARY_MARKER, DELIMITER, ERROR_MARKER, TEXT_ESCAPE};

/// Default maximum text message length, in characters.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 8192;

/// Default maximum binary message length, in decoded bytes.
pub const DEFAULT_MAX_BINARY_BYTES: usize = 8192;

/// Number of payload characters quoted in size-violation diagnostics.
pub const EXCERPT_CHARS: usize = 256;

/// One discrete message exchanged over a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes, carried as Base64 on the wire.
    Binary(Bytes),
    /// An error description signalled by the remote peer.
    Error(String),
}

impl Message {
    /// Create a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    /// Create a binary message.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Message::Binary(payload.into())
    }

    /// The wire category of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::Binary(_) => MessageKind::Binary,
            Message::Error(_) => MessageKind::Error,
        }
    }
}

/// Per-kind size limits. Applied to inbound and outbound messages alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum text length in characters (Unicode scalar values).
    pub max_text_chars: usize,
    /// Maximum binary length in decoded bytes.
    pub max_binary_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            max_binary_bytes: DEFAULT_MAX_BINARY_BYTES,
        }
    }
}

impl Limits {
    pub fn with_max_text_chars(mut self, max: usize) -> Self {
        self.max_text_chars = max;
        self
    }

    pub fn with_max_binary_bytes(mut self, max: usize) -> Self {
        self.max_binary_bytes = max;
        self
    }

    /// Length of the Base64 text for a binary payload at the limit.
    pub fn max_encoded_binary_chars(&self) -> usize {
        self.max_binary_bytes.div_ceil(3).saturating_mul(4)
    }
}

/// Encode a text message.
///
/// Text starting with a marker character is escaped with `#`. Fails without
/// writing anything if the text is over the limit or contains `\n`.
pub fn encode_text(text: &str, limits: &Limits, dst: &mut BytesMut) -> Result<()> {
    if text.chars().count() > limits.max_text_chars {
        return Err(too_large(MessageKind::Text, limits.max_text_chars, text));
    }
    if text.contains(DELIMITER) {
        return Err(FrameError::EmbeddedDelimiter);
    }

    dst.reserve(text.len() + 2);
    if text.starts_with(is_marker) {
        put_char(dst, TEXT_ESCAPE);
    }
    dst.put_slice(text.as_bytes());
    put_char(dst, DELIMITER);
    Ok(())
}

/// Encode a binary message as `$<base64>\n`.
pub fn encode_binary(payload: &[u8], limits: &Limits, dst: &mut BytesMut) -> Result<()> {
    if payload.len() > limits.max_binary_bytes {
        let preview = STANDARD.encode(&payload[..payload.len().min(EXCERPT_CHARS)]);
        return Err(too_large(
            MessageKind::Binary,
            limits.max_binary_bytes,
            &preview,
        ));
    }

    let encoded = STANDARD.encode(payload);
    dst.reserve(encoded.len() + 2);
    put_char(dst, BINARY_MARKER);
    dst.put_slice(encoded.as_bytes());
    put_char(dst, DELIMITER);
    Ok(())
}

/// Encode an error notification as `!<description>\n`.
///
/// The description is cut to the text limit and line breaks are flattened
/// to spaces, so this never fails.
pub fn encode_error(description: &str, limits: &Limits, dst: &mut BytesMut) {
    let description: String = description
        .chars()
        .take(limits.max_text_chars)
        .map(|c| if c == DELIMITER || c == '\r' { ' ' } else { c })
        .collect();

    dst.reserve(description.len() + 2);
    put_char(dst, ERROR_MARKER);
    dst.put_slice(description.as_bytes());
    put_char(dst, DELIMITER);
}

/// Encode any message.
pub fn encode_message(message: &Message, limits: &Limits, dst: &mut BytesMut) -> Result<()> {
    match message {
        Message::Text(text) => encode_text(text, limits, dst),
        Message::Binary(payload) => encode_binary(payload, limits, dst),
        Message::Error(description) => {
            encode_error(description, limits, dst);
            Ok(())
        }
    }
}

/// Decode one complete line, delimiter already stripped.
pub fn decode_line(line: &str, limits: &Limits) -> Result<Message> {
    let mut chars = line.chars();
    match chars.next() {
        None => Ok(Message::Text(String::new())),
        Some(TEXT_ESCAPE) => check_text(chars.as_str(), limits).map(Message::text),
        Some(BINARY_MARKER) => decode_binary(chars.as_str(), limits).map(Message::Binary),
        Some(ERROR_MARKER) => Ok(Message::Error(truncate_chars(
            chars.as_str(),
            limits.max_text_chars,
        ))),
        Some(_) => check_text(line, limits).map(Message::text),
    }
}

pub(crate) fn decode_binary(encoded: &str, limits: &Limits) -> Result<Bytes> {
    if encoded.len() > limits.max_encoded_binary_chars() {
        return Err(too_large(
            MessageKind::Binary,
            limits.max_binary_bytes,
            encoded,
        ));
    }

    let decoded = STANDARD.decode(encoded)?;
    if decoded.len() > limits.max_binary_bytes {
        return Err(too_large(
            MessageKind::Binary,
            limits.max_binary_bytes,
            encoded,
        ));
    }
    Ok(Bytes::from(decoded))
}

fn check_text<'a>(text: &'a str, limits: &Limits) -> Result<&'a str> {
    if text.chars().count() > limits.max_text_chars {
        return Err(too_large(MessageKind::Text, limits.max_text_chars, text));
    }
    Ok(text)
}

pub(crate) fn too_large(kind: MessageKind, max: usize, payload: &str) -> FrameError {
    FrameError::PayloadTooLarge {
        kind,
        max,
        excerpt: truncate_chars(payload, EXCERPT_CHARS),
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn put_char(dst: &mut BytesMut, c: char) {
    let mut utf8 = [0u8; 4];
    dst.put_slice(c.encode_utf8(&mut utf8).as_bytes());
}
