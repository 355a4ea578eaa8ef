//! `tokio_util::codec` binding for the line message format.
//!
//! Use with `FramedRead`/`FramedWrite`/`Framed` to carry linewire messages
//! over tokio streams. Grammar and limits are identical to the blocking
//! [`crate::MessageReader`] and [`crate::MessageWriter`].

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_line, encode_message, too_large, truncate_chars, Limits, Message};
use crate::error::{FrameError, Result};
use crate::kind::MessageKind;

const DELIMITER_BYTE: u8 = b'\n';

/// Codec for `\n`-delimited linewire messages.
///
/// Decoding does not depend on how the input was chunked: an oversized error
/// line is truncated whether or not its delimiter has arrived yet.
#[derive(Debug, Clone, Default)]
pub struct LineMessageCodec {
    limits: Limits,
    /// Bytes of the current line already scanned for a delimiter.
    scanned: usize,
    /// Truncated description of an oversized error line whose tail is skipped.
    error_head: Option<String>,
}

impl LineMessageCodec {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            scanned: 0,
            error_head: None,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Longest line, in bytes, that can still hold an acceptable message.
    fn max_line_bytes(&self) -> usize {
        let text = self.limits.max_text_chars.saturating_mul(4);
        let binary = self.limits.max_encoded_binary_chars();
        // One marker byte on top of the payload.
        text.max(binary).saturating_add(1)
    }

    /// Drop the rest of a truncated error line, then emit it.
    fn skip_error_tail(&mut self, src: &mut BytesMut) -> Option<Message> {
        match src.iter().position(|b| *b == DELIMITER_BYTE) {
            Some(offset) => {
                src.advance(offset + 1);
                self.error_head.take().map(Message::Error)
            }
            None => {
                src.clear();
                None
            }
        }
    }

    /// Handle a line that is already too long and still has no delimiter.
    fn oversized_partial(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let max_text = self.limits.max_text_chars;
        match src.first().copied() {
            Some(b'!') => {
                let head = utf8_prefix(&src[1..])?;
                self.error_head = Some(truncate_chars(head, max_text));
                self.scanned = 0;
                src.clear();
                Ok(None)
            }
            Some(b'$') => Err(too_large(
                MessageKind::Binary,
                self.limits.max_binary_bytes,
                &lossy_excerpt(&src[1..]),
            )),
            Some(b'#') => Err(too_large(
                MessageKind::Text,
                max_text,
                &lossy_excerpt(&src[1..]),
            )),
            _ => Err(too_large(MessageKind::Text, max_text, &lossy_excerpt(&src[..]))),
        }
    }
}

/// Longest valid UTF-8 prefix, tolerating a character cut off at the end.
fn utf8_prefix(bytes: &[u8]) -> Result<&str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) if err.error_len().is_none() => {
            std::str::from_utf8(&bytes[..err.valid_up_to()]).map_err(|_| FrameError::InvalidUtf8)
        }
        Err(_) => Err(FrameError::InvalidUtf8),
    }
}

fn lossy_excerpt(bytes: &[u8]) -> String {
    let end = bytes.len().min(crate::codec::EXCERPT_CHARS * 4);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl Decoder for LineMessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if self.error_head.is_some() {
            return Ok(self.skip_error_tail(src));
        }

        let Some(offset) = src[self.scanned..]
            .iter()
            .position(|b| *b == DELIMITER_BYTE)
        else {
            self.scanned = src.len();
            if src.len() > self.max_line_bytes() {
                return self.oversized_partial(src);
            }
            return Ok(None);
        };

        let line_len = self.scanned + offset;
        self.scanned = 0;
        let line = src.split_to(line_len);
        src.advance(1);

        let line = std::str::from_utf8(&line).map_err(|_| FrameError::InvalidUtf8)?;
        decode_line(line, &self.limits).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() && self.error_head.is_none() => Ok(None),
            None => {
                self.error_head = None;
                Err(FrameError::ConnectionClosed)
            }
        }
    }
}

impl Encoder<Message> for LineMessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        encode_message(&item, &self.limits, dst)
    }
}
