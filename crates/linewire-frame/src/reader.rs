use std::io::Read;

use tracing::trace;

use crate::buffer::{CharBuffer, DEFAULT_READ_CHUNK};
use crate::codec::{decode_binary, too_large, truncate_chars, Limits, Message};
use crate::error::Result;
use crate::kind::{MessageKind, BINARY_MARKER, DELIMITER, ERROR_MARKER, TEXT_ESCAPE};

/// Frame whose marker has been consumed but whose payload is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    EscapedText,
    Text(char),
    Binary,
    Error,
    ErrorTail,
}

/// Reads complete messages from any `Read` stream.
///
/// Partial reads and split UTF-8 sequences are handled internally. A read
/// timeout (`WouldBlock`/`TimedOut`) leaves the frame in progress intact;
/// calling [`MessageReader::read_message`] again resumes it.
pub struct MessageReader<T> {
    buf: CharBuffer<T>,
    limits: Limits,
    /// `None` between frames.
    pending: Option<Pending>,
    error_head: String,
}

impl<T: Read> MessageReader<T> {
    /// Create a reader with default limits.
    pub fn new(inner: T) -> Self {
        Self::with_limits(inner, Limits::default())
    }

    pub fn with_limits(inner: T, limits: Limits) -> Self {
        Self::with_chunk_size(inner, limits, DEFAULT_READ_CHUNK)
    }

    /// Create a reader that pulls `chunk_size` bytes per underlying read.
    pub fn with_chunk_size(inner: T, limits: Limits, chunk_size: usize) -> Self {
        Self {
            buf: CharBuffer::with_chunk_size(inner, chunk_size),
            limits,
            pending: None,
            error_head: String::new(),
        }
    }

    /// Read the next message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the stream ends.
    /// Oversized messages fail with `PayloadTooLarge` and are never returned.
    pub fn read_message(&mut self) -> Result<Message> {
        let pending = match self.pending {
            Some(pending) => pending,
            None => match self.buf.next_char()? {
                DELIMITER => return Ok(Message::Text(String::new())),
                TEXT_ESCAPE => Pending::EscapedText,
                BINARY_MARKER => Pending::Binary,
                ERROR_MARKER => Pending::Error,
                first => Pending::Text(first),
            },
        };
        self.pending = Some(pending);

        let result = self.finish_pending(pending);
        match &result {
            Err(err) if err.is_timeout() => {}
            _ => self.pending = None,
        }
        result
    }

    fn finish_pending(&mut self, pending: Pending) -> Result<Message> {
        let max_text = self.limits.max_text_chars;

        match pending {
            Pending::EscapedText => {
                let line = self.buf.next_line(max_text)?;
                if !line.terminated {
                    return Err(too_large(MessageKind::Text, max_text, &line.content));
                }
                Ok(Message::Text(line.content))
            }
            Pending::Text(first) => {
                if max_text == 0 {
                    return Err(too_large(MessageKind::Text, max_text, &first.to_string()));
                }
                let line = self.buf.next_line(max_text - 1)?;
                let mut text = String::with_capacity(line.content.len() + first.len_utf8());
                text.push(first);
                text.push_str(&line.content);
                if !line.terminated {
                    return Err(too_large(MessageKind::Text, max_text, &text));
                }
                Ok(Message::Text(text))
            }
            Pending::Binary => {
                let line = self.buf.next_line(self.limits.max_encoded_binary_chars())?;
                if !line.terminated {
                    return Err(too_large(
                        MessageKind::Binary,
                        self.limits.max_binary_bytes,
                        &line.content,
                    ));
                }
                decode_binary(&line.content, &self.limits).map(Message::Binary)
            }
            Pending::Error => {
                let line = self.buf.next_line(max_text)?;
                if line.terminated {
                    return Ok(Message::Error(line.content));
                }
                trace!(max_text, "truncating oversized error description");
                self.error_head = truncate_chars(&line.content, max_text);
                self.pending = Some(Pending::ErrorTail);
                self.buf.skip_line()?;
                Ok(Message::Error(std::mem::take(&mut self.error_head)))
            }
            Pending::ErrorTail => {
                self.buf.skip_line()?;
                Ok(Message::Error(std::mem::take(&mut self.error_head)))
            }
        }
    }

    /// Current limits.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Replace the limits used for subsequent messages.
    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    pub fn get_ref(&self) -> &T {
        self.buf.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.buf.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.buf.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use super::*;
    use crate::error::FrameError;

    fn reader(wire: &[u8]) -> MessageReader<Cursor<Vec<u8>>> {
        MessageReader::new(Cursor::new(wire.to_vec()))
    }

    #[test]
    fn reads_plain_text() {
        let mut r = reader(b"hello\n");
        assert_eq!(r.read_message().unwrap(), Message::text("hello"));
        assert!(matches!(
            r.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn escaped_text_drops_marker() {
        let mut r = reader(b"#hello\n##x\n");
        assert_eq!(r.read_message().unwrap(), Message::text("hello"));
        assert_eq!(r.read_message().unwrap(), Message::text("#x"));
    }

    #[test]
    fn reads_binary() {
        let mut r = reader(b"$AQID\n");
        assert_eq!(
            r.read_message().unwrap(),
            Message::binary(vec![1u8, 2, 3])
        );
    }

    #[test]
    fn reads_remote_error() {
        let mut r = reader(b"!listener failed\n");
        assert_eq!(
            r.read_message().unwrap(),
            Message::Error("listener failed".to_string())
        );
    }

    #[test]
    fn empty_line_is_empty_text() {
        let mut r = reader(b"\n\n");
        assert_eq!(r.read_message().unwrap(), Message::text(""));
        assert_eq!(r.read_message().unwrap(), Message::text(""));
    }

    #[test]
    fn invalid_base64_is_decode_error() {
        let mut r = reader(b"$!!!notbase64!!!\n");
        assert!(matches!(r.read_message(), Err(FrameError::Decode(_))));
    }

    #[test]
    fn text_exactly_at_limit_is_accepted() {
        let limits = Limits::default().with_max_text_chars(5);
        let mut r = MessageReader::with_limits(Cursor::new(b"hello\n#world\n".to_vec()), limits);
        assert_eq!(r.read_message().unwrap(), Message::text("hello"));
        assert_eq!(r.read_message().unwrap(), Message::text("world"));
    }

    #[test]
    fn text_over_limit_is_rejected() {
        let limits = Limits::default().with_max_text_chars(5);
        let mut r =
            MessageReader::with_limits(Cursor::new(b"hello world\n".to_vec()), limits);

        match r.read_message() {
            Err(FrameError::PayloadTooLarge { kind, max, excerpt }) => {
                assert_eq!(kind, MessageKind::Text);
                assert_eq!(max, 5);
                assert_eq!(excerpt, "hello ");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn escaped_text_over_limit_is_rejected() {
        let limits = Limits::default().with_max_text_chars(3);
        let mut r = MessageReader::with_limits(Cursor::new(b"#abcd\n".to_vec()), limits);
        assert!(matches!(
            r.read_message(),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn zero_text_limit_allows_only_empty_text() {
        let limits = Limits::default().with_max_text_chars(0);
        let mut r = MessageReader::with_limits(Cursor::new(b"\nx\n".to_vec()), limits);
        assert_eq!(r.read_message().unwrap(), Message::text(""));
        assert!(matches!(
            r.read_message(),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn binary_at_limit_roundtrips() {
        let limits = Limits::default().with_max_binary_bytes(4);
        // 4 bytes encode to 8 Base64 characters, over the raw byte limit.
        let mut r = MessageReader::with_limits(Cursor::new(b"$AQIDBA==\n".to_vec()), limits);
        assert_eq!(
            r.read_message().unwrap(),
            Message::binary(vec![1u8, 2, 3, 4])
        );
    }

    #[test]
    fn binary_over_encoded_cap_is_rejected() {
        let limits = Limits::default().with_max_binary_bytes(3);
        let mut r = MessageReader::with_limits(Cursor::new(b"$AQIDBA==\n".to_vec()), limits);
        assert!(matches!(
            r.read_message(),
            Err(FrameError::PayloadTooLarge {
                kind: MessageKind::Binary,
                ..
            })
        ));
    }

    #[test]
    fn oversized_error_is_truncated_and_stream_continues() {
        let limits = Limits::default().with_max_text_chars(4);
        let mut r = MessageReader::with_limits(
            Cursor::new(b"!something broke\nnext\n".to_vec()),
            limits,
        );
        assert_eq!(
            r.read_message().unwrap(),
            Message::Error("some".to_string())
        );
        assert_eq!(r.read_message().unwrap(), Message::text("next"));
    }

    #[test]
    fn multibyte_split_over_single_byte_reads() {
        struct OneByte(Cursor<Vec<u8>>);

        impl Read for OneByte {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let n = buf.len().min(1);
                self.0.read(&mut buf[..n])
            }
        }

        let wire = "#ćma 🦋\n".as_bytes().to_vec();
        let mut r = MessageReader::new(OneByte(Cursor::new(wire)));
        assert_eq!(r.read_message().unwrap(), Message::text("ćma 🦋"));
    }

    #[test]
    fn timeout_mid_frame_resumes() {
        struct TimeoutAfter {
            inner: Cursor<Vec<u8>>,
            calls: usize,
        }

        impl Read for TimeoutAfter {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.calls += 1;
                if self.calls == 3 {
                    return Err(std::io::Error::from(ErrorKind::TimedOut));
                }
                let n = buf.len().min(2);
                self.inner.read(&mut buf[..n])
            }
        }

        let mut r = MessageReader::new(TimeoutAfter {
            inner: Cursor::new(b"$AQID\nok\n".to_vec()),
            calls: 0,
        });

        let err = r.read_message().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(
            r.read_message().unwrap(),
            Message::binary(vec![1u8, 2, 3])
        );
        assert_eq!(r.read_message().unwrap(), Message::text("ok"));
    }

    #[test]
    fn timeout_while_skipping_error_tail_resumes() {
        struct TimeoutOnce {
            inner: Cursor<Vec<u8>>,
            timed_out: bool,
        }

        impl Read for TimeoutOnce {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.inner.position() == 8 && !self.timed_out {
                    self.timed_out = true;
                    return Err(std::io::Error::from(ErrorKind::WouldBlock));
                }
                let n = buf.len().min(4);
                self.inner.read(&mut buf[..n])
            }
        }

        let limits = Limits::default().with_max_text_chars(2);
        let mut r = MessageReader::with_limits(
            TimeoutOnce {
                inner: Cursor::new(b"!abcdefghij
ok
".to_vec()),
                timed_out: false,
            },
            limits,
        );

        assert!(r.read_message().unwrap_err().is_timeout());
        assert_eq!(r.read_message().unwrap(), Message::Error("ab".to_string()));
        assert_eq!(r.read_message().unwrap(), Message::text("ok"));
    }

    #[test]
    fn limits_can_be_replaced() {
        let mut r = reader(b"abc\n");
        r.set_limits(Limits::default().with_max_text_chars(2));
        assert_eq!(r.limits().max_text_chars, 2);
        assert!(r.read_message().is_err());
    }
}
