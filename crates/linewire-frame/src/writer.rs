use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_binary, encode_error, encode_message, encode_text, Limits, Message};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
///
/// Each message is encoded in full before the first byte is written, so a
/// message that violates its limit leaves the stream untouched.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    limits: Limits,
}

impl<T: Write> MessageWriter<T> {
    /// Create a writer with default limits.
    pub fn new(inner: T) -> Self {
        Self::with_limits(inner, Limits::default())
    }

    pub fn with_limits(inner: T, limits: Limits) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            limits,
        }
    }

    /// Send a text message.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.buf.clear();
        encode_text(text, &self.limits, &mut self.buf)?;
        self.write_buffered()
    }

    /// Send a binary message.
    pub fn send_binary(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_binary(payload, &self.limits, &mut self.buf)?;
        self.write_buffered()
    }

    /// Send an error notification. The description is truncated to fit.
    pub fn send_error(&mut self, description: &str) -> Result<()> {
        self.buf.clear();
        encode_error(description, &self.limits, &mut self.buf);
        self.write_buffered()
    }

    /// Send any message.
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        self.buf.clear();
        encode_message(message, &self.limits, &mut self.buf)?;
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
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
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::kind::MessageKind;
    use crate::reader::MessageReader;

    fn written(writer: MessageWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn writes_text_and_binary_frames() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::new()));

        writer.send_text("hello").unwrap();
        writer.send_text("#hello").unwrap();
        writer.send_binary(&[1, 2, 3]).unwrap();

        assert_eq!(written(writer), b"hello\n##hello\n$AQID\n");
    }

    #[test]
    fn oversized_text_writes_nothing() {
        let limits = Limits::default().with_max_text_chars(5);
        let mut writer = MessageWriter::with_limits(Cursor::new(Vec::new()), limits);

        let err = writer.send_text("hello world").unwrap_err();

        assert!(matches!(
            err,
            FrameError::PayloadTooLarge {
                kind: MessageKind::Text,
                ..
            }
        ));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn oversized_binary_writes_nothing() {
        let limits = Limits::default().with_max_binary_bytes(2);
        let mut writer = MessageWriter::with_limits(Cursor::new(Vec::new()), limits);

        assert!(writer.send_binary(&[1, 2, 3]).is_err());
        assert!(written(writer).is_empty());
    }

    #[test]
    fn error_frame_is_truncated_to_text_limit() {
        let limits = Limits::default().with_max_text_chars(3);
        let mut writer = MessageWriter::with_limits(Cursor::new(Vec::new()), limits);

        writer.send_error("listener exploded").unwrap();

        assert_eq!(written(writer), b"!lis\n");
    }

    #[test]
    fn write_message_then_read_back() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::new()));
        let messages = [
            Message::text("$not binary"),
            Message::binary(vec![0u8, 255, 10]),
            Message::Error("remote".to_string()),
            Message::text(""),
        ];
        for message in &messages {
            writer.write_message(message).unwrap();
        }

        let mut reader = MessageReader::new(Cursor::new(written(writer)));
        for expected in messages {
            assert_eq!(reader.read_message().unwrap(), expected);
        }
    }

    #[test]
    fn flush_propagates() {
        #[derive(Default)]
        struct FlushTracking {
            flushed: Arc<AtomicBool>,
        }

        impl Write for FlushTracking {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                self.flushed.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let sink = FlushTracking::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = MessageWriter::new(sink);

        writer.send_text("x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn interrupted_write_retries() {
        struct InterruptedOnce {
            interrupted: bool,
            data: Vec<u8>,
        }

        impl Write for InterruptedOnce {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                self.data.extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = MessageWriter::new(InterruptedOnce {
            interrupted: false,
            data: Vec::new(),
        });
        writer.send_text("retry").unwrap();
        assert_eq!(writer.into_inner().data, b"retry\n");
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        struct ZeroWriter;

        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = MessageWriter::new(ZeroWriter);
        assert!(matches!(
            writer.send_text("x"),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn broken_pipe_is_io_error() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::BrokenPipe))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = MessageWriter::new(Broken);
        assert!(matches!(
            writer.send_binary(b"x"),
            Err(FrameError::Io(err)) if err.kind() == ErrorKind::BrokenPipe
        ));
    }
}
