use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::DELIMITER;

/// Default number of bytes requested from the stream per read.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// One line read from a [`CharBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Characters read, without the delimiter.
    pub content: String,
    /// False when the character cap was exceeded before a delimiter arrived.
    pub terminated: bool,
}

/// Incremental UTF-8 decoder over a byte stream.
///
/// Bytes are pulled from the inner reader in chunks; an incomplete
/// multi-byte sequence at the end of a chunk stays buffered until the rest
/// arrives. A line in progress survives a read timeout, so a retried
/// [`CharBuffer::next_line`] continues where the previous call stopped.
pub struct CharBuffer<T> {
    inner: T,
    bytes: BytesMut,
    chunk: Vec<u8>,
    line: String,
    line_chars: usize,
}

impl<T: Read> CharBuffer<T> {
    pub fn new(inner: T) -> Self {
        Self::with_chunk_size(inner, DEFAULT_READ_CHUNK)
    }

    /// Create a buffer that asks the stream for `chunk_size` bytes per read.
    pub fn with_chunk_size(inner: T, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            inner,
            bytes: BytesMut::with_capacity(chunk_size),
            chunk: vec![0u8; chunk_size],
            line: String::new(),
            line_chars: 0,
        }
    }

    /// Next decoded character, blocking until enough bytes have arrived.
    ///
    /// Fails with [`FrameError::ConnectionClosed`] if the stream ends first.
    pub fn next_char(&mut self) -> Result<char> {
        loop {
            if let Some(c) = self.decode_buffered()? {
                return Ok(c);
            }
            self.fill()?;
        }
    }

    /// Read up to `max_chars` characters followed by the delimiter.
    ///
    /// If character `max_chars + 1` arrives before a delimiter, it is kept and
    /// the line comes back with `terminated == false`.
    pub fn next_line(&mut self, max_chars: usize) -> Result<Line> {
        loop {
            let c = self.next_char()?;
            if c == DELIMITER {
                return Ok(self.take_line(true));
            }
            self.line.push(c);
            self.line_chars += 1;
            if self.line_chars > max_chars {
                return Ok(self.take_line(false));
            }
        }
    }

    /// Discard characters through the next delimiter.
    pub fn skip_line(&mut self) -> Result<()> {
        while self.next_char()? != DELIMITER {}
        Ok(())
    }

    /// Number of raw bytes buffered but not yet decoded.
    pub fn buffered_len(&self) -> usize {
        self.bytes.len()
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

    fn take_line(&mut self, terminated: bool) -> Line {
        self.line_chars = 0;
        Line {
            content: std::mem::take(&mut self.line),
            terminated,
        }
    }

    fn decode_buffered(&mut self) -> Result<Option<char>> {
        let Some(&lead) = self.bytes.first() else {
            return Ok(None);
        };
        let width = utf8_width(lead).ok_or(FrameError::InvalidUtf8)?;
        if self.bytes.len() < width {
            return Ok(None);
        }

        let c = std::str::from_utf8(&self.bytes[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or(FrameError::InvalidUtf8)?;
        self.bytes.advance(width);
        Ok(Some(c))
    }

    fn fill(&mut self) -> Result<()> {
        loop {
            match self.inner.read(&mut self.chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.bytes.extend_from_slice(&self.chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

/// Encoded length of the UTF-8 sequence introduced by `lead`.
fn utf8_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}
