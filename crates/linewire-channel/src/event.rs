//! Events delivered to channel listeners.

use std::fmt;

use bytes::Bytes;
use linewire_frame::{FrameError, Message};

/// Listener category. Every event belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Text,
    Binary,
    Error,
    Lifecycle,
}

impl Category {
    pub(crate) const ALL: [Category; 4] = [
        Category::Text,
        Category::Binary,
        Category::Error,
        Category::Lifecycle,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Category::Text => 0,
            Category::Binary => 1,
            Category::Error => 2,
            Category::Lifecycle => 3,
        }
    }
}

/// Channel lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    Stopped,
}

/// Where an error event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// Reading from or writing to the stream failed, or the stream ended.
    StreamIo,
    /// An inbound frame could not be parsed.
    Decode,
    /// A message exceeded its size limit, inbound or outbound.
    SizeViolation,
    /// The remote peer reported an error with a `!` frame.
    Remote,
}

impl ErrorSource {
    pub fn name(self) -> &'static str {
        match self {
            ErrorSource::StreamIo => "stream-io",
            ErrorSource::Decode => "decode",
            ErrorSource::SizeViolation => "size-violation",
            ErrorSource::Remote => "remote",
        }
    }
}

/// An error reported to error listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub source: ErrorSource,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(source: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }

    /// Fatal errors stop the channel. Only remote reports are not fatal.
    pub fn is_fatal(&self) -> bool {
        self.source != ErrorSource::Remote
    }

    pub(crate) fn from_frame_error(err: &FrameError) -> Self {
        let source = match err {
            FrameError::Io(_) | FrameError::ConnectionClosed => ErrorSource::StreamIo,
            FrameError::Decode(_) | FrameError::InvalidUtf8 | FrameError::EmbeddedDelimiter => {
                ErrorSource::Decode
            }
            FrameError::PayloadTooLarge { .. } => ErrorSource::SizeViolation,
        };
        Self::new(source, err.to_string())
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.source.name(), self.message)
    }
}

/// One unit of work for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Text(String),
    Binary(Bytes),
    Error(ErrorEvent),
    Lifecycle(LifecycleEvent),
}

impl Event {
    pub fn category(&self) -> Category {
        match self {
            Event::Text(_) => Category::Text,
            Event::Binary(_) => Category::Binary,
            Event::Error(_) => Category::Error,
            Event::Lifecycle(_) => Category::Lifecycle,
        }
    }
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Event::Text(text),
            Message::Binary(payload) => Event::Binary(payload),
            Message::Error(description) => {
                Event::Error(ErrorEvent::new(ErrorSource::Remote, description))
            }
        }
    }
}
