//! Bidirectional message channels over a byte stream.
//!
//! A [`MessageChannel`] owns two background threads: a reader decoding
//! inbound frames and a dispatcher delivering events to listeners. Listeners
//! run one at a time, in arrival order, and are never re-entered. A listener
//! that returns `Err` or panics is reported to the peer as an error frame;
//! dispatch continues.
//!
//! Any stream, decode or size failure stops the channel after one error
//! event. A remote error report is delivered to error listeners and leaves
//! the channel running.

pub mod channel;
pub mod config;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod event;
mod input;
pub mod lifecycle;
#[cfg(unix)]
pub mod listener;

pub use channel::{ChannelSender, MessageChannel};
pub use config::{ChannelConfig, DEFAULT_THREAD_PREFIX};
pub use connector::{connect, connect_with_config};
pub use dispatch::{BoxError, ListenerId, ListenerResult};
pub use error::{ChannelError, Result};
pub use event::{Category, ErrorEvent, ErrorSource, Event, LifecycleEvent};
pub use lifecycle::ChannelState;
#[cfg(unix)]
pub use listener::ChannelListener;
