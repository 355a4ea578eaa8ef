use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use linewire_transport::UnixSocketListener;
use tracing::debug;

use crate::channel::MessageChannel;
use crate::config::ChannelConfig;
use crate::error::Result;

/// Accepts connections and wraps each one in a [`MessageChannel`].
pub struct ChannelListener {
    socket: UnixSocketListener,
    config: ChannelConfig,
    next_channel_id: AtomicU64,
}

impl ChannelListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let socket = UnixSocketListener::bind(path)?;
        Ok(Self {
            socket,
            config: ChannelConfig::default(),
            next_channel_id: AtomicU64::new(1),
        })
    }

    /// Override the config applied to accepted channels.
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection. The channel is returned unstarted.
    pub fn accept(&self) -> Result<MessageChannel> {
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        self.accept_with_id(&format!("channel-{id}"))
    }

    /// Accept the next connection and use an explicit channel id.
    pub fn accept_with_id(&self, channel_id: &str) -> Result<MessageChannel> {
        let stream = self.socket.accept()?;
        debug!(channel = channel_id, "accepted channel");
        MessageChannel::from_stream_with_id(channel_id, stream, self.config.clone())
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}
