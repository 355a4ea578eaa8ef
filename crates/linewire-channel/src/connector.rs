use std::path::Path;

#[cfg(unix)]
use linewire_transport::UnixSocketListener;

use crate::channel::MessageChannel;
use crate::config::ChannelConfig;
use crate::error::Result;

/// Connect to a listening endpoint with default config.
///
/// The returned channel is not started yet, so listeners can be registered
/// before the first inbound message is read.
pub fn connect(path: impl AsRef<Path>) -> Result<MessageChannel> {
    connect_with_config(path, ChannelConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(
    path: impl AsRef<Path>,
    config: ChannelConfig,
) -> Result<MessageChannel> {
    #[cfg(not(unix))]
    {
        let _ = config;
        let path = path.as_ref().to_path_buf();
        return Err(linewire_transport::TransportError::Connect {
            path,
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "linewire sockets require Unix domain sockets",
            ),
        }
        .into());
    }

    #[cfg(unix)]
    {
        let stream = UnixSocketListener::connect(path)?;
        MessageChannel::from_stream_with_id("client", stream, config)
    }
}
