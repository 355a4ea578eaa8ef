/// Errors returned by channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] linewire_transport::TransportError),

    /// Encoding, decoding or stream I/O error.
    #[error("frame error: {0}")]
    Frame(#[from] linewire_frame::FrameError),

    /// The operation is not allowed in the channel's current state.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    /// Configuration could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Configuration is not valid JSON for [`crate::ChannelConfig`].
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
