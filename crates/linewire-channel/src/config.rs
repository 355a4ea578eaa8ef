use std::path::Path;
use std::time::Duration;

use linewire_frame::buffer::DEFAULT_READ_CHUNK;
use linewire_frame::Limits;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Default prefix for the background thread names.
pub const DEFAULT_THREAD_PREFIX: &str = "linewire";

/// Channel behavior config.
///
/// Every field has a default, so a JSON file only needs the keys it changes:
///
/// ```json
/// { "limits": { "max_text_chars": 1024 }, "read_timeout_ms": 250 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Size limits for both directions.
    pub limits: Limits,
    /// Bytes requested per underlying read.
    pub read_chunk_size: usize,
    /// Read timeout applied to socket streams. `None` blocks until data or shutdown.
    pub read_timeout_ms: Option<u64>,
    /// Write timeout applied to socket streams.
    pub write_timeout_ms: Option<u64>,
    /// Reader and dispatcher threads are named `<prefix>-reader` and `<prefix>-dispatch`.
    pub thread_name_prefix: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_chunk_size: DEFAULT_READ_CHUNK,
            read_timeout_ms: None,
            write_timeout_ms: None,
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }
}

impl ChannelConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ChannelError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn thread_name(&self, role: &str) -> String {
        format!("{}-{role}", self.thread_name_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(
            ChannelConfig::from_json_str("{}").unwrap(),
            ChannelConfig::default()
        );
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = ChannelConfig::from_json_str(
            r#"{ "limits": { "max_text_chars": 5 }, "read_timeout_ms": 250 }"#,
        )
        .unwrap();

        assert_eq!(config.limits.max_text_chars, 5);
        assert_eq!(config.limits.max_binary_bytes, Limits::default().max_binary_bytes);
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.write_timeout(), None);
        assert_eq!(config.thread_name("reader"), "linewire-reader");
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            ChannelConfig::from_json_str("{ not json"),
            Err(ChannelError::Json(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = std::env::temp_dir().join(format!("lw-missing-{}.json", std::process::id()));
        match ChannelConfig::from_json_file(&path) {
            Err(ChannelError::ConfigIo { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("lw-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "thread_name_prefix": "svc" }"#).unwrap();

        let config = ChannelConfig::from_json_file(&path).unwrap();
        assert_eq!(config.thread_name("dispatch"), "svc-dispatch");

        let _ = std::fs::remove_file(&path);
    }
}
