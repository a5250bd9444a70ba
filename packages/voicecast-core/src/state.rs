//! Core configuration types.
//!
//! [`Config`] holds every tunable the session core and its adapters read.
//! The server binary builds one from YAML, environment and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which streaming transport the composition root wires in.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportBackend {
    /// In-memory rooms with timer-driven stream endings.
    #[default]
    Simulated,
    /// HTTP voice-bridge sidecar.
    Bridge,
}

/// Which resolver/fetcher pair the composition root wires in.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaBackend {
    /// Deterministic in-memory media.
    #[default]
    Simulated,
    /// The `yt-dlp` executable.
    YtDlp,
}

/// Configuration for the Voicecast application.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP server (0 = auto-allocate).
    pub preferred_port: u16,

    // Sessions
    /// Maximum pending items per chat (0 = unbounded).
    pub max_queue_len: usize,

    /// Capacity of each chat's inbound event queue.
    pub command_channel_capacity: usize,

    /// Capacity of the playback event broadcast channel.
    pub event_channel_capacity: usize,

    // Adapter timeouts
    /// Upper bound for a single resolve call (seconds).
    pub resolve_timeout_secs: u64,

    /// Upper bound for a single fetch call (seconds).
    pub fetch_timeout_secs: u64,

    /// Upper bound for a single bridge request (seconds).
    pub transport_timeout_secs: u64,

    // Adapters
    /// Streaming transport selection.
    pub transport: TransportBackend,

    /// Resolver/fetcher selection.
    pub media: MediaBackend,

    /// Base URL of the voice bridge (required for [`TransportBackend::Bridge`]).
    pub bridge_url: Option<String>,

    /// Path or name of the `yt-dlp` executable.
    pub ytdlp_path: String,

    /// Directory fetched audio files are written to.
    pub media_dir: PathBuf,

    /// Longest a simulated stream runs before ending (seconds).
    pub simulated_track_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            max_queue_len: 50,
            command_channel_capacity: 32,
            event_channel_capacity: 100,
            resolve_timeout_secs: 30,
            fetch_timeout_secs: 300,
            transport_timeout_secs: 10,
            transport: TransportBackend::default(),
            media: MediaBackend::default(),
            bridge_url: None,
            ytdlp_path: "yt-dlp".to_string(),
            media_dir: std::env::temp_dir().join("voicecast"),
            simulated_track_secs: 180,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.command_channel_capacity == 0 {
            return Err("command_channel_capacity must be >= 1 (mpsc::channel panics on 0)".into());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".into(),
            );
        }
        if self.resolve_timeout_secs == 0
            || self.fetch_timeout_secs == 0
            || self.transport_timeout_secs == 0
        {
            return Err("adapter timeouts must be >= 1 second".into());
        }
        if self.transport == TransportBackend::Bridge {
            match self.bridge_url.as_deref() {
                None | Some("") => {
                    return Err("bridge_url is required when transport = bridge".into());
                }
                Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                    return Err(format!("bridge_url must be an http(s) URL, got {url}"));
                }
                Some(_) => {}
            }
        }
        if self.media == MediaBackend::YtDlp && self.ytdlp_path.trim().is_empty() {
            return Err("ytdlp_path must not be empty when media = yt_dlp".into());
        }
        Ok(())
    }

    /// Queue cap as an `Option` (`None` = unbounded).
    #[must_use]
    pub fn queue_cap(&self) -> Option<usize> {
        (self.max_queue_len > 0).then_some(self.max_queue_len)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_command_capacity_is_rejected() {
        let config = Config {
            command_channel_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bridge_transport_requires_url() {
        let mut config = Config {
            transport: TransportBackend::Bridge,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.bridge_url = Some("bridge.local:9000".into());
        assert!(config.validate().is_err());

        config.bridge_url = Some("http://bridge.local:9000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_queue_len_means_unbounded() {
        let config = Config {
            max_queue_len: 0,
            ..Config::default()
        };
        assert_eq!(config.queue_cap(), None);
        assert_eq!(Config::default().queue_cap(), Some(50));
    }

    #[test]
    fn partial_yaml_like_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"transport":"bridge","bridge_url":"http://b:1"}"#).unwrap();
        assert_eq!(config.transport, TransportBackend::Bridge);
        assert_eq!(config.media, MediaBackend::Simulated);
        assert_eq!(config.command_channel_capacity, 32);
    }
}
