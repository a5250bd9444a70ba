//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use voicecast_core::{MediaBackend, TransportBackend};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port in the default range).
    /// Override: `VOICECAST_BIND_PORT`
    pub bind_port: u16,

    /// IP address the voice bridge can reach us at.
    /// If not specified, auto-detection will be attempted.
    /// Override: `VOICECAST_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Streaming transport: `simulated` or `bridge`.
    pub transport: TransportBackend,

    /// Base URL of the voice bridge sidecar.
    /// Override: `VOICECAST_BRIDGE_URL` (also selects the bridge transport)
    pub bridge_url: Option<String>,

    /// Media backend: `simulated` or `yt_dlp`.
    pub media: MediaBackend,

    /// Path or name of the `yt-dlp` executable.
    pub ytdlp_path: String,

    /// Directory downloaded audio is written to.
    /// Override: `VOICECAST_MEDIA_DIR`
    pub media_dir: Option<PathBuf>,

    /// Maximum pending items per chat (0 = unbounded).
    pub max_queue_len: usize,

    /// Longest a simulated stream runs (seconds).
    pub simulated_track_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = voicecast_core::Config::default();
        Self {
            bind_port: 0,
            advertise_ip: None,
            transport: core.transport,
            bridge_url: None,
            media: core.media,
            ytdlp_path: core.ytdlp_path,
            media_dir: None,
            max_queue_len: core.max_queue_len,
            simulated_track_secs: core.simulated_track_secs,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `VOICECAST_*` overrides looked up through `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("VOICECAST_BIND_PORT") {
            match val.parse() {
                Ok(port) => self.bind_port = port,
                Err(_) => log::warn!("Ignoring invalid VOICECAST_BIND_PORT: {}", val),
            }
        }

        if let Some(val) = var("VOICECAST_ADVERTISE_IP") {
            match val.parse() {
                Ok(ip) => self.advertise_ip = Some(ip),
                Err(_) => log::warn!("Ignoring invalid VOICECAST_ADVERTISE_IP: {}", val),
            }
        }

        if let Some(url) = var("VOICECAST_BRIDGE_URL").filter(|v| !v.is_empty()) {
            self.bridge_url = Some(url);
            self.transport = TransportBackend::Bridge;
        }

        if let Some(dir) = var("VOICECAST_MEDIA_DIR").filter(|v| !v.is_empty()) {
            self.media_dir = Some(PathBuf::from(dir));
        }
    }

    /// Converts to voicecast-core's Config type.
    pub fn to_core_config(&self) -> voicecast_core::Config {
        let defaults = voicecast_core::Config::default();
        voicecast_core::Config {
            preferred_port: self.bind_port,
            max_queue_len: self.max_queue_len,
            transport: self.transport,
            media: self.media,
            bridge_url: self.bridge_url.clone(),
            ytdlp_path: self.ytdlp_path.clone(),
            media_dir: self.media_dir.clone().unwrap_or(defaults.media_dir.clone()),
            simulated_track_secs: self.simulated_track_secs,
            ..defaults
        }
    }
}
