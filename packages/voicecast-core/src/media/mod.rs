//! Media resolution and fetching capabilities.
//!
//! The session core only sees the [`MediaResolver`] and [`MediaFetcher`]
//! traits. Implementations:
//! - [`YtDlpMedia`]: drives the `yt-dlp` executable
//! - [`SimulatedMedia`]: deterministic, in-memory

mod simulated;
mod ytdlp;

pub use simulated::SimulatedMedia;
pub use ytdlp::YtDlpMedia;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata for a resolved query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    /// Total length in seconds (0 when unknown, e.g. live streams).
    pub duration_secs: u32,
    /// Canonical page URL of the media.
    pub source_url: String,
}

/// Opaque handle to locally playable media, produced by [`MediaFetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaHandle(String);

impl MediaHandle {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from [`MediaResolver::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The query matched nothing.
    #[error("no results")]
    NotFound,

    /// The resolver itself failed (process error, timeout, bad output).
    #[error("resolver failed: {0}")]
    Failed(String),
}

/// Errors from [`MediaFetcher::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0}s")]
    Timeout(u64),

    #[error("downloader failed: {0}")]
    Failed(String),

    #[error("downloaded file missing: {0}")]
    MissingOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a search query or URL into [`MediaInfo`].
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<MediaInfo, ResolveError>;
}

/// Produces a locally playable handle for a locator.
///
/// Called from the issuing chat's actor only, so a slow fetch holds up that
/// chat alone.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<MediaHandle, FetchError>;

    /// Frees what `fetch` produced once the handle is no longer streamed.
    async fn release(&self, _handle: &MediaHandle) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Combined resolver + fetcher, used as `Arc<dyn MediaSource>` by sessions.
pub trait MediaSource: MediaResolver + MediaFetcher {}

/// Blanket implementation for any type implementing both traits.
impl<T: MediaResolver + MediaFetcher> MediaSource for T {}
