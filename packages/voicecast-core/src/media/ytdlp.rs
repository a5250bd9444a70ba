//! `yt-dlp` backed resolver and fetcher.
//!
//! Resolution runs `yt-dlp --dump-single-json` and reads the first entry;
//! fetching downloads the best audio stream into the media directory and
//! converts it to mp3. Both are bounded by configured timeouts and the child
//! process is killed when the timeout drops it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::{FetchError, MediaFetcher, MediaHandle, MediaInfo, MediaResolver, ResolveError};

/// Media adapter driving the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpMedia {
    binary: String,
    media_dir: PathBuf,
    resolve_timeout: Duration,
    fetch_timeout: Duration,
    /// Prefixes each download so concurrent fetches of one video never share a file.
    downloads: Arc<AtomicU64>,
}

impl YtDlpMedia {
    pub fn new(
        binary: impl Into<String>,
        media_dir: impl Into<PathBuf>,
        resolve_timeout: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            media_dir: media_dir.into(),
            resolve_timeout,
            fetch_timeout,
            downloads: Arc::new(AtomicU64::new(0)),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.kill_on_drop(true).stdin(std::process::Stdio::null());
        cmd
    }
}

#[async_trait]
impl MediaResolver for YtDlpMedia {
    async fn resolve(&self, query: &str) -> Result<MediaInfo, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NotFound);
        }

        let mut cmd = self.command();
        cmd.args([
            "--dump-single-json",
            "--no-playlist",
            "--no-warnings",
            "--skip-download",
            "--default-search",
            "ytsearch",
            query,
        ]);

        log::debug!("[YtDlp] Resolving {:?}", query);
        let output = tokio::time::timeout(self.resolve_timeout, cmd.output())
            .await
            .map_err(|_| {
                ResolveError::Failed(format!(
                    "timed out after {}s",
                    self.resolve_timeout.as_secs()
                ))
            })?
            .map_err(|e| ResolveError::Failed(format!("failed to spawn yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = stderr_excerpt(&output);
            log::warn!("[YtDlp] Resolve of {:?} failed: {}", query, stderr);
            return Err(ResolveError::Failed(stderr));
        }

        parse_media_info(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl MediaFetcher for YtDlpMedia {
    async fn fetch(&self, locator: &str) -> Result<MediaHandle, FetchError> {
        tokio::fs::create_dir_all(&self.media_dir).await?;
        let n = self.downloads.fetch_add(1, Ordering::Relaxed);
        let template = self.media_dir.join(format!("{n}-%(id)s.%(ext)s"));

        let mut cmd = self.command();
        cmd.arg("--format")
            .arg("bestaudio/best")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--audio-quality")
            .arg("192K")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--default-search")
            .arg("ytsearch")
            .arg("--output")
            .arg(&template)
            .arg("--print")
            .arg("after_move:filepath")
            .arg(locator);

        log::info!("[YtDlp] Fetching {}", locator);
        let output = tokio::time::timeout(self.fetch_timeout, cmd.output())
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = stderr_excerpt(&output);
            log::warn!("[YtDlp] Fetch of {} failed: {}", locator, stderr);
            return Err(FetchError::Failed(stderr));
        }

        let path = downloaded_path(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| FetchError::MissingOutput("yt-dlp printed no file path".into()))?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(FetchError::MissingOutput(path.display().to_string()));
        }

        Ok(MediaHandle::new(path.to_string_lossy()))
    }

    async fn release(&self, handle: &MediaHandle) {
        let path = Path::new(handle.as_str());
        if !path.starts_with(&self.media_dir) {
            log::debug!("[YtDlp] Not removing {} outside the media directory", handle);
            return;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => log::debug!("[YtDlp] Removed {}", handle),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("[YtDlp] Failed to remove {}: {}", handle, e),
        }
    }
}

/// Extracts [`MediaInfo`] from `--dump-single-json` output.
///
/// Search queries produce a playlist wrapper whose first entry is used; direct
/// URLs produce the video object itself.
pub(crate) fn parse_media_info(json: &str) -> Result<MediaInfo, ResolveError> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| ResolveError::Failed(format!("invalid yt-dlp output: {e}")))?;

    let entry = match root.get("entries") {
        Some(Value::Array(entries)) => entries.first().ok_or(ResolveError::NotFound)?,
        Some(_) => return Err(ResolveError::Failed("entries is not an array".into())),
        None => &root,
    };

    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or(ResolveError::NotFound)?
        .to_string();
    let duration_secs = entry
        .get("duration")
        .and_then(Value::as_f64)
        .map(|d| d.max(0.0).round() as u32)
        .unwrap_or(0);
    let source_url = entry
        .get("webpage_url")
        .or_else(|| entry.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(MediaInfo {
        title,
        duration_secs,
        source_url,
    })
}

/// Last non-empty stdout line, which `--print after_move:filepath` writes.
fn downloaded_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .map(|l| Path::new(l).to_path_buf())
}

fn stderr_excerpt(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no error output");
    format!("exit {}: {}", output.status.code().unwrap_or(-1), line.trim())
}
