//! Data model shared by the session state machine, its actor and the registry.

use serde::Serialize;

use crate::media::{MediaHandle, MediaInfo};
use crate::utils::format_duration;

/// Chat identifier. Group chats are negative, one-to-one conversations positive.
pub type ChatId = i64;

/// Kind of conversation a chat id denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Group,
    Private,
}

impl ChatKind {
    #[must_use]
    pub fn of(chat_id: ChatId) -> Self {
        if chat_id > 0 {
            Self::Private
        } else {
            Self::Group
        }
    }
}

/// Playback state of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Provisioning,
    Fetching,
    Playing,
    Paused,
}

impl SessionStatus {
    /// True for the states in which `current` is set.
    #[must_use]
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// A resolved request waiting for (or undergoing) playback.
///
/// Immutable once created except `media_handle`, which the fetch step sets
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub title: String,
    pub duration_secs: u32,
    /// The query or URL the user asked for.
    pub source_locator: String,
    /// Canonical URL reported by the resolver (may be empty).
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_handle: Option<MediaHandle>,
}

impl QueueItem {
    pub fn new(source_locator: impl Into<String>, info: MediaInfo) -> Self {
        Self {
            title: info.title,
            duration_secs: info.duration_secs,
            source_locator: source_locator.into(),
            source_url: info.source_url,
            media_handle: None,
        }
    }

    /// What the fetcher is asked to download: the resolved URL when known,
    /// otherwise the original request.
    #[must_use]
    pub fn fetch_locator(&self) -> &str {
        if self.source_url.is_empty() {
            &self.source_locator
        } else {
            &self.source_url
        }
    }

    #[must_use]
    pub fn media_handle(&self) -> Option<&MediaHandle> {
        self.media_handle.as_ref()
    }

    /// Records the fetched handle. Returns false (and keeps the first handle)
    /// if one was already set.
    pub fn set_media_handle(&mut self, handle: MediaHandle) -> bool {
        if self.media_handle.is_some() {
            return false;
        }
        self.media_handle = Some(handle);
        true
    }

    #[must_use]
    pub fn display_duration(&self) -> String {
        format_duration(self.duration_secs)
    }
}

/// Read-only view of a session, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub chat_id: ChatId,
    pub status: SessionStatus,
    pub current: Option<QueueItem>,
    pub queue: Vec<QueueItem>,
    pub generation: u64,
    pub volume: u8,
}

impl SessionSnapshot {
    /// True when the registry may drop the session.
    #[must_use]
    pub fn is_idle_and_empty(&self) -> bool {
        self.status == SessionStatus::Idle && self.current.is_none() && self.queue.is_empty()
    }
}

/// User command accepted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play { query: String },
    Stop,
    Skip,
    Pause,
    Resume,
    /// Raw level as typed; range-checked by the session.
    Volume { level: i64 },
    Queue,
}

impl Command {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Stop => "stop",
            Self::Skip => "skip",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Volume { .. } => "volume",
            Self::Queue => "queue",
        }
    }
}

/// Anything applied to a session through its actor.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Command(Command),
    /// The transport reported the stream started under `generation` finished.
    StreamEnded { generation: u64 },
}
