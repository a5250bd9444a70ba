//! Event system for observing playback from outside the session core.
//!
//! This module provides:
//! - [`EventEmitter`] trait the session actors emit through
//! - [`BroadcastEventBridge`] for the SSE transport
//! - Event types for playback transitions and registry lifecycle
//!
//! Events are informational only. Nothing in the core subscribes to them.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::session::ChatId;

/// Events broadcast to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Transitions of a chat's playback.
    Playback(PlaybackEvent),

    /// Sessions appearing in or leaving the registry.
    Registry(RegistryEvent),
}

/// Observable transitions of a single chat session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PlaybackEvent {
    /// A new item became `current` (first play, skip or queue advance).
    Started {
        chat_id: ChatId,
        title: String,
        duration_secs: u32,
        /// Generation the stream runs under.
        generation: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// An item was appended to the pending queue.
    Queued {
        chat_id: ChatId,
        title: String,
        /// 1-based position in the pending queue.
        position: usize,
        timestamp: u64,
    },
    Paused {
        chat_id: ChatId,
        timestamp: u64,
    },
    Resumed {
        chat_id: ChatId,
        timestamp: u64,
    },
    VolumeChanged {
        chat_id: ChatId,
        level: u8,
        timestamp: u64,
    },
    /// Playback was torn down and the room left.
    Stopped {
        chat_id: ChatId,
        timestamp: u64,
    },
    /// An item could not be fetched or streamed and was skipped.
    ItemFailed {
        chat_id: ChatId,
        title: String,
        error: String,
        timestamp: u64,
    },
    /// The transport reported the current stream finished.
    StreamEnded {
        chat_id: ChatId,
        generation: u64,
        timestamp: u64,
    },
}

/// Registry membership changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RegistryEvent {
    SessionOpened { chat_id: ChatId, timestamp: u64 },
    SessionClosed { chat_id: ChatId, timestamp: u64 },
}

impl PlaybackEvent {
    /// Chat the event belongs to.
    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::Started { chat_id, .. }
            | Self::Queued { chat_id, .. }
            | Self::Paused { chat_id, .. }
            | Self::Resumed { chat_id, .. }
            | Self::VolumeChanged { chat_id, .. }
            | Self::Stopped { chat_id, .. }
            | Self::ItemFailed { chat_id, .. }
            | Self::StreamEnded { chat_id, .. } => *chat_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_event_serializes_with_category_and_camel_case_fields() {
        let event = BroadcastEvent::Playback(PlaybackEvent::Started {
            chat_id: -100,
            title: "song1".into(),
            duration_secs: 213,
            generation: 1,
            timestamp: 42,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "playback");
        assert_eq!(json["type"], "started");
        assert_eq!(json["chatId"], -100);
        assert_eq!(json["durationSecs"], 213);
    }

    #[test]
    fn registry_event_serializes_type_tag() {
        let event = BroadcastEvent::Registry(RegistryEvent::SessionClosed {
            chat_id: -7,
            timestamp: 1,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "registry");
        assert_eq!(json["type"], "sessionClosed");
    }
}
