//! User-facing reply texts.

use super::types::{Command, QueueItem};
use crate::error::PlaybackError;
use crate::protocol_constants::MAX_VOLUME;

pub(crate) const NOTHING_PLAYING: &str = "I'm not playing anything in this chat.";
pub(crate) const NOTHING_TO_PAUSE: &str = "No active playback to pause.";
pub(crate) const NOTHING_TO_RESUME: &str = "No paused playback to resume.";
pub(crate) const NOTHING_FOR_VOLUME: &str = "No active playback to adjust volume.";
pub(crate) const EMPTY_QUEUE: &str = "No active playback or queue.";
pub(crate) const PAUSED: &str = "⏸ Music playback paused.";
pub(crate) const RESUMED: &str = "▶️ Music playback resumed.";
pub(crate) const QUEUE_EXHAUSTED: &str = "Nothing left to play, so I left the voice chat.";

pub(crate) const PLAY_USAGE: &str =
    "Please provide a song name or YouTube URL.\nExample: `/play despacito`";

pub(crate) fn volume_out_of_range() -> PlaybackError {
    PlaybackError::InvalidArgument(format!(
        "Volume level must be between 0 and {MAX_VOLUME}."
    ))
}

pub(crate) fn now_playing(item: &QueueItem) -> String {
    let mut reply = format!(
        "🎵 Now playing: **{}**\nDuration: {}",
        item.title,
        item.display_duration()
    );
    if !item.source_url.is_empty() {
        reply.push_str(&format!("\n{}", item.source_url));
    }
    reply
}

pub(crate) fn queued(item: &QueueItem, position: usize) -> String {
    format!(
        "🎶 Added to queue at position {}: **{}** ({})",
        position,
        item.title,
        item.display_duration()
    )
}

pub(crate) fn stopped(title: &str) -> String {
    format!("⏹ Stopped playing **{title}** and left the voice chat.")
}

pub(crate) fn skipped(title: &str) -> String {
    format!("⏭ Skipped **{title}**.")
}

pub(crate) fn skipped_queue_empty(title: &str) -> String {
    format!("⏭ Skipped **{title}**, queue empty. Left the voice chat.")
}

pub(crate) fn item_failed(title: &str, err: &PlaybackError) -> String {
    format!("❌ Could not play **{title}**: {err}")
}

pub(crate) fn volume_set(level: u8) -> String {
    format!("🔊 Volume set to {level}%.")
}

pub(crate) fn queue_listing(current: Option<&QueueItem>, pending: &[&QueueItem]) -> String {
    if current.is_none() && pending.is_empty() {
        return EMPTY_QUEUE.to_string();
    }
    let mut lines = vec!["Current queue:".to_string()];
    let mut index = 1;
    if let Some(item) = current {
        lines.push(format!(
            "{}. {} [{}] (now playing)",
            index,
            item.title,
            item.display_duration()
        ));
        index += 1;
    }
    for item in pending {
        lines.push(format!("{}. {} [{}]", index, item.title, item.display_duration()));
        index += 1;
    }
    lines.join("\n")
}

/// Reply for a non-`play` command addressed to a chat with no session.
///
/// Matches what a session with nothing playing answers, so the registry can
/// skip creating one.
pub(crate) fn idle_reply(command: &Command) -> String {
    match command {
        Command::Play { .. } | Command::Stop | Command::Skip => NOTHING_PLAYING.to_string(),
        Command::Pause => NOTHING_TO_PAUSE.to_string(),
        Command::Resume => NOTHING_TO_RESUME.to_string(),
        Command::Volume { level } if !(0..=i64::from(MAX_VOLUME)).contains(level) => {
            volume_out_of_range().to_reply()
        }
        Command::Volume { .. } => NOTHING_FOR_VOLUME.to_string(),
        Command::Queue => EMPTY_QUEUE.to_string(),
    }
}
