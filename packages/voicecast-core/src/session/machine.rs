//! Per-chat playback state machine.
//!
//! [`ChatSession`] owns the current item, the pending queue and the generation
//! counter of one chat. It is only ever driven by that chat's actor, one event
//! at a time, so none of its fields need locking. Every transition catches its
//! own errors, turns them into a reply and leaves the session in a
//! well-defined state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::replies;
use super::types::{ChatId, Command, QueueItem, SessionEvent, SessionSnapshot, SessionStatus};
use crate::error::PlaybackError;
use crate::events::{EventEmitter, PlaybackEvent};
use crate::media::MediaSource;
use crate::protocol_constants::{DEFAULT_VOLUME, MAX_VOLUME};
use crate::transport::{StreamRequest, StreamTransport};
use crate::utils::now_millis;

/// Generation numbers shared by every session of a registry.
///
/// A chat that closes and reopens its session never sees a number twice, so a
/// late `StreamEnded` from the closed session cannot match the new stream.
#[derive(Debug, Clone, Default)]
pub struct Generations(Arc<AtomicU64>);

impl Generations {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Collaborators a session needs. Shared by every session of a registry.
#[derive(Clone)]
pub struct SessionDeps {
    pub media: Arc<dyn MediaSource>,
    pub transport: Arc<dyn StreamTransport>,
    pub emitter: Arc<dyn EventEmitter>,
    pub generations: Generations,
    /// Pending queue cap (`None` = unbounded).
    pub max_queue_len: Option<usize>,
}

/// State of a single chat's playback.
pub struct ChatSession {
    chat_id: ChatId,
    status: SessionStatus,
    current: Option<QueueItem>,
    pending: VecDeque<QueueItem>,
    generation: u64,
    room_joined: bool,
    volume: u8,
    deps: SessionDeps,
}

impl ChatSession {
    pub fn new(chat_id: ChatId, deps: SessionDeps) -> Self {
        Self {
            chat_id,
            status: SessionStatus::Idle,
            current: None,
            pending: VecDeque::new(),
            generation: 0,
            room_joined: false,
            volume: DEFAULT_VOLUME,
            deps,
        }
    }

    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            chat_id: self.chat_id,
            status: self.status,
            current: self.current.clone(),
            queue: self.pending.iter().cloned().collect(),
            generation: self.generation,
            volume: self.volume,
        }
    }

    /// Applies one event. Commands always produce a reply; lifecycle events
    /// never do.
    pub async fn apply(&mut self, event: SessionEvent) -> Option<String> {
        match event {
            SessionEvent::Command(command) => {
                let name = command.name();
                let reply = match self.handle_command(command).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        log::info!("[Session] Chat {} /{} rejected: {}", self.chat_id, name, e);
                        e.to_reply()
                    }
                };
                Some(reply)
            }
            SessionEvent::StreamEnded { generation } => {
                self.on_stream_ended(generation).await;
                None
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<String, PlaybackError> {
        match command {
            Command::Play { query } => self.play(&query).await,
            Command::Stop => Ok(self.stop().await),
            Command::Skip => Ok(self.skip().await),
            Command::Pause => self.pause().await,
            Command::Resume => self.resume().await,
            Command::Volume { level } => self.set_volume(level).await,
            Command::Queue => Ok(self.queue_listing()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    async fn play(&mut self, query: &str) -> Result<String, PlaybackError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PlaybackError::InvalidArgument(replies::PLAY_USAGE.into()));
        }

        if self.current.is_some() {
            if let Some(cap) = self.deps.max_queue_len {
                if self.pending.len() >= cap {
                    return Err(PlaybackError::QueueFull(cap));
                }
            }
        }

        let info = self.deps.media.resolve(query).await.map_err(|e| {
            log::warn!("[Session] Chat {} resolve of {:?} failed: {}", self.chat_id, query, e);
            PlaybackError::from(e)
        })?;
        let item = QueueItem::new(query, info);

        if self.current.is_some() {
            let reply = replies::queued(&item, self.pending.len() + 1);
            self.emit(PlaybackEvent::Queued {
                chat_id: self.chat_id,
                title: item.title.clone(),
                position: self.pending.len() + 1,
                timestamp: now_millis(),
            });
            log::info!(
                "[Session] Chat {} queued {:?} at position {}",
                self.chat_id,
                item.title,
                self.pending.len() + 1
            );
            self.pending.push_back(item);
            return Ok(reply);
        }

        self.status = SessionStatus::Provisioning;
        if let Err(e) = self.ensure_room().await {
            self.status = SessionStatus::Idle;
            return Err(e);
        }

        let mut lines = Vec::new();
        if !self.advance(Some(item), &mut lines).await {
            self.teardown().await;
        }
        Ok(lines.join("\n"))
    }

    async fn stop(&mut self) -> String {
        let Some(title) = self.current.as_ref().map(|c| c.title.clone()) else {
            return replies::NOTHING_PLAYING.to_string();
        };
        log::info!("[Session] Chat {} stop", self.chat_id);
        self.teardown().await;
        replies::stopped(&title)
    }

    async fn skip(&mut self) -> String {
        let Some(title) = self.current.as_ref().map(|c| c.title.clone()) else {
            return replies::NOTHING_PLAYING.to_string();
        };
        log::info!("[Session] Chat {} skip {:?}", self.chat_id, title);

        if self.pending.is_empty() {
            self.teardown().await;
            return replies::skipped_queue_empty(&title);
        }

        let mut lines = vec![replies::skipped(&title)];
        if !self.advance(None, &mut lines).await {
            self.teardown().await;
            lines.push(replies::QUEUE_EXHAUSTED.to_string());
        }
        lines.join("\n")
    }

    async fn pause(&mut self) -> Result<String, PlaybackError> {
        if self.status != SessionStatus::Playing {
            return Ok(replies::NOTHING_TO_PAUSE.to_string());
        }
        self.deps.transport.pause(self.chat_id).await?;
        self.status = SessionStatus::Paused;
        self.emit(PlaybackEvent::Paused {
            chat_id: self.chat_id,
            timestamp: now_millis(),
        });
        Ok(replies::PAUSED.to_string())
    }

    async fn resume(&mut self) -> Result<String, PlaybackError> {
        if self.status != SessionStatus::Paused {
            return Ok(replies::NOTHING_TO_RESUME.to_string());
        }
        self.deps.transport.resume(self.chat_id).await?;
        self.status = SessionStatus::Playing;
        self.emit(PlaybackEvent::Resumed {
            chat_id: self.chat_id,
            timestamp: now_millis(),
        });
        Ok(replies::RESUMED.to_string())
    }

    async fn set_volume(&mut self, level: i64) -> Result<String, PlaybackError> {
        let level = u8::try_from(level)
            .ok()
            .filter(|l| *l <= MAX_VOLUME)
            .ok_or_else(replies::volume_out_of_range)?;
        if !self.status.is_streaming() {
            return Ok(replies::NOTHING_FOR_VOLUME.to_string());
        }
        self.deps.transport.set_volume(self.chat_id, level).await?;
        self.volume = level;
        self.emit(PlaybackEvent::VolumeChanged {
            chat_id: self.chat_id,
            level,
            timestamp: now_millis(),
        });
        Ok(replies::volume_set(level))
    }

    fn queue_listing(&self) -> String {
        let pending: Vec<&QueueItem> = self.pending.iter().collect();
        replies::queue_listing(self.current.as_ref(), &pending)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    async fn on_stream_ended(&mut self, generation: u64) {
        if self.current.is_none() || generation != self.generation {
            log::debug!(
                "[Session] Chat {} ignoring stale StreamEnded (event generation {}, current {})",
                self.chat_id,
                generation,
                self.generation
            );
            return;
        }

        log::info!("[Session] Chat {} stream {} ended", self.chat_id, generation);
        self.emit(PlaybackEvent::StreamEnded {
            chat_id: self.chat_id,
            generation,
            timestamp: now_millis(),
        });

        // Failures here have no requester to reply to; they surface as
        // ItemFailed events.
        let mut lines = Vec::new();
        if !self.advance(None, &mut lines).await {
            self.teardown().await;
        }
    }

    /// Leaves the room and clears everything; used when the dispatcher shuts down.
    pub async fn shutdown(&mut self) {
        if self.room_joined || self.current.is_some() {
            self.teardown().await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transition helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn ensure_room(&mut self) -> Result<(), PlaybackError> {
        if self.room_joined {
            return Ok(());
        }
        self.deps
            .transport
            .provision(self.chat_id)
            .await
            .map_err(|e| {
                log::warn!("[Session] Chat {} provisioning failed: {}", self.chat_id, e);
                PlaybackError::from(e)
            })?;
        self.room_joined = true;
        Ok(())
    }

    /// Streams `first` (or the queue head), falling through to later queue
    /// items until one succeeds. Each failure adds a line to `lines`.
    ///
    /// Returns false once the queue is exhausted without anything streaming;
    /// the caller then tears the session down.
    async fn advance(&mut self, first: Option<QueueItem>, lines: &mut Vec<String>) -> bool {
        let mut next = first.or_else(|| self.pending.pop_front());
        while let Some(item) = next {
            let title = item.title.clone();
            match self.stream_item(item).await {
                Ok(()) => {
                    if let Some(current) = &self.current {
                        lines.push(replies::now_playing(current));
                    }
                    return true;
                }
                Err(e) => {
                    log::warn!("[Session] Chat {} could not play {:?}: {}", self.chat_id, title, e);
                    lines.push(replies::item_failed(&title, &e));
                    self.emit(PlaybackEvent::ItemFailed {
                        chat_id: self.chat_id,
                        title,
                        error: e.to_string(),
                        timestamp: now_millis(),
                    });
                }
            }
            next = self.pending.pop_front();
        }
        false
    }

    /// Fetches `item` and pushes it to the room, replacing the active stream
    /// when one exists. On success `item` becomes `current` under a new
    /// generation.
    async fn stream_item(&mut self, mut item: QueueItem) -> Result<(), PlaybackError> {
        let replacing = self.current.is_some();
        if !replacing {
            self.status = SessionStatus::Fetching;
        }

        let handle = match item.media_handle() {
            Some(handle) => handle.clone(),
            None => {
                let handle = self.deps.media.fetch(item.fetch_locator()).await?;
                item.set_media_handle(handle.clone());
                handle
            }
        };

        let generation = self.deps.generations.next();
        let request = StreamRequest {
            handle,
            generation,
            duration_secs: item.duration_secs,
        };
        let pushed = if replacing {
            self.deps
                .transport
                .replace_stream(self.chat_id, request)
                .await
        } else {
            self.deps.transport.start_stream(self.chat_id, request).await
        };
        if let Err(e) = pushed {
            self.release(&item).await;
            return Err(e.into());
        }

        log::info!(
            "[Session] Chat {} now playing {:?} (generation {})",
            self.chat_id,
            item.title,
            generation
        );
        self.emit(PlaybackEvent::Started {
            chat_id: self.chat_id,
            title: item.title.clone(),
            duration_secs: item.duration_secs,
            generation,
            timestamp: now_millis(),
        });
        self.generation = generation;
        let previous = self.current.replace(item);
        self.status = SessionStatus::Playing;
        if let Some(previous) = previous {
            self.release(&previous).await;
        }
        Ok(())
    }

    /// Leaves the room and returns to Idle with nothing queued.
    async fn teardown(&mut self) {
        if self.room_joined {
            if let Err(e) = self.deps.transport.leave(self.chat_id).await {
                log::warn!("[Session] Chat {} failed to leave room: {}", self.chat_id, e);
            }
            self.room_joined = false;
        }
        if let Some(item) = self.current.take() {
            self.release(&item).await;
        }
        self.pending.clear();
        self.generation = self.deps.generations.next();
        self.status = SessionStatus::Idle;
        log::info!("[Session] Chat {} idle", self.chat_id);
        self.emit(PlaybackEvent::Stopped {
            chat_id: self.chat_id,
            timestamp: now_millis(),
        });
    }

    async fn release(&self, item: &QueueItem) {
        if let Some(handle) = item.media_handle() {
            self.deps.media.release(handle).await;
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        self.deps.emitter.emit_playback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_fixtures::{deps, RecordingTransport, ScriptedMedia, TransportCall};
    use crate::transport::TransportError;

    fn play(query: &str) -> SessionEvent {
        SessionEvent::Command(Command::Play {
            query: query.into(),
        })
    }

    fn command(command: Command) -> SessionEvent {
        SessionEvent::Command(command)
    }

    #[tokio::test]
    async fn play_on_idle_session_reaches_playing() {
        let media = ScriptedMedia::with_tracks(&["song1"]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-100, deps(&media, &transport));

        let reply = session.apply(play("song1")).await.unwrap();

        assert!(reply.contains("song1"), "reply: {reply}");
        let snap = session.snapshot();
        assert_eq!(snap.status, SessionStatus::Playing);
        assert_eq!(snap.generation, 1);
        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::Provision(-100),
                TransportCall::Start(-100, 1),
            ]
        );
    }

    #[tokio::test]
    async fn not_found_keeps_session_idle() {
        let media = ScriptedMedia::with_tracks(&[]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));

        let reply = session.apply(play("missing")).await.unwrap();

        assert_eq!(reply, PlaybackError::NotFound.to_reply());
        assert!(session.snapshot().is_idle_and_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn provisioning_failure_returns_to_idle() {
        let media = ScriptedMedia::with_tracks(&["a"]);
        let transport = RecordingTransport::new();
        transport.fail_provision(crate::transport::ProvisionError::NotAdmin);
        let mut session = ChatSession::new(-1, deps(&media, &transport));

        let reply = session.apply(play("a")).await.unwrap();

        assert_eq!(reply, PlaybackError::NotAdmin.to_reply());
        assert!(session.snapshot().is_idle_and_empty());
    }

    #[tokio::test]
    async fn stop_is_idempotent_on_idle_session() {
        let media = ScriptedMedia::with_tracks(&[]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        let before = session.snapshot();

        let reply = session.apply(command(Command::Stop)).await.unwrap();

        assert_eq!(reply, replies::NOTHING_PLAYING);
        assert_eq!(session.snapshot(), before);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_leaves_room_and_bumps_generation() {
        let media = ScriptedMedia::with_tracks(&["a", "b"]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        session.apply(play("a")).await;
        session.apply(play("b")).await;

        let reply = session.apply(command(Command::Stop)).await.unwrap();

        assert!(reply.contains("Stopped playing **a**"));
        let snap = session.snapshot();
        assert!(snap.is_idle_and_empty());
        assert_eq!(snap.generation, 2);
        assert_eq!(transport.calls().last(), Some(&TransportCall::Leave(-1)));
    }

    #[tokio::test]
    async fn stale_stream_end_after_stop_is_ignored() {
        let media = ScriptedMedia::with_tracks(&["a"]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        session.apply(play("a")).await;
        session.apply(command(Command::Stop)).await;
        let before = session.snapshot();
        let calls_before = transport.calls().len();

        assert!(session
            .apply(SessionEvent::StreamEnded { generation: 1 })
            .await
            .is_none());

        assert_eq!(session.snapshot(), before);
        assert_eq!(transport.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn stale_stream_end_after_skip_does_not_advance() {
        let media = ScriptedMedia::with_tracks(&["a", "b", "c"]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        session.apply(play("a")).await;
        session.apply(play("b")).await;
        session.apply(play("c")).await;
        session.apply(command(Command::Skip)).await;

        session
            .apply(SessionEvent::StreamEnded { generation: 1 })
            .await;

        let snap = session.snapshot();
        assert_eq!(snap.current.map(|c| c.title), Some("b".to_string()));
        assert_eq!(snap.queue.len(), 1);
        assert_eq!(snap.generation, 2);
    }

    #[tokio::test]
    async fn failing_queue_head_is_skipped_automatically() {
        let media = ScriptedMedia::with_tracks(&["a", "b", "c", "d"]);
        media.fail_fetch("b");
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        session.apply(play("a")).await;
        session.apply(play("b")).await;
        session.apply(play("c")).await;
        session.apply(play("d")).await;

        session
            .apply(SessionEvent::StreamEnded { generation: 1 })
            .await;

        let snap = session.snapshot();
        assert_eq!(snap.current.map(|c| c.title), Some("c".to_string()));
        assert_eq!(snap.queue.iter().map(|i| i.title.as_str()).collect::<Vec<_>>(), ["d"]);
        assert_eq!(snap.status, SessionStatus::Playing);
    }

    #[tokio::test]
    async fn skip_reports_each_failure_then_outcome() {
        let media = ScriptedMedia::with_tracks(&["a", "b", "c"]);
        media.fail_fetch("b");
        media.fail_fetch("c");
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        session.apply(play("a")).await;
        session.apply(play("b")).await;
        session.apply(play("c")).await;

        let reply = session.apply(command(Command::Skip)).await.unwrap();

        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines[0], "⏭ Skipped **a**.");
        assert!(lines[1].contains("**b**"));
        assert!(lines[2].contains("**c**"));
        assert_eq!(lines[3], replies::QUEUE_EXHAUSTED);
        assert!(session.snapshot().is_idle_and_empty());
        assert_eq!(transport.calls().last(), Some(&TransportCall::Leave(-1)));
    }

    #[tokio::test]
    async fn volume_bounds_are_enforced() {
        let media = ScriptedMedia::with_tracks(&["a", "b"]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        session.apply(play("a")).await;
        session.apply(play("b")).await;
        let before = session.snapshot();

        let reply = session
            .apply(command(Command::Volume { level: 150 }))
            .await
            .unwrap();
        assert_eq!(reply, replies::volume_out_of_range().to_reply());
        assert_eq!(session.snapshot(), before);

        let reply = session
            .apply(command(Command::Volume { level: 50 }))
            .await
            .unwrap();
        assert_eq!(reply, "🔊 Volume set to 50%.");
        let after = session.snapshot();
        assert_eq!(after.current, before.current);
        assert_eq!(after.queue, before.queue);
        assert_eq!(after.volume, 50);
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_status() {
        let media = ScriptedMedia::with_tracks(&["a"]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));

        let reply = session.apply(command(Command::Pause)).await.unwrap();
        assert_eq!(reply, replies::NOTHING_TO_PAUSE);

        session.apply(play("a")).await;
        session.apply(command(Command::Pause)).await;
        assert_eq!(session.snapshot().status, SessionStatus::Paused);

        let reply = session.apply(command(Command::Pause)).await.unwrap();
        assert_eq!(reply, replies::NOTHING_TO_PAUSE);

        session.apply(command(Command::Resume)).await;
        assert_eq!(session.snapshot().status, SessionStatus::Playing);
    }

    #[tokio::test]
    async fn queue_cap_rejects_before_resolving() {
        let media = ScriptedMedia::with_tracks(&["a", "b", "c"]);
        let transport = RecordingTransport::new();
        let mut deps = deps(&media, &transport);
        deps.max_queue_len = Some(1);
        let mut session = ChatSession::new(-1, deps);
        session.apply(play("a")).await;
        session.apply(play("b")).await;
        let resolved = media.resolve_count();

        let reply = session.apply(play("c")).await.unwrap();

        assert_eq!(reply, PlaybackError::QueueFull(1).to_reply());
        assert_eq!(media.resolve_count(), resolved);
    }

    #[tokio::test]
    async fn empty_query_is_invalid_argument() {
        let media = ScriptedMedia::with_tracks(&[]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));

        let reply = session.apply(play("   ")).await.unwrap();

        assert!(reply.starts_with("⚠️ Please provide a song name"));
        assert_eq!(media.resolve_count(), 0);
    }

    #[tokio::test]
    async fn fetched_handle_is_recorded_on_current_item() {
        let media = ScriptedMedia::with_tracks(&["a", "b"]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        session.apply(play("a")).await;
        session.apply(play("b")).await;
        session.apply(command(Command::Skip)).await;

        assert_eq!(media.fetches(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            session
                .snapshot()
                .current
                .and_then(|c| c.media_handle().cloned())
                .map(|h| h.to_string()),
            Some("file:b".to_string())
        );
    }

    #[tokio::test]
    async fn finished_items_release_their_media() {
        let media = ScriptedMedia::with_tracks(&["a", "b"]);
        let transport = RecordingTransport::new();
        let mut session = ChatSession::new(-1, deps(&media, &transport));
        session.apply(play("a")).await;
        session.apply(play("b")).await;

        session.apply(command(Command::Skip)).await;
        assert_eq!(media.releases(), vec!["file:a".to_string()]);

        session.apply(command(Command::Stop)).await;
        assert_eq!(
            media.releases(),
            vec!["file:a".to_string(), "file:b".to_string()]
        );
    }

    #[tokio::test]
    async fn media_of_an_item_that_failed_to_start_is_released() {
        let media = ScriptedMedia::with_tracks(&["a"]);
        let transport = RecordingTransport::new();
        transport.fail_streams(TransportError::Timeout);
        let mut session = ChatSession::new(-1, deps(&media, &transport));

        let reply = session.apply(play("a")).await.unwrap();

        assert!(reply.contains("timed out"), "reply: {reply}");
        assert_eq!(media.releases(), vec!["file:a".to_string()]);
        assert_eq!(session.snapshot().status, SessionStatus::Idle);
    }
}
