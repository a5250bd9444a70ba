//! Registry of live chat sessions.
//!
//! Provides:
//! - Lazy creation of one actor per chat on its first `play`
//! - Routing of commands and lifecycle events to the right actor
//! - Removal of sessions that went idle and empty
//! - Graceful shutdown of all actors
//!
//! The map is a [`DashMap`]. Creating a session and enqueueing into it happen
//! under the entry's shard lock, and an actor's self-removal checks its inbox
//! is empty under that same lock, so no event is ever handed to an actor that
//! is retiring.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::actor::SessionActor;
use super::handle::{Envelope, SessionHandle};
use super::machine::{ChatSession, SessionDeps};
use super::replies::idle_reply;
use super::types::{ChatId, ChatKind, Command, SessionEvent, SessionSnapshot};
use crate::error::PlaybackError;
use crate::events::{EventEmitter, RegistryEvent};
use crate::transport::StreamEnded;
use crate::utils::now_millis;

struct RegistryInner {
    sessions: DashMap<ChatId, SessionHandle>,
    deps: SessionDeps,
    inbox_capacity: usize,
    /// Actor task handles for graceful shutdown.
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Owns every live [`SessionHandle`], keyed by chat id.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

/// Outcome of handing a command to the registry.
enum Dispatched {
    /// The actor will answer on this channel.
    Queued(oneshot::Receiver<String>),
    /// Answered without involving a session.
    Answered(String),
}

impl SessionRegistry {
    /// Creates an empty registry.
    ///
    /// `inbox_capacity` bounds each chat's pending events; beyond it commands
    /// are answered with [`PlaybackError::Busy`].
    pub fn new(deps: SessionDeps, inbox_capacity: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                deps,
                inbox_capacity: inbox_capacity.max(1),
                task_handles: Mutex::new(Vec::new()),
                shutdown_tx,
                shutdown_rx,
            }),
        }
    }

    pub(crate) fn emitter(&self) -> &Arc<dyn EventEmitter> {
        &self.inner.deps.emitter
    }

    fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_rx.borrow()
    }

    // ------------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------------

    /// Returns the chat's session, creating an idle one if none exists.
    ///
    /// Never blocks on I/O. Sessions only retire after applying an event, so
    /// one created here and never sent anything stays registered until the
    /// caller hands it an event or calls [`Self::remove_if_empty`].
    pub fn get_or_create(&self, chat_id: ChatId) -> SessionHandle {
        self.inner
            .sessions
            .entry(chat_id)
            .or_insert_with(|| self.spawn_actor(chat_id))
            .clone()
    }

    /// Removes the chat's session iff it is idle, has nothing queued and no
    /// undelivered events. Returns true if it was removed.
    pub fn remove_if_empty(&self, chat_id: ChatId) -> bool {
        self.inner
            .sessions
            .remove_if(&chat_id, |_, handle| handle.is_retirable())
            .is_some()
    }

    /// Hands a command to the chat's serialized event stream.
    ///
    /// The command is enqueued before this returns; the returned future
    /// resolves to the reply once the session has applied it. Commands issued
    /// in order are therefore applied in order even if their futures are
    /// awaited later.
    pub fn submit(&self, chat_id: ChatId, command: Command) -> BoxFuture<'static, String> {
        match self.enqueue_command(chat_id, command) {
            Ok(Dispatched::Queued(rx)) => async move {
                rx.await
                    .unwrap_or_else(|_| PlaybackError::Shutdown.to_reply())
            }
            .boxed(),
            Ok(Dispatched::Answered(reply)) => future::ready(reply).boxed(),
            Err(e) => {
                log::debug!("[Registry] Command for chat {} refused: {}", chat_id, e);
                future::ready(e.to_reply()).boxed()
            }
        }
    }

    /// Submits a command and waits for its reply.
    pub async fn dispatch(&self, chat_id: ChatId, command: Command) -> String {
        self.submit(chat_id, command).await
    }

    fn enqueue_command(&self, chat_id: ChatId, command: Command) -> Result<Dispatched, PlaybackError> {
        if ChatKind::of(chat_id) == ChatKind::Private {
            return Err(PlaybackError::WrongChatKind);
        }
        if self.is_shutting_down() {
            return Err(PlaybackError::Shutdown);
        }

        let is_play = matches!(command, Command::Play { .. });
        let (reply_tx, reply_rx) = oneshot::channel();

        if !is_play {
            let Some(handle) = self.inner.sessions.get(&chat_id) else {
                return Ok(Dispatched::Answered(idle_reply(&command)));
            };
            handle.try_enqueue(Envelope {
                event: SessionEvent::Command(command),
                reply: Some(reply_tx),
            })?;
            return Ok(Dispatched::Queued(reply_rx));
        }

        let envelope = Envelope {
            event: SessionEvent::Command(command),
            reply: Some(reply_tx),
        };
        match self.inner.sessions.entry(chat_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_closed() {
                    log::warn!("[Registry] Actor for chat {} is gone, replacing it", chat_id);
                    occupied.insert(self.spawn_actor(chat_id));
                }
                occupied.get().try_enqueue(envelope)?;
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn_actor(chat_id);
                handle.try_enqueue(envelope)?;
                vacant.insert(handle);
            }
        }
        Ok(Dispatched::Queued(reply_rx))
    }

    /// Routes a transport lifecycle notification to the room's session.
    ///
    /// Notifications for chats without a session are dropped; there is
    /// nothing they could refer to.
    pub fn notify_stream_ended(&self, ended: StreamEnded) {
        let Some(handle) = self.inner.sessions.get(&ended.room_id) else {
            log::debug!(
                "[Registry] Dropping StreamEnded for chat {} without a session",
                ended.room_id
            );
            return;
        };

        let envelope = Envelope {
            event: SessionEvent::StreamEnded {
                generation: ended.generation,
            },
            reply: None,
        };
        match handle.try_enqueue(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                let tx: mpsc::Sender<Envelope> = handle.sender();
                drop(handle);
                tokio::spawn(async move {
                    if tx.send(envelope).await.is_err() {
                        log::debug!("[Registry] Session closed before StreamEnded was delivered");
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("[Registry] Session for chat {} already closed", ended.room_id);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Snapshot of one chat's session, if it exists.
    #[must_use]
    pub fn snapshot(&self, chat_id: ChatId) -> Option<SessionSnapshot> {
        self.inner.sessions.get(&chat_id).map(|h| h.snapshot())
    }

    /// Snapshots of every live session, ordered by chat id.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut all: Vec<SessionSnapshot> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        all.sort_by_key(|s| s.chat_id);
        all
    }

    #[must_use]
    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.inner.sessions.contains_key(&chat_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    fn spawn_actor(&self, chat_id: ChatId) -> SessionHandle {
        let (tx, rx) = mpsc::channel(self.inner.inbox_capacity);
        let session = ChatSession::new(chat_id, self.inner.deps.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        let actor = SessionActor::new(
            session,
            rx,
            snapshot_tx,
            self.inner.shutdown_rx.clone(),
            self.clone(),
        );
        let task = tokio::spawn(actor.run());
        {
            let mut handles = self.inner.task_handles.lock();
            handles.retain(|h| !h.is_finished());
            handles.push(task);
        }

        log::info!("[Registry] Opened session for chat {}", chat_id);
        self.emitter().emit_registry(RegistryEvent::SessionOpened {
            chat_id,
            timestamp: now_millis(),
        });
        SessionHandle::new(chat_id, tx, snapshot_rx)
    }

    /// Gracefully shuts down all session actors.
    ///
    /// Each actor leaves its room (best-effort) and exits; pending requesters
    /// get a shutdown reply.
    pub async fn shutdown(&self) {
        log::info!("[Registry] Shutting down {} session(s)", self.len());

        self.inner.shutdown_tx.send_replace(true);

        let task_handles = std::mem::take(&mut *self.inner.task_handles.lock());
        for task_handle in task_handles {
            if let Err(e) = task_handle.await {
                log::warn!("[Registry] Actor task panicked during shutdown: {:?}", e);
            }
        }
        self.inner.sessions.clear();

        log::info!("[Registry] Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::session::replies;
    use crate::session::test_fixtures::{
        deps, RecordingEmitter, RecordingTransport, ScriptedMedia, TransportCall,
    };
    use crate::session::SessionStatus;

    fn play(query: &str) -> Command {
        Command::Play {
            query: query.into(),
        }
    }

    fn registry(media: &Arc<ScriptedMedia>, transport: &Arc<RecordingTransport>) -> SessionRegistry {
        SessionRegistry::new(deps(media, transport), 32)
    }

    /// Waits (in paused time) until `cond` holds.
    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_plays_create_a_single_session() {
        let media = ScriptedMedia::with_tracks(&["a"]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.dispatch(-100, play("a")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(
            transport.count(|c| matches!(c, TransportCall::Provision(_))),
            1
        );
        let snap = registry.snapshot(-100).unwrap();
        assert_eq!(snap.status, SessionStatus::Playing);
        assert_eq!(snap.queue.len(), 15);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn rapid_plays_queue_in_arrival_order() {
        let media = ScriptedMedia::with_tracks(&["A", "B", "C"]);
        let transport = RecordingTransport::new();
        let gate = transport.hold_provision();
        let registry = registry(&media, &transport);

        let a = registry.submit(-100, play("A"));
        let b = registry.submit(-100, play("B"));
        let c = registry.submit(-100, play("C"));
        gate.notify_one();
        let (a, b, c) = tokio::join!(a, b, c);

        assert!(a.contains("Now playing: **A**"));
        assert!(b.contains("position 1"));
        assert!(c.contains("position 2"));
        let queue: Vec<String> = registry
            .snapshot(-100)
            .unwrap()
            .queue
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(queue, ["B", "C"]);

        let reply = registry.dispatch(-100, Command::Skip).await;
        assert!(reply.contains("Now playing: **B**"));
        let reply = registry.dispatch(-100, Command::Skip).await;
        assert!(reply.contains("Now playing: **C**"));
        assert!(registry.snapshot(-100).unwrap().queue.is_empty());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn private_chats_are_rejected_without_a_session() {
        let media = ScriptedMedia::with_tracks(&["a"]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);

        for command in [play("a"), Command::Queue, Command::Stop] {
            let reply = registry.dispatch(4242, command).await;
            assert_eq!(reply, PlaybackError::WrongChatKind.to_reply());
        }

        assert!(registry.is_empty());
        assert_eq!(media.resolve_count(), 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn non_play_commands_do_not_create_sessions() {
        let media = ScriptedMedia::with_tracks(&[]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);

        assert_eq!(
            registry.dispatch(-1, Command::Stop).await,
            replies::NOTHING_PLAYING
        );
        assert_eq!(
            registry.dispatch(-1, Command::Queue).await,
            replies::EMPTY_QUEUE
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failed_play_leaves_no_session_behind() {
        let media = ScriptedMedia::with_tracks(&[]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);

        let reply = registry.dispatch(-1, play("nothing")).await;

        assert_eq!(reply, PlaybackError::NotFound.to_reply());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_play_queue_skip_then_stream_end() {
        let media = ScriptedMedia::with_tracks(&["song1", "song2"]);
        let transport = RecordingTransport::new();
        let emitter = Arc::new(RecordingEmitter::default());
        let mut session_deps = deps(&media, &transport);
        session_deps.emitter = emitter.clone() as Arc<dyn EventEmitter>;
        let registry = SessionRegistry::new(session_deps, 32);

        let reply = registry.dispatch(-100, play("song1")).await;
        assert!(reply.contains("song1"));
        assert_eq!(
            registry.snapshot(-100).unwrap().status,
            SessionStatus::Playing
        );

        registry.dispatch(-100, play("song2")).await;
        assert_eq!(registry.snapshot(-100).unwrap().queue.len(), 1);

        registry.dispatch(-100, Command::Skip).await;
        let snap = registry.snapshot(-100).unwrap();
        assert_eq!(snap.current.map(|c| c.title), Some("song2".to_string()));
        assert!(snap.queue.is_empty());

        registry.notify_stream_ended(StreamEnded {
            room_id: -100,
            generation: snap.generation,
        });
        eventually(|| !registry.contains(-100)).await;

        assert_eq!(transport.calls().last(), Some(&TransportCall::Leave(-100)));
        eventually(|| {
            emitter
                .registry
                .lock()
                .iter()
                .any(|e| matches!(e, RegistryEvent::SessionClosed { chat_id: -100, .. }))
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_stream_end_is_discarded() {
        let media = ScriptedMedia::with_tracks(&["a", "b"]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);
        registry.dispatch(-7, play("a")).await;
        registry.dispatch(-7, play("b")).await;
        registry.dispatch(-7, Command::Skip).await;
        let before = registry.snapshot(-7).unwrap();

        registry.notify_stream_ended(StreamEnded {
            room_id: -7,
            generation: before.generation - 1,
        });
        // A later command observes the state after the stale event.
        registry.dispatch(-7, Command::Queue).await;

        assert_eq!(registry.snapshot(-7).unwrap(), before);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn stream_end_for_unknown_chat_is_dropped() {
        let media = ScriptedMedia::with_tracks(&[]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);

        registry.notify_stream_ended(StreamEnded {
            room_id: -55,
            generation: 1,
        });

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn stopped_session_is_removed() {
        let media = ScriptedMedia::with_tracks(&["a"]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);
        registry.dispatch(-3, play("a")).await;

        let reply = registry.dispatch(-3, Command::Stop).await;

        assert!(reply.contains("Stopped playing"));
        assert!(!registry.contains(-3));

        // The chat starts over with a fresh session; generations keep counting.
        registry.dispatch(-3, play("a")).await;
        assert_eq!(registry.snapshot(-3).unwrap().generation, 3);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn late_stream_end_from_closed_session_spares_its_successor() {
        let media = ScriptedMedia::with_tracks(&["a", "b"]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);
        registry.dispatch(-1, play("a")).await;
        let first = registry.snapshot(-1).unwrap().generation;
        registry.dispatch(-1, Command::Stop).await;
        assert!(!registry.contains(-1));

        registry.dispatch(-1, play("b")).await;
        let reopened = registry.snapshot(-1).unwrap();
        assert_ne!(reopened.generation, first);

        // The end of "a" arrives after the chat already moved on.
        registry.notify_stream_ended(StreamEnded {
            room_id: -1,
            generation: first,
        });
        registry.dispatch(-1, Command::Queue).await;

        let snap = registry.snapshot(-1).unwrap();
        assert_eq!(snap.status, SessionStatus::Playing);
        assert_eq!(snap.current.map(|c| c.title), Some("b".to_string()));
        assert_eq!(snap.generation, reopened.generation);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_session() {
        let media = ScriptedMedia::with_tracks(&[]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);

        let first = registry.get_or_create(-9);
        let second = registry.get_or_create(-9);

        assert_eq!(first.chat_id(), second.chat_id());
        assert_eq!(registry.len(), 1);
        assert!(!registry.remove_if_empty(-10));
        assert!(registry.remove_if_empty(-9));
        assert!(registry.is_empty());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_leaves_rooms_and_refuses_new_commands() {
        let media = ScriptedMedia::with_tracks(&["a"]);
        let transport = RecordingTransport::new();
        let registry = registry(&media, &transport);
        registry.dispatch(-1, play("a")).await;

        registry.shutdown().await;

        assert!(registry.is_empty());
        assert_eq!(transport.calls().last(), Some(&TransportCall::Leave(-1)));
        assert_eq!(
            registry.dispatch(-1, play("a")).await,
            PlaybackError::Shutdown.to_reply()
        );
    }
}
