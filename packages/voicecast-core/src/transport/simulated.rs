//! In-memory transport used when no voice bridge is configured.
//!
//! Rooms are tracked in a map. Every started or replaced stream arms a timer
//! that reports [`StreamEnded`] once the track would have finished. Replacing
//! the stream, pausing or leaving the room cancels the timer; resuming re-arms
//! it with the remaining time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    LifecycleSender, ProvisionError, RoomId, RoomProvisioning, StreamControl, StreamEnded,
    StreamRequest, TransportError, TransportResult,
};
use crate::protocol_constants::DEFAULT_VOLUME;

#[derive(Debug)]
struct ActiveStream {
    generation: u64,
    remaining: Duration,
    /// Set while the timer runs; `None` while paused.
    running_since: Option<Instant>,
    timer: CancellationToken,
}

#[derive(Debug)]
struct SimulatedRoom {
    stream: Option<ActiveStream>,
    volume: u8,
}

/// Simulated streaming transport.
#[derive(Clone)]
pub struct SimulatedTransport {
    rooms: Arc<DashMap<RoomId, SimulatedRoom>>,
    lifecycle_tx: LifecycleSender,
    max_track: Duration,
}

impl SimulatedTransport {
    /// Creates a transport whose streams last at most `max_track`.
    pub fn new(lifecycle_tx: LifecycleSender, max_track: Duration) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            lifecycle_tx,
            max_track,
        }
    }

    /// Returns true if we are joined to the room.
    #[must_use]
    pub fn is_joined(&self, room: RoomId) -> bool {
        self.rooms.contains_key(&room)
    }

    /// Current volume of a joined room.
    #[must_use]
    pub fn volume(&self, room: RoomId) -> Option<u8> {
        self.rooms.get(&room).map(|r| r.volume)
    }

    fn track_length(&self, duration_secs: u32) -> Duration {
        if duration_secs == 0 {
            return self.max_track;
        }
        Duration::from_secs(u64::from(duration_secs)).min(self.max_track)
    }

    /// Spawns the end-of-track timer for `generation`.
    fn arm(&self, room: RoomId, generation: u64, after: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let rooms = Arc::clone(&self.rooms);
        let tx = self.lifecycle_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if let Some(mut entry) = rooms.get_mut(&room) {
                        if entry.stream.as_ref().map(|s| s.generation) == Some(generation) {
                            entry.stream = None;
                        }
                    }
                    log::debug!(
                        "[Simulated] Stream in room {} (generation {}) finished",
                        room,
                        generation
                    );
                    if tx.send(StreamEnded { room_id: room, generation }).await.is_err() {
                        log::debug!("[Simulated] Lifecycle channel closed, dropping StreamEnded");
                    }
                }
            }
        });

        token
    }

    fn put_stream(&self, room: RoomId, request: StreamRequest, replace: bool) -> TransportResult<()> {
        let mut entry = self.rooms.get_mut(&room).ok_or_else(not_joined)?;
        if !replace && entry.stream.is_some() {
            return Err(TransportError::Rejected {
                code: "stream_active".into(),
                message: "room already has an active stream".into(),
            });
        }
        if let Some(old) = entry.stream.take() {
            old.timer.cancel();
        }

        let length = self.track_length(request.duration_secs);
        entry.stream = Some(ActiveStream {
            generation: request.generation,
            remaining: length,
            running_since: Some(Instant::now()),
            timer: self.arm(room, request.generation, length),
        });
        log::info!(
            "[Simulated] Room {} streaming {} (generation {}, {:?})",
            room,
            request.handle,
            request.generation,
            length
        );
        Ok(())
    }
}

fn not_joined() -> TransportError {
    TransportError::Rejected {
        code: "not_joined".into(),
        message: "not joined to this room".into(),
    }
}

fn no_stream() -> TransportError {
    TransportError::Rejected {
        code: "no_stream".into(),
        message: "no active stream in this room".into(),
    }
}

#[async_trait]
impl RoomProvisioning for SimulatedTransport {
    async fn provision(&self, room: RoomId) -> Result<(), ProvisionError> {
        if room > 0 {
            return Err(ProvisionError::InvalidRoom);
        }
        let mut created = false;
        self.rooms.entry(room).or_insert_with(|| {
            created = true;
            SimulatedRoom {
                stream: None,
                volume: DEFAULT_VOLUME,
            }
        });
        if created {
            log::info!("[Simulated] Joined room {}", room);
        } else {
            log::debug!("[Simulated] Room {} already joined", room);
        }
        Ok(())
    }

    async fn leave(&self, room: RoomId) -> TransportResult<()> {
        if let Some((_, state)) = self.rooms.remove(&room) {
            if let Some(stream) = state.stream {
                stream.timer.cancel();
            }
            log::info!("[Simulated] Left room {}", room);
        }
        Ok(())
    }
}

#[async_trait]
impl StreamControl for SimulatedTransport {
    async fn start_stream(&self, room: RoomId, request: StreamRequest) -> TransportResult<()> {
        self.put_stream(room, request, false)
    }

    async fn replace_stream(&self, room: RoomId, request: StreamRequest) -> TransportResult<()> {
        self.put_stream(room, request, true)
    }

    async fn pause(&self, room: RoomId) -> TransportResult<()> {
        let mut entry = self.rooms.get_mut(&room).ok_or_else(not_joined)?;
        let stream = entry.stream.as_mut().ok_or_else(no_stream)?;
        if let Some(since) = stream.running_since.take() {
            stream.timer.cancel();
            stream.remaining = stream.remaining.saturating_sub(since.elapsed());
        }
        Ok(())
    }

    async fn resume(&self, room: RoomId) -> TransportResult<()> {
        let mut entry = self.rooms.get_mut(&room).ok_or_else(not_joined)?;
        let stream = entry.stream.as_mut().ok_or_else(no_stream)?;
        if stream.running_since.is_none() {
            let (generation, remaining) = (stream.generation, stream.remaining);
            stream.running_since = Some(Instant::now());
            stream.timer = self.arm(room, generation, remaining);
        }
        Ok(())
    }

    async fn set_volume(&self, room: RoomId, level: u8) -> TransportResult<()> {
        let mut entry = self.rooms.get_mut(&room).ok_or_else(not_joined)?;
        entry.volume = level;
        Ok(())
    }
}
