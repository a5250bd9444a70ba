//! Hand-written capability mocks shared by the session tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::machine::{Generations, SessionDeps};
use crate::events::{EventEmitter, PlaybackEvent, RegistryEvent};
use crate::media::{FetchError, MediaFetcher, MediaHandle, MediaInfo, MediaResolver, ResolveError};
use crate::transport::{
    ProvisionError, RoomId, RoomProvisioning, StreamControl, StreamRequest, TransportError,
    TransportResult,
};

/// Resolves a fixed set of queries; fetches succeed unless marked failing.
pub struct ScriptedMedia {
    tracks: HashMap<String, MediaInfo>,
    failing: Mutex<HashSet<String>>,
    fetches: Mutex<Vec<String>>,
    releases: Mutex<Vec<String>>,
    resolves: AtomicUsize,
}

impl ScriptedMedia {
    /// Every listed query resolves to a 3 minute track titled after it.
    pub fn with_tracks(queries: &[&str]) -> Arc<Self> {
        let tracks = queries
            .iter()
            .map(|q| {
                (
                    q.to_string(),
                    MediaInfo {
                        title: q.to_string(),
                        duration_secs: 180,
                        source_url: String::new(),
                    },
                )
            })
            .collect();
        Arc::new(Self {
            tracks,
            failing: Mutex::new(HashSet::new()),
            fetches: Mutex::new(Vec::new()),
            releases: Mutex::new(Vec::new()),
            resolves: AtomicUsize::new(0),
        })
    }

    pub fn fail_fetch(&self, locator: &str) {
        self.failing.lock().insert(locator.to_string());
    }

    /// Locators passed to `fetch`, in call order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().clone()
    }

    /// Handles passed to `release`, in call order.
    pub fn releases(&self) -> Vec<String> {
        self.releases.lock().clone()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaResolver for ScriptedMedia {
    async fn resolve(&self, query: &str) -> Result<MediaInfo, ResolveError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.tracks.get(query).cloned().ok_or(ResolveError::NotFound)
    }
}

#[async_trait]
impl MediaFetcher for ScriptedMedia {
    async fn fetch(&self, locator: &str) -> Result<MediaHandle, FetchError> {
        self.fetches.lock().push(locator.to_string());
        if self.failing.lock().contains(locator) {
            return Err(FetchError::Failed(format!("scripted failure for {locator}")));
        }
        Ok(MediaHandle::new(format!("file:{locator}")))
    }

    async fn release(&self, handle: &MediaHandle) {
        self.releases.lock().push(handle.to_string());
    }
}

/// One call made against [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Provision(RoomId),
    /// Room and generation.
    Start(RoomId, u64),
    Replace(RoomId, u64),
    Pause(RoomId),
    Resume(RoomId),
    Volume(RoomId, u8),
    Leave(RoomId),
}

/// Transport that records every call and succeeds unless told otherwise.
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    provision_error: Mutex<Option<ProvisionError>>,
    provision_gate: Mutex<Option<Arc<Notify>>>,
    stream_error: Mutex<Option<TransportError>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            provision_error: Mutex::new(None),
            provision_gate: Mutex::new(None),
            stream_error: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn fail_provision(&self, err: ProvisionError) {
        *self.provision_error.lock() = Some(err);
    }

    /// Makes `start_stream` and `replace_stream` fail with `err`.
    pub fn fail_streams(&self, err: TransportError) {
        *self.stream_error.lock() = Some(err);
    }

    /// Makes `provision` block until the returned notify is signalled.
    pub fn hold_provision(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.provision_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }

    fn stream_result(&self) -> TransportResult<()> {
        match self.stream_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RoomProvisioning for RecordingTransport {
    async fn provision(&self, room: RoomId) -> Result<(), ProvisionError> {
        self.record(TransportCall::Provision(room));
        let gate = self.provision_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.provision_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn leave(&self, room: RoomId) -> TransportResult<()> {
        self.record(TransportCall::Leave(room));
        Ok(())
    }
}

#[async_trait]
impl StreamControl for RecordingTransport {
    async fn start_stream(&self, room: RoomId, request: StreamRequest) -> TransportResult<()> {
        self.record(TransportCall::Start(room, request.generation));
        self.stream_result()
    }

    async fn replace_stream(&self, room: RoomId, request: StreamRequest) -> TransportResult<()> {
        self.record(TransportCall::Replace(room, request.generation));
        self.stream_result()
    }

    async fn pause(&self, room: RoomId) -> TransportResult<()> {
        self.record(TransportCall::Pause(room));
        Ok(())
    }

    async fn resume(&self, room: RoomId) -> TransportResult<()> {
        self.record(TransportCall::Resume(room));
        Ok(())
    }

    async fn set_volume(&self, room: RoomId, level: u8) -> TransportResult<()> {
        self.record(TransportCall::Volume(room, level));
        Ok(())
    }
}

/// Emitter that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingEmitter {
    pub playback: Mutex<Vec<PlaybackEvent>>,
    pub registry: Mutex<Vec<RegistryEvent>>,
}

impl EventEmitter for RecordingEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        self.playback.lock().push(event);
    }

    fn emit_registry(&self, event: RegistryEvent) {
        self.registry.lock().push(event);
    }
}

/// Session dependencies over the given mocks, no queue cap, events discarded.
pub fn deps(media: &Arc<ScriptedMedia>, transport: &Arc<RecordingTransport>) -> SessionDeps {
    SessionDeps {
        media: Arc::clone(media) as _,
        transport: Arc::clone(transport) as _,
        emitter: Arc::new(crate::events::NoopEventEmitter),
        generations: Generations::default(),
        max_queue_len: None,
    }
}
