//! Streaming transport capability.
//!
//! Sessions drive a remote room through the [`RoomProvisioning`] and
//! [`StreamControl`] traits and learn about finished streams through
//! [`StreamEnded`] notifications sent on a lifecycle channel.
//!
//! Implementations:
//! - [`BridgeTransport`]: JSON over HTTP to a voice-bridge sidecar
//! - [`SimulatedTransport`]: in-memory rooms with timer-driven endings

mod bridge;
mod retry;
mod simulated;

pub use bridge::BridgeTransport;
pub use simulated::SimulatedTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::MediaHandle;

/// Identifier of the remote room. One room per chat, keyed by chat id.
pub type RoomId = i64;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Generic streaming-transport failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The call did not complete in time.
    #[error("transport request timed out")]
    Timeout,

    /// The transport could not be reached.
    #[error("transport unreachable: {0}")]
    Unreachable(String),

    /// The transport answered with an unexpected HTTP status.
    #[error("transport returned HTTP {0}: {1}")]
    Status(u16, String),

    /// The transport refused the operation.
    #[error("{message} ({code})")]
    Rejected { code: String, message: String },
}

impl TransportError {
    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Unreachable(_) => true,
            Self::Status(status, _) => *status >= 500,
            Self::Rejected { .. } => false,
        }
    }
}

/// Convenient Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Reasons provisioning a room can fail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("bot lacks admin rights")]
    NotAdmin,

    #[error("no active voice chat")]
    NoActiveRoom,

    #[error("room cannot be used")]
    InvalidRoom,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// A stream finished on its own. `generation` is the one the stream was
/// started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEnded {
    pub room_id: RoomId,
    pub generation: u64,
}

/// Channel transports report [`StreamEnded`] on.
pub type LifecycleSender = mpsc::Sender<StreamEnded>;

/// What to push into a room.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub handle: MediaHandle,
    /// Generation the stream will run under; echoed back in [`StreamEnded`].
    pub generation: u64,
    /// Expected length (0 = unknown).
    pub duration_secs: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Joining and leaving the remote room.
#[async_trait]
pub trait RoomProvisioning: Send + Sync {
    /// Ensures a live session exists in the room and that we joined it.
    ///
    /// Idempotent: succeeds immediately when already joined.
    async fn provision(&self, room: RoomId) -> Result<(), ProvisionError>;

    /// Leaves the room, stopping any stream.
    async fn leave(&self, room: RoomId) -> TransportResult<()>;
}

/// Controlling the stream inside a joined room.
#[async_trait]
pub trait StreamControl: Send + Sync {
    /// Starts streaming into a room with no active stream.
    async fn start_stream(&self, room: RoomId, request: StreamRequest) -> TransportResult<()>;

    /// Swaps the active stream for a new one without leaving the room.
    async fn replace_stream(&self, room: RoomId, request: StreamRequest) -> TransportResult<()>;

    async fn pause(&self, room: RoomId) -> TransportResult<()>;

    async fn resume(&self, room: RoomId) -> TransportResult<()>;

    /// Sets the stream volume (0-100).
    async fn set_volume(&self, room: RoomId, level: u8) -> TransportResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Full transport surface, used as `Arc<dyn StreamTransport>` by sessions.
pub trait StreamTransport: RoomProvisioning + StreamControl {}

/// Blanket implementation for any type implementing both traits.
impl<T: RoomProvisioning + StreamControl> StreamTransport for T {}
