//! Fixed constants shared by the session core and its adapters.
//!
//! Tunable values live in [`crate::state::Config`]; the ones here are part of
//! the command surface or the bridge wire contract.

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

/// Highest accepted volume level (percent).
pub const MAX_VOLUME: u8 = 100;

/// Volume a freshly provisioned room starts at.
pub const DEFAULT_VOLUME: u8 = 100;

/// Capacity of the lifecycle (`StreamEnded`) channel between transports and
/// the lifecycle processor.
pub const LIFECYCLE_CHANNEL_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Voice Bridge
// ─────────────────────────────────────────────────────────────────────────────

/// Backoff delays for retrying transient bridge failures (milliseconds).
pub const BRIDGE_RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

/// Path the bridge calls back on when a stream finishes.
pub const STREAM_ENDED_CALLBACK_PATH: &str = "/callbacks/stream-ended";

/// Error code the bridge returns when the bot is not an admin of the chat.
pub const BRIDGE_CODE_NOT_ADMIN: &str = "not_admin";

/// Error code the bridge returns when the chat has no live voice chat.
pub const BRIDGE_CODE_NO_ACTIVE_ROOM: &str = "no_active_room";

/// Error code the bridge returns when the room cannot be used.
pub const BRIDGE_CODE_INVALID_ROOM: &str = "invalid_room";

/// Bridge rejection: the room already has a stream running.
pub const BRIDGE_CODE_STREAM_ACTIVE: &str = "stream_active";

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Server
// ─────────────────────────────────────────────────────────────────────────────

/// Ports tried in order when no port is configured.
pub const PORT_RANGE_START: u16 = 49500;
pub const PORT_RANGE_END: u16 = 49510;

/// Keep-alive interval for the server-sent events stream (seconds).
pub const SSE_KEEP_ALIVE_SECS: u64 = 15;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in logs and the health endpoint.
pub const APP_NAME: &str = "Voicecast";

/// Service identifier reported by `/health`.
pub const SERVICE_ID: &str = "voicecast";
