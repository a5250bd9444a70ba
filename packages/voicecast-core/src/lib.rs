//! Voicecast Core - per-chat voice room playback orchestration.
//!
//! This crate turns chat commands (`/play`, `/skip`, `/stop`, ...) into
//! playback in a chat's voice room. Each chat gets its own serialized session
//! with a queue; sessions are created on the first `/play` and disappear once
//! idle and empty.
//!
//! # Architecture
//!
//! - [`session`]: Session registry, per-chat actors and the playback state machine
//! - [`media`]: Resolving queries to media and fetching playable handles
//! - [`transport`]: Voice room provisioning and stream control
//! - [`services`]: Command parsing and lifecycle event routing
//! - [`events`]: Domain events for observers
//! - [`api`]: HTTP command surface and bridge callbacks
//! - [`bootstrap`]: Composition root
//!
//! # Abstraction Traits
//!
//! Core logic depends only on capability traits:
//!
//! - [`MediaResolver`](media::MediaResolver) / [`MediaFetcher`](media::MediaFetcher)
//! - [`RoomProvisioning`](transport::RoomProvisioning) / [`StreamControl`](transport::StreamControl)
//! - [`EventEmitter`](events::EventEmitter)
//! - [`IpDetector`](context::IpDetector)
//!
//! Each has a simulated implementation that needs no external services.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod context;
pub mod error;
pub mod events;
pub mod media;
pub mod protocol_constants;
pub mod services;
pub mod session;
pub mod state;
pub mod transport;
pub mod utils;

// Re-export commonly used types at the crate root
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError};
pub use error::{ErrorCode, PlaybackError, VoicecastError, VoicecastResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter,
    PlaybackEvent, RegistryEvent,
};
pub use state::{Config, MediaBackend, TransportBackend};
pub use utils::{format_duration, now_millis};

pub use media::{MediaFetcher, MediaHandle, MediaInfo, MediaResolver, MediaSource};
pub use transport::{RoomProvisioning, StreamControl, StreamEnded, StreamTransport};

pub use session::{ChatId, ChatKind, Command, SessionRegistry, SessionSnapshot, SessionStatus};
pub use services::CommandRouter;

pub use bootstrap::{bootstrap_services, bootstrap_services_with_network, BootstrappedServices};
pub use api::{start_server, AppState, ServerError};
