//! Event emitter abstraction for decoupling sessions from transport.
//!
//! Session actors depend on the [`EventEmitter`] trait rather than concrete
//! broadcast channels, so tests can observe events directly.

use super::{PlaybackEvent, RegistryEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a playback transition event.
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a registry membership event.
    fn emit_registry(&self, event: RegistryEvent);
}

/// No-op emitter. Events are silently discarded.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_playback(&self, _event: PlaybackEvent) {}

    fn emit_registry(&self, _event: RegistryEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }

    fn emit_registry(&self, event: RegistryEvent) {
        tracing::debug!(?event, "registry_event");
    }
}
