//! Stream lifecycle event processing.
//!
//! Responsibilities:
//! - Receiving `StreamEnded` notifications from the transport adapter
//! - Routing them to the owning session through the registry

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::SessionRegistry;
use crate::transport::StreamEnded;

/// Forwards transport lifecycle events into the session registry.
pub struct LifecycleProcessor {
    registry: SessionRegistry,
    lifecycle_rx: Arc<Mutex<Option<mpsc::Receiver<StreamEnded>>>>,
}

impl LifecycleProcessor {
    pub fn new(registry: SessionRegistry, lifecycle_rx: mpsc::Receiver<StreamEnded>) -> Self {
        Self {
            registry,
            lifecycle_rx: Arc::new(Mutex::new(Some(lifecycle_rx))),
        }
    }

    /// Routes one event. Also used by the HTTP callback endpoint.
    pub fn handle(&self, ended: StreamEnded) {
        log::debug!(
            "[Lifecycle] StreamEnded room={} generation={}",
            ended.room_id,
            ended.generation
        );
        self.registry.notify_stream_ended(ended);
    }

    /// Spawns the forwarding task.
    ///
    /// Returns `None` if the forwarder was already started. The task exits
    /// when `cancel` fires or every sender is dropped.
    pub fn start(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let mut rx = self.lifecycle_rx.lock().take()?;
        let registry = self.registry.clone();

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::debug!("[Lifecycle] Forwarder cancelled");
                        break;
                    }
                    ended = rx.recv() => {
                        let Some(ended) = ended else {
                            log::debug!("[Lifecycle] All lifecycle senders dropped");
                            break;
                        };
                        registry.notify_stream_ended(ended);
                    }
                }
            }
        }))
    }
}
