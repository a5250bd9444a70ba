//! Per-chat actor serializing every event applied to a [`ChatSession`].
//!
//! Each live chat gets a dedicated task that:
//! - Receives commands and lifecycle events over a bounded inbox
//! - Applies them one at a time, in arrival order
//! - Publishes a snapshot after every transition
//! - Retires itself through the registry once idle and empty

use tokio::sync::{mpsc, watch};

use super::handle::Envelope;
use super::machine::ChatSession;
use super::registry::SessionRegistry;
use super::types::SessionSnapshot;
use crate::events::RegistryEvent;
use crate::utils::now_millis;

pub(crate) struct SessionActor {
    session: ChatSession,
    inbox: mpsc::Receiver<Envelope>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    shutdown_rx: watch::Receiver<bool>,
    registry: SessionRegistry,
}

impl SessionActor {
    pub(crate) fn new(
        session: ChatSession,
        inbox: mpsc::Receiver<Envelope>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        shutdown_rx: watch::Receiver<bool>,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            session,
            inbox,
            snapshot_tx,
            shutdown_rx,
            registry,
        }
    }

    pub(crate) async fn run(mut self) {
        let chat_id = self.session.chat_id();
        log::debug!("[Session] Actor for chat {} started", chat_id);

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        log::debug!("[Session] Actor for chat {} received shutdown signal", chat_id);
                        self.session.shutdown().await;
                        self.publish();
                        break;
                    }
                }

                envelope = self.inbox.recv() => {
                    let Some(Envelope { event, reply }) = envelope else {
                        log::debug!("[Session] Inbox for chat {} closed", chat_id);
                        break;
                    };

                    let outcome = self.session.apply(event).await;
                    self.publish();

                    // Retire before replying: once a reply is delivered the
                    // registry already reflects the transition.
                    let retired = self.registry.remove_if_empty(chat_id);

                    if let (Some(reply), Some(text)) = (reply, outcome) {
                        if reply.send(text).is_err() {
                            log::debug!("[Session] Requester for chat {} went away", chat_id);
                        }
                    }

                    if retired {
                        log::info!("[Session] Chat {} idle, session closed", chat_id);
                        self.registry.emitter().emit_registry(RegistryEvent::SessionClosed {
                            chat_id,
                            timestamp: now_millis(),
                        });
                        break;
                    }
                }
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }
}
