//! Handle to a running session actor.

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

use super::types::{ChatId, SessionEvent, SessionSnapshot};
use crate::error::PlaybackError;

/// An event on its way into a session's inbox.
pub(crate) struct Envelope {
    pub event: SessionEvent,
    /// Where the reply goes; `None` for lifecycle events.
    pub reply: Option<oneshot::Sender<String>>,
}

/// Cheap, cloneable handle to one chat's actor.
#[derive(Clone)]
pub struct SessionHandle {
    chat_id: ChatId,
    tx: mpsc::Sender<Envelope>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub(crate) fn new(
        chat_id: ChatId,
        tx: mpsc::Sender<Envelope>,
        snapshot_rx: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self {
            chat_id,
            tx,
            snapshot_rx,
        }
    }

    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// State as of the last completed transition.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Enqueues without waiting.
    pub(crate) fn try_enqueue(&self, envelope: Envelope) -> Result<(), TrySendError<Envelope>> {
        self.tx.try_send(envelope)
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<Envelope> {
        self.tx.clone()
    }

    /// True when the actor has exited.
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// True when the session is idle with nothing queued and its inbox holds
    /// no undelivered events.
    pub(crate) fn is_retirable(&self) -> bool {
        self.snapshot_rx.borrow().is_idle_and_empty() && self.tx.capacity() == self.tx.max_capacity()
    }
}

impl From<TrySendError<Envelope>> for PlaybackError {
    fn from(err: TrySendError<Envelope>) -> Self {
        match err {
            TrySendError::Full(_) => Self::Busy,
            TrySendError::Closed(_) => Self::Shutdown,
        }
    }
}
