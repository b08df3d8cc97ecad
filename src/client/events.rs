//! Client lifecycle events
//!
//! Events fan out over a `tokio::sync::broadcast` channel. Emitting never
//! blocks; a receiver that falls behind sees `RecvError::Lagged` and skips
//! ahead.

use tokio::sync::broadcast;

use crate::registry::{SourceId, SubjectKey};
use crate::subject::SubjectState;

/// Events from the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Source registered
    SourceAdded(SourceId),

    /// Source destroyed after agreeing to shut down
    SourceRemoved(SourceId),

    /// Subject registered
    SubjectAdded(SubjectKey),

    /// Subject destroyed
    SubjectRemoved(SubjectKey),

    /// Advisory subject state changed since the previous tick
    SubjectStateChanged {
        key: SubjectKey,
        state: SubjectState,
    },

    /// An evaluation call produced data for a subject
    SubjectEvaluated(SubjectKey),

    /// A tick finished
    Ticked {
        /// Size of the enabled snapshot
        enabled_subjects: usize,
    },
}

/// Sending side of the event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of receivers reached, 0 if nobody listens
    pub fn emit(&self, event: ClientEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
