//! Weak handle given to sources
//!
//! Sources keep a [`ClientHandle`] instead of the client itself, so a source
//! holding on to it never keeps the client alive. Once the client is gone
//! every call becomes a no-op.

use std::sync::{Arc, Weak};

use super::client::Shared;
use crate::data::{FrameData, Role, StaticData};
use crate::registry::SubjectKey;

/// Any-thread push handle
#[derive(Clone, Default)]
pub struct ClientHandle {
    shared: Weak<Shared>,
}

impl ClientHandle {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    /// Handle not attached to any client
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.strong_count() > 0
    }

    pub fn push_subject_static_data(&self, key: SubjectKey, role: Role, static_data: StaticData) {
        if let Some(shared) = self.shared.upgrade() {
            shared.push_static(key, role, static_data);
        }
    }

    pub fn push_subject_frame_data(&self, key: SubjectKey, frame: FrameData) {
        if let Some(shared) = self.shared.upgrade() {
            shared.push_frame(key, frame);
        }
    }

    /// Request removal of a subject at the next tick
    pub fn remove_subject(&self, key: &SubjectKey) {
        if let Some(shared) = self.shared.upgrade() {
            if let Err(e) = shared.registry.mark_subject_pending_kill(key) {
                tracing::debug!(subject = %key, error = %e, "Subject removal ignored");
            }
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("connected", &self.is_connected())
            .finish()
    }
}
