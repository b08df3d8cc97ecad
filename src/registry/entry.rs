//! Source and subject entries stored in the registry

use std::sync::Arc;
use std::time::Instant;

use super::key::{SourceId, SubjectKey};
use crate::client::Source;
use crate::subject::{SourceSettings, Subject};
use crate::timing::SourceTiming;

/// Entry for a single source in the registry
pub struct SourceEntry {
    pub id: SourceId,

    /// Producer adapter
    pub source: Arc<dyn Source>,

    pub settings: SourceSettings,

    /// Offset estimators shared by the source's subjects
    pub timing: Arc<SourceTiming>,

    /// When the source was registered
    pub created_at: Instant,

    pub(crate) pending_kill: bool,
}

impl SourceEntry {
    pub fn new(id: SourceId, source: Arc<dyn Source>, settings: SourceSettings) -> Self {
        Self {
            id,
            source,
            settings,
            timing: Arc::new(SourceTiming::default()),
            created_at: Instant::now(),
            pending_kill: false,
        }
    }

    /// Replace the default estimators
    pub fn with_timing(mut self, timing: SourceTiming) -> Self {
        self.timing = Arc::new(timing);
        self
    }

    pub fn is_virtual(&self) -> bool {
        self.settings.is_virtual()
    }

    pub fn is_pending_kill(&self) -> bool {
        self.pending_kill
    }

    /// Name of a virtual source
    pub fn virtual_name(&self) -> Option<&str> {
        if self.is_virtual() {
            self.settings.source_name.as_deref()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceEntry")
            .field("id", &self.id)
            .field("settings_class", &self.settings.settings_class)
            .field("pending_kill", &self.pending_kill)
            .finish()
    }
}

/// Entry for a single subject in the registry
#[derive(Debug)]
pub struct SubjectEntry {
    pub key: SubjectKey,

    pub subject: Subject,

    pub(crate) enabled: bool,

    pub(crate) pending_kill: bool,
}

impl SubjectEntry {
    pub fn new(key: SubjectKey, subject: Subject) -> Self {
        Self {
            key,
            subject,
            enabled: false,
            pending_kill: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_pending_kill(&self) -> bool {
        self.pending_kill
    }

    /// Enabled and not scheduled for removal
    pub fn is_active(&self) -> bool {
        self.enabled && !self.pending_kill
    }

    pub fn is_virtual(&self) -> bool {
        self.subject.is_virtual()
    }
}
