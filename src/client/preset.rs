//! Structural snapshots of sources and subjects
//!
//! A persistence layer stores these tuples however it likes; the client only
//! builds them and recreates entries from them.

use std::fmt;

use crate::data::Role;
use crate::registry::{SourceId, SubjectKey};
use crate::subject::{SourceSettings, SubjectSettings, VirtualSubject};

/// Everything needed to recreate a source
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePreset {
    pub id: SourceId,
    /// Factory key, ignored for virtual sources
    pub source_type: String,
    pub settings: SourceSettings,
}

impl SourcePreset {
    pub fn new(id: SourceId, source_type: impl Into<String>, settings: SourceSettings) -> Self {
        Self {
            id,
            source_type: source_type.into(),
            settings,
        }
    }
}

/// Everything needed to recreate a subject
pub struct SubjectPreset {
    pub key: SubjectKey,
    pub role: Option<Role>,
    pub settings: SubjectSettings,
    /// Required for subjects of virtual sources
    pub virtual_subject: Option<Box<dyn VirtualSubject>>,
    pub enabled: bool,
}

impl SubjectPreset {
    pub fn new(key: SubjectKey, role: Role) -> Self {
        Self {
            key,
            settings: SubjectSettings::new(role.clone()),
            role: Some(role),
            virtual_subject: None,
            enabled: true,
        }
    }

    pub fn with_settings(mut self, settings: SubjectSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_virtual_subject(mut self, subject: Box<dyn VirtualSubject>) -> Self {
        self.role = Some(subject.role());
        self.virtual_subject = Some(subject);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl fmt::Debug for SubjectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectPreset")
            .field("key", &self.key)
            .field("role", &self.role)
            .field("settings", &self.settings)
            .field("virtual_subject", &self.virtual_subject.is_some())
            .field("enabled", &self.enabled)
            .finish()
    }
}
