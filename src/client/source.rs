//! Producer adapter contract
//!
//! A [`Source`] is the producer side of a connection: a mocap rig, a network
//! feed, a virtual rig. It receives a [`ClientHandle`] when registered and
//! pushes data through it from any thread. The client polls it once per tick
//! and asks it to shut down before destroying it.

use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::ClientHandle;
use crate::registry::SourceId;
use crate::subject::{SourceSettings, DEFAULT_SETTINGS_CLASS, VIRTUAL_SETTINGS_CLASS};

/// Producer adapter
pub trait Source: Send + Sync {
    /// Called once when the source is registered
    fn receive_client(&self, client: ClientHandle, source_id: SourceId);

    /// Adjust the settings the source is registered with
    fn initialize_settings(&self, settings: &mut SourceSettings) {
        let _ = settings;
    }

    /// Polled once per tick on the consumer thread
    fn update(&self) {}

    /// Identity used to pick default pipeline stages
    fn settings_class(&self) -> &str {
        DEFAULT_SETTINGS_CLASS
    }

    /// False once the producer is gone
    fn is_source_still_valid(&self) -> bool;

    /// Asked every tick after removal was requested; true once it is safe
    /// to destroy the source
    fn request_source_shutdown(&self) -> bool;

    fn source_type(&self) -> String;

    fn source_machine_name(&self) -> String {
        String::new()
    }

    fn source_status(&self) -> String;

    /// Settings were replaced through the client
    fn on_settings_changed(&self, settings: &SourceSettings) {
        let _ = settings;
    }
}

/// Builds sources of one type from a connection string
pub trait SourceFactory: Send + Sync {
    fn source_type(&self) -> &str;

    fn create(&self, connection_string: &str) -> Option<Arc<dyn Source>>;
}

/// Source that owns virtual subjects; it never produces data itself
#[derive(Debug, Default)]
pub struct VirtualSubjectSource {
    name: String,
    id: Mutex<Option<SourceId>>,
}

impl VirtualSubjectSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<SourceId> {
        *self.id.lock()
    }
}

impl Source for VirtualSubjectSource {
    fn receive_client(&self, _client: ClientHandle, source_id: SourceId) {
        *self.id.lock() = Some(source_id);
    }

    fn initialize_settings(&self, settings: &mut SourceSettings) {
        settings.settings_class = VIRTUAL_SETTINGS_CLASS.to_string();
        settings.source_name = Some(self.name.clone());
    }

    fn settings_class(&self) -> &str {
        VIRTUAL_SETTINGS_CLASS
    }

    fn is_source_still_valid(&self) -> bool {
        true
    }

    fn request_source_shutdown(&self) -> bool {
        true
    }

    fn source_type(&self) -> String {
        "Virtual Subjects".to_string()
    }

    fn source_machine_name(&self) -> String {
        self.name.clone()
    }

    fn source_status(&self) -> String {
        "Active".to_string()
    }
}
