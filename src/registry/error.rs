//! Registry error types

use super::key::{SourceId, SubjectKey};

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Source not found
    SourceNotFound(SourceId),
    /// Subject not found
    SubjectNotFound(SubjectKey),
    /// A source with this id is already registered
    SourceAlreadyExists(SourceId),
    /// A virtual source with this name is already registered
    VirtualSourceNameTaken(String),
    /// A live subject with this key is already registered
    SubjectAlreadyExists(SubjectKey),
    /// Source is scheduled for removal and accepts no new subjects
    SourcePendingKill(SourceId),
    /// Virtual subjects can only live on virtual sources
    NotVirtualSource(SourceId),
    /// Registry was re-entered from inside a visitor
    ReentrantAccess,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::SourceNotFound(id) => write!(f, "Source not found: {}", id),
            RegistryError::SubjectNotFound(key) => write!(f, "Subject not found: {}", key),
            RegistryError::SourceAlreadyExists(id) => {
                write!(f, "Source already registered: {}", id)
            }
            RegistryError::VirtualSourceNameTaken(name) => {
                write!(f, "Virtual source name already in use: {}", name)
            }
            RegistryError::SubjectAlreadyExists(key) => {
                write!(f, "Subject already registered: {}", key)
            }
            RegistryError::SourcePendingKill(id) => write!(f, "Source is being removed: {}", id),
            RegistryError::NotVirtualSource(id) => write!(f, "Source is not virtual: {}", id),
            RegistryError::ReentrantAccess => write!(f, "Registry accessed from inside a visitor"),
        }
    }
}

impl std::error::Error for RegistryError {}
