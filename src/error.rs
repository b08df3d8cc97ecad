//! Error types
//!
//! Producers never see these: push calls have no failure path. They are
//! returned by structural operations (presets, virtual subjects) and by role
//! validators, whose results the ingestion path logs and drops.

use std::fmt;

use crate::registry::{RegistryError, SourceId, SubjectKey};

/// Result of validating a payload against its role
#[derive(Debug, Clone, PartialEq)]
pub enum DataError {
    /// Frames cannot be accepted before static data
    MissingStaticData,
    /// Frame value count does not match the static schema
    PropertyCountMismatch { expected: usize, actual: usize },
    /// Static data carries no usable schema for this role
    EmptySchema,
    /// Producer world time is NaN or infinite
    NonFiniteTime,
    /// Role-specific validation failure
    Malformed(String),
}

impl DataError {
    /// Stable identifier used to report each distinct cause once
    pub fn reason(&self) -> &'static str {
        match self {
            DataError::MissingStaticData => "missing_static_data",
            DataError::PropertyCountMismatch { .. } => "property_count_mismatch",
            DataError::EmptySchema => "empty_schema",
            DataError::NonFiniteTime => "non_finite_time",
            DataError::Malformed(_) => "malformed",
        }
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::MissingStaticData => write!(f, "No static data set"),
            DataError::PropertyCountMismatch { expected, actual } => write!(
                f,
                "Property count mismatch: expected {}, got {}",
                expected, actual
            ),
            DataError::EmptySchema => write!(f, "Static data has an empty schema"),
            DataError::NonFiniteTime => write!(f, "Frame time is not finite"),
            DataError::Malformed(reason) => write!(f, "Malformed data: {}", reason),
        }
    }
}

impl std::error::Error for DataError {}

/// Error type for create-from-preset operations
#[derive(Debug, Clone, PartialEq)]
pub enum PresetError {
    /// The nil id cannot name a source
    InvalidSourceId,
    /// The default virtual source is created by the client itself
    DefaultVirtualSource,
    /// A source with this id already exists
    DuplicateSource(SourceId),
    /// No factory registered for this source type
    UnknownSourceType(String),
    /// The factory declined to build a source
    FactoryFailed(String),
    /// Subject preset without a role
    RoleUndefined(SubjectKey),
    /// Subject preset with an empty name
    EmptySubjectName,
    /// The subject's source does not exist or is being removed
    SourceNotFound(SourceId),
    /// A subject with this key already exists
    DuplicateSubject(SubjectKey),
    /// Subjects on a virtual source must be virtual subjects
    MissingVirtualSubject(SubjectKey),
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::InvalidSourceId => write!(f, "Source id is not valid"),
            PresetError::DefaultVirtualSource => {
                write!(f, "Cannot create the default virtual source from a preset")
            }
            PresetError::DuplicateSource(id) => write!(f, "Source already exists: {}", id),
            PresetError::UnknownSourceType(ty) => write!(f, "Unknown source type: {}", ty),
            PresetError::FactoryFailed(ty) => {
                write!(f, "Factory for '{}' could not create a source", ty)
            }
            PresetError::RoleUndefined(key) => write!(f, "Subject has no role: {}", key),
            PresetError::EmptySubjectName => write!(f, "Subject name is empty"),
            PresetError::SourceNotFound(id) => write!(f, "Source not found: {}", id),
            PresetError::DuplicateSubject(key) => write!(f, "Subject already exists: {}", key),
            PresetError::MissingVirtualSubject(key) => {
                write!(f, "Subject on a virtual source is not virtual: {}", key)
            }
        }
    }
}

impl std::error::Error for PresetError {}

/// Crate-level error
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Registry(RegistryError),
    Preset(PresetError),
    Data(DataError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Preset(e) => write!(f, "Preset error: {}", e),
            Error::Data(e) => write!(f, "Data error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Registry(e) => Some(e),
            Error::Preset(e) => Some(e),
            Error::Data(e) => Some(e),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<PresetError> for Error {
    fn from(e: PresetError) -> Self {
        Error::Preset(e)
    }
}

impl From<DataError> for Error {
    fn from(e: DataError) -> Self {
        Error::Data(e)
    }
}

/// Result alias for hub operations
pub type Result<T> = std::result::Result<T, Error>;
