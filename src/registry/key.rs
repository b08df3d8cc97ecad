//! Identifier types for sources and subjects
//!
//! Producers only ever hold these keys, never references into registry state.

use uuid::Uuid;

/// Process-unique source identifier (random 128-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Uuid);

impl SourceId {
    /// Id of the virtual source every client creates for itself
    pub const DEFAULT_VIRTUAL: SourceId =
        SourceId(Uuid::from_u128(0x4c49_4e4b_4855_4200_0000_0000_0000_0001));

    /// Generate a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil id, never assigned to a real source
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_nil()
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a subject, unique per source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SubjectName(String);

impl SubjectName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SubjectName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for SubjectName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&SubjectName> for SubjectName {
    fn from(name: &SubjectName) -> Self {
        name.clone()
    }
}

impl std::fmt::Display for SubjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique subject identifier (source + subject name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectKey {
    /// Owning source
    pub source: SourceId,
    /// Subject name within the source
    pub name: SubjectName,
}

impl SubjectKey {
    /// Create a new subject key
    pub fn new(source: SourceId, name: impl Into<SubjectName>) -> Self {
        Self {
            source,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ids_are_unique() {
        let a = SourceId::new();
        let b = SourceId::new();

        assert_ne!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn test_nil_and_default_virtual() {
        assert!(!SourceId::nil().is_valid());
        assert!(SourceId::DEFAULT_VIRTUAL.is_valid());
        assert_ne!(SourceId::DEFAULT_VIRTUAL, SourceId::new());
    }

    #[test]
    fn test_subject_key_display() {
        let id = SourceId::from_uuid(Uuid::nil());
        let key = SubjectKey::new(id, "Actor");

        assert_eq!(
            key.to_string(),
            "Actor@00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_subject_key_equality() {
        let id = SourceId::new();
        let a = SubjectKey::new(id, "Actor");
        let b = SubjectKey::new(id, String::from("Actor"));
        let c = SubjectKey::new(SourceId::new(), "Actor");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_subject_name() {
        assert!(SubjectName::default().is_empty());
        assert_eq!(SubjectName::from("Cam").as_str(), "Cam");
    }
}
