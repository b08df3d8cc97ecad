//! Roles describe the shape and meaning of a subject's payload
//!
//! A [`Role`] is a cheap, cloneable handle around a [`RoleSchema`]. Two roles
//! are equal when their names are equal. Roles may declare a parent, which
//! lets stages written for a parent role run on its children.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::payload::{FrameData, StaticData};
use crate::error::DataError;

/// Validation and identity for one kind of payload
pub trait RoleSchema: Send + Sync + fmt::Debug {
    /// Unique, stable identifier
    fn name(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str {
        self.name()
    }

    /// Role this one specializes
    fn parent(&self) -> Option<Role> {
        None
    }

    fn is_static_data_valid(&self, static_data: &StaticData) -> Result<(), DataError> {
        let _ = static_data;
        Ok(())
    }

    fn is_frame_data_valid(
        &self,
        static_data: &StaticData,
        frame: &FrameData,
    ) -> Result<(), DataError>;
}

/// Shared handle to a role schema
#[derive(Clone)]
pub struct Role(Arc<dyn RoleSchema>);

impl Role {
    pub fn new<S: RoleSchema + 'static>(schema: S) -> Self {
        Self(Arc::new(schema))
    }

    /// The built-in property-curve role
    pub fn basic() -> Self {
        Self::new(BasicRole)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn display_name(&self) -> &str {
        self.0.display_name()
    }

    pub fn parent(&self) -> Option<Role> {
        self.0.parent()
    }

    pub fn is_static_data_valid(&self, static_data: &StaticData) -> Result<(), DataError> {
        self.0.is_static_data_valid(static_data)
    }

    pub fn is_frame_data_valid(
        &self,
        static_data: &StaticData,
        frame: &FrameData,
    ) -> Result<(), DataError> {
        self.0.is_frame_data_valid(static_data, frame)
    }

    /// True when `other` is this role or one of its ancestors
    pub fn is_child_of(&self, other: &Role) -> bool {
        let mut current = Some(self.clone());
        while let Some(role) = current {
            if &role == other {
                return true;
            }
            current = role.parent();
        }
        false
    }
}

impl PartialEq for Role {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Role {}

impl Hash for Role {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role({})", self.name())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Named float properties, one value per name per frame
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicRole;

impl BasicRole {
    pub const NAME: &'static str = "basic";
}

impl RoleSchema for BasicRole {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn display_name(&self) -> &str {
        "Basic"
    }

    fn is_frame_data_valid(
        &self,
        static_data: &StaticData,
        frame: &FrameData,
    ) -> Result<(), DataError> {
        if frame.property_values.len() != static_data.property_names.len() {
            return Err(DataError::PropertyCountMismatch {
                expected: static_data.property_names.len(),
                actual: frame.property_values.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TransformRole;

    impl RoleSchema for TransformRole {
        fn name(&self) -> &str {
            "transform"
        }

        fn parent(&self) -> Option<Role> {
            Some(Role::basic())
        }

        fn is_static_data_valid(&self, static_data: &StaticData) -> Result<(), DataError> {
            if static_data.property_names.is_empty() {
                return Err(DataError::EmptySchema);
            }
            Ok(())
        }

        fn is_frame_data_valid(&self, s: &StaticData, f: &FrameData) -> Result<(), DataError> {
            BasicRole.is_frame_data_valid(s, f)
        }
    }

    #[test]
    fn test_roles_compare_by_name() {
        assert_eq!(Role::basic(), Role::basic());
        assert_ne!(Role::basic(), Role::new(TransformRole));
        assert_eq!(Role::basic().to_string(), "Basic");
        assert_eq!(format!("{:?}", Role::basic()), "Role(basic)");
    }

    #[test]
    fn test_is_child_of() {
        let transform = Role::new(TransformRole);

        assert!(transform.is_child_of(&Role::basic()));
        assert!(transform.is_child_of(&transform));
        assert!(!Role::basic().is_child_of(&transform));
    }

    #[test]
    fn test_basic_role_validation() {
        let role = Role::basic();
        let static_data = StaticData::with_properties(["a", "b"]);

        assert!(role.is_static_data_valid(&static_data).is_ok());
        assert!(role
            .is_frame_data_valid(&static_data, &FrameData::new(0.0).with_properties(vec![1.0, 2.0]))
            .is_ok());

        let err = role
            .is_frame_data_valid(&static_data, &FrameData::new(0.0).with_properties(vec![1.0]))
            .unwrap_err();
        assert_eq!(
            err,
            DataError::PropertyCountMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_custom_static_validation() {
        let role = Role::new(TransformRole);

        assert_eq!(
            role.is_static_data_valid(&StaticData::new()),
            Err(DataError::EmptySchema)
        );
    }
}
