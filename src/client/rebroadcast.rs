//! Rebroadcast sender contract
//!
//! Subjects flagged for rebroadcast are forwarded once per tick to an
//! external sender. The client tracks per subject whether static data was
//! already sent, so only frames go out until the schema changes.

use std::collections::BTreeMap;

use crate::data::{FrameData, Role, StaticData};
use crate::registry::{SubjectKey, SubjectName};

/// Free-form tags attached to rebroadcast data
pub type Annotations = BTreeMap<String, String>;

/// Annotation holding the originating source id
pub const SOURCE_ANNOTATION: &str = "source";

/// Annotation holding the original subject name
pub const SUBJECT_ANNOTATION: &str = "subject";

/// External sender of subject data
pub trait Rebroadcaster: Send + Sync {
    fn update_subject_static_data(
        &self,
        name: &SubjectName,
        role: &Role,
        static_data: &StaticData,
        annotations: &Annotations,
    );

    fn update_subject_frame_data(
        &self,
        name: &SubjectName,
        frame: &FrameData,
        annotations: &Annotations,
    );

    /// The subject stopped rebroadcasting or was removed
    fn remove_subject(&self, name: &SubjectName);
}

/// Tags describing where rebroadcast data came from
pub fn annotations_for(key: &SubjectKey) -> Annotations {
    let mut annotations = Annotations::new();
    annotations.insert(SOURCE_ANNOTATION.to_string(), key.source.to_string());
    annotations.insert(SUBJECT_ANNOTATION.to_string(), key.name.to_string());
    annotations
}
