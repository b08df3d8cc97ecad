//! Static and per-frame payloads
//!
//! Payloads share a generic shape: named properties with one value per name
//! per frame, plus an opaque `Bytes` blob for role-specific content. Cloning a
//! frame only bumps the blob's reference count.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use super::role::Role;
use crate::time::{QualifiedFrameTime, WorldTime};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Receive-order identifier, assigned when a frame is drained
///
/// Monotonic for the whole process and never reused. Zero means the frame has
/// not been drained yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameId(u64);

impl FrameId {
    pub const UNASSIGNED: FrameId = FrameId(0);

    pub(crate) fn next() -> Self {
        FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Schema-level data, set rarely
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticData {
    /// Names of the per-frame properties, in value order
    pub property_names: Vec<String>,
    /// Role-specific schema content
    pub payload: Bytes,
}

impl StaticData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            property_names: names.into_iter().map(Into::into).collect(),
            payload: Bytes::new(),
        }
    }

    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.property_names.iter().position(|n| n == name)
    }
}

/// Consumer-side times stamped when a frame is drained
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArrivalTime {
    pub world_time: f64,
    pub scene_time: Option<QualifiedFrameTime>,
}

/// One time-stamped sample of a subject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameData {
    /// Producer wall clock and the offset estimate applied on arrival
    pub world_time: WorldTime,
    /// Producer timecode, if the source is timecode-driven
    pub scene_time: Option<QualifiedFrameTime>,
    /// Stamped by the hub when the frame is pushed
    pub arrival: ArrivalTime,
    /// One value per static property name
    pub property_values: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
    /// Role-specific frame content
    pub payload: Bytes,
    pub frame_id: FrameId,
}

impl FrameData {
    pub fn new(world_time: f64) -> Self {
        Self {
            world_time: WorldTime::new(world_time),
            ..Default::default()
        }
    }

    pub fn with_scene_time(mut self, scene_time: QualifiedFrameTime) -> Self {
        self.scene_time = Some(scene_time);
        self
    }

    pub fn with_properties(mut self, values: Vec<f32>) -> Self {
        self.property_values = values;
        self
    }

    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Value of a named property, resolved through the static schema
    pub fn property(&self, static_data: &StaticData, name: &str) -> Option<f32> {
        static_data
            .property_index(name)
            .and_then(|i| self.property_values.get(i).copied())
    }
}

/// Resolved result of one evaluation
#[derive(Debug, Clone)]
pub struct SubjectFrameData {
    /// Role the data is expressed in (after any translation)
    pub role: Role,
    pub static_data: Arc<StaticData>,
    pub frame: FrameData,
}
