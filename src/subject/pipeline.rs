//! Pipeline stages applied to subject data
//!
//! Stages are owned by a subject's settings as `Arc<dyn ...>`. Each one
//! declares the role it works on and only runs on subjects whose role is
//! that role or a child of it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::data::{FrameData, Role, StaticData, SubjectFrameData};
use crate::time::WorldTime;

/// Transforms a frame in place before it is handed out
pub trait FramePreProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> Role;

    fn process(&self, static_data: &StaticData, frame: &mut FrameData);
}

/// Blends two frames of the same subject
pub trait FrameInterpolator: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> Role;

    /// Blend `from` toward `to`; `alpha` is in `[0, 1]`
    fn interpolate(
        &self,
        static_data: &StaticData,
        from: &FrameData,
        to: &FrameData,
        alpha: f64,
    ) -> FrameData;
}

/// Converts data from one role into another
pub trait FrameTranslator: Send + Sync {
    fn name(&self) -> &str;

    fn from_role(&self) -> Role;

    fn to_role(&self) -> Role;

    fn translate(&self, static_data: &StaticData, frame: &FrameData)
        -> Option<(StaticData, FrameData)>;
}

/// Rewrites identifiers inside static and frame data
pub trait SubjectRemapper: Send + Sync {
    fn name(&self) -> &str;

    fn remap_static_data(&self, role: &Role, static_data: &mut StaticData);

    fn remap_frame_data(&self, static_data: &StaticData, frame: &mut FrameData) {
        let _ = (static_data, frame);
    }
}

/// Express data in `desired`, using at most one translator hop
///
/// Returns `None` when the native role does not satisfy `desired` and no
/// translator bridges the two. That is a normal outcome, not an error.
pub fn translate_for_role(
    native: &Role,
    translators: &[Arc<dyn FrameTranslator>],
    static_data: Arc<StaticData>,
    frame: FrameData,
    desired: &Role,
) -> Option<SubjectFrameData> {
    if native.is_child_of(desired) {
        return Some(SubjectFrameData {
            role: native.clone(),
            static_data,
            frame,
        });
    }

    let translator = translators
        .iter()
        .find(|t| native.is_child_of(&t.from_role()) && t.to_role().is_child_of(desired));
    let Some(translator) = translator else {
        tracing::trace!(native = %native, desired = %desired, "No translator for role");
        return None;
    };

    let (static_data, frame) = translator.translate(&static_data, &frame)?;
    Some(SubjectFrameData {
        role: translator.to_role(),
        static_data: Arc::new(static_data),
        frame,
    })
}

/// Linear blend of property values and world time
///
/// Non-numeric content (metadata, payload, scene time, frame id) is taken
/// from whichever input is nearer.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    role: Role,
}

impl LinearInterpolator {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

impl Default for LinearInterpolator {
    fn default() -> Self {
        Self::new(Role::basic())
    }
}

impl FrameInterpolator for LinearInterpolator {
    fn name(&self) -> &str {
        "linear"
    }

    fn role(&self) -> Role {
        self.role.clone()
    }

    fn interpolate(
        &self,
        _static_data: &StaticData,
        from: &FrameData,
        to: &FrameData,
        alpha: f64,
    ) -> FrameData {
        let alpha = alpha.clamp(0.0, 1.0);
        let mut out = if alpha < 0.5 { from.clone() } else { to.clone() };

        let lerp = |a: f64, b: f64| a + (b - a) * alpha;
        out.world_time = WorldTime::with_offset(
            lerp(from.world_time.source_time(), to.world_time.source_time()),
            lerp(from.world_time.offset(), to.world_time.offset()),
        );

        if from.property_values.len() == to.property_values.len() {
            out.property_values = from
                .property_values
                .iter()
                .zip(&to.property_values)
                .map(|(&a, &b)| lerp(a as f64, b as f64) as f32)
                .collect();
        }

        out
    }
}

/// Renames properties in static data
#[derive(Debug, Clone, Default)]
pub struct PropertyRenameRemapper {
    renames: HashMap<String, String>,
}

impl PropertyRenameRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.insert(from.into(), to.into());
        self
    }
}

impl SubjectRemapper for PropertyRenameRemapper {
    fn name(&self) -> &str {
        "property_rename"
    }

    fn remap_static_data(&self, _role: &Role, static_data: &mut StaticData) {
        for name in &mut static_data.property_names {
            if let Some(renamed) = self.renames.get(name.as_str()) {
                *name = renamed.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_linear_interpolation() {
        let interpolator = LinearInterpolator::default();
        let from = FrameData::new(10.0).with_properties(vec![0.0, 10.0]);
        let to = FrameData::new(11.0).with_properties(vec![4.0, 20.0]);

        let out = interpolator.interpolate(&StaticData::new(), &from, &to, 0.25);

        assert!((out.world_time.source_time() - 10.25).abs() < 1e-12);
        assert_eq!(out.property_values, vec![1.0, 12.5]);
    }

    #[test]
    fn test_linear_interpolation_takes_nearer_payload() {
        let interpolator = LinearInterpolator::default();
        let from = FrameData::new(0.0).with_payload(Bytes::from_static(b"a"));
        let to = FrameData::new(1.0).with_payload(Bytes::from_static(b"b"));

        let early = interpolator.interpolate(&StaticData::new(), &from, &to, 0.2);
        let late = interpolator.interpolate(&StaticData::new(), &from, &to, 0.8);

        assert_eq!(early.payload, Bytes::from_static(b"a"));
        assert_eq!(late.payload, Bytes::from_static(b"b"));
    }

    #[test]
    fn test_linear_interpolation_mismatched_lengths() {
        let interpolator = LinearInterpolator::default();
        let from = FrameData::new(0.0).with_properties(vec![1.0]);
        let to = FrameData::new(1.0).with_properties(vec![1.0, 2.0]);

        let out = interpolator.interpolate(&StaticData::new(), &from, &to, 0.1);
        assert_eq!(out.property_values, vec![1.0]);
    }

    #[test]
    fn test_linear_interpolation_clamps_alpha() {
        let interpolator = LinearInterpolator::default();
        let from = FrameData::new(0.0).with_properties(vec![0.0]);
        let to = FrameData::new(1.0).with_properties(vec![1.0]);

        let out = interpolator.interpolate(&StaticData::new(), &from, &to, 3.0);
        assert_eq!(out.property_values, vec![1.0]);
    }

    #[test]
    fn test_property_rename() {
        let remapper = PropertyRenameRemapper::new().rename("jaw", "jawOpen");
        let mut static_data = StaticData::with_properties(["jaw", "blink"]);

        remapper.remap_static_data(&Role::basic(), &mut static_data);

        assert_eq!(static_data.property_names, vec!["jawOpen", "blink"]);
    }
}
