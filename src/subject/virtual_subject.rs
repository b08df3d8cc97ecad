//! Subjects synthesized from other subjects
//!
//! A virtual subject has no buffer. Once per tick, after every live subject
//! has picked its snapshot, it is handed those snapshots by name and may
//! produce a composite frame.

use std::collections::HashMap;
use std::sync::Arc;

use super::pipeline::translate_for_role;
use super::settings::SubjectSettings;
use super::state::{PlayState, SubjectState};
use crate::data::{FrameData, FrameId, Role, StaticData, SubjectFrameData};
use crate::registry::{SubjectKey, SubjectName};

/// Inputs available to a virtual subject during one tick
#[derive(Debug, Clone, Copy)]
pub struct VirtualSubjectContext<'a> {
    /// Current snapshots of enabled subjects, by name
    pub snapshots: &'a HashMap<SubjectName, SubjectFrameData>,
    /// Consumer world time of the tick
    pub now: f64,
}

/// Output of one virtual subject update
#[derive(Debug, Clone)]
pub struct VirtualFrame {
    pub static_data: StaticData,
    pub frame: FrameData,
}

/// Computes a subject from other subjects' current data
pub trait VirtualSubject: Send + Sync {
    /// Role of the produced data
    fn role(&self) -> Role;

    /// Subjects read during [`update`](Self::update)
    fn dependencies(&self) -> Vec<SubjectName>;

    /// Produce this tick's data, or `None` when inputs are missing
    fn update(&mut self, ctx: &VirtualSubjectContext<'_>) -> Option<VirtualFrame>;

    /// Fresh instance with the same configuration
    fn duplicate(&self) -> Box<dyn VirtualSubject>;
}

/// Registry-side wrapper that tracks a virtual subject's output
pub struct VirtualSubjectHost {
    key: SubjectKey,
    inner: Box<dyn VirtualSubject>,
    settings: SubjectSettings,
    static_data: Option<Arc<StaticData>>,
    snapshot: Option<FrameData>,
    play_state: PlayState,
    static_rebroadcasted: bool,
    last_rebroadcast_frame: Option<FrameId>,
}

impl VirtualSubjectHost {
    pub fn new(key: SubjectKey, inner: Box<dyn VirtualSubject>) -> Self {
        let settings = SubjectSettings::new(inner.role());
        Self {
            key,
            inner,
            settings,
            static_data: None,
            snapshot: None,
            play_state: PlayState::Live,
            static_rebroadcasted: false,
            last_rebroadcast_frame: None,
        }
    }

    pub fn key(&self) -> &SubjectKey {
        &self.key
    }

    pub fn role(&self) -> Role {
        self.inner.role()
    }

    pub fn dependencies(&self) -> Vec<SubjectName> {
        self.inner.dependencies()
    }

    pub fn duplicate(&self) -> Box<dyn VirtualSubject> {
        self.inner.duplicate()
    }

    pub fn settings(&self) -> &SubjectSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SubjectSettings {
        &mut self.settings
    }

    /// Recompute the composite for this tick
    ///
    /// Paused subjects keep their previous output. Returns whether a new
    /// frame was produced.
    pub fn update(&mut self, ctx: &VirtualSubjectContext<'_>) -> bool {
        if self.play_state == PlayState::Paused {
            return false;
        }
        let Some(VirtualFrame {
            static_data,
            mut frame,
        }) = self.inner.update(ctx)
        else {
            return false;
        };

        if self.static_data.as_deref() != Some(&static_data) {
            tracing::debug!(subject = %self.key, "Virtual subject static data changed");
            self.static_data = Some(Arc::new(static_data));
            self.static_rebroadcasted = false;
        }

        frame.frame_id = FrameId::next();
        frame.arrival.world_time = ctx.now;
        self.snapshot = Some(frame);
        true
    }

    pub fn static_data(&self) -> Option<&Arc<StaticData>> {
        self.static_data.as_ref()
    }

    pub fn current_frame(&self) -> Option<&FrameData> {
        self.snapshot.as_ref()
    }

    pub fn has_valid_frame_snapshot(&self) -> bool {
        self.static_data.is_some() && self.snapshot.is_some()
    }

    pub fn clear_frames(&mut self) {
        self.snapshot = None;
    }

    pub fn pause(&mut self) -> bool {
        if self.play_state == PlayState::Paused {
            return false;
        }
        self.play_state = PlayState::Paused;
        true
    }

    pub fn unpause(&mut self) -> bool {
        if self.play_state == PlayState::Live {
            return false;
        }
        self.play_state = PlayState::Live;
        true
    }

    pub fn is_paused(&self) -> bool {
        self.play_state == PlayState::Paused
    }

    pub fn state(&self) -> SubjectState {
        if self.is_paused() {
            SubjectState::Paused
        } else if self.has_valid_frame_snapshot() {
            SubjectState::Connected
        } else {
            SubjectState::InvalidOrDisabled
        }
    }

    pub fn supports_role(&self, role: &Role) -> bool {
        let native = self.role();
        native.is_child_of(role)
            || self
                .settings
                .translators
                .iter()
                .any(|t| native.is_child_of(&t.from_role()) && t.to_role().is_child_of(role))
    }

    /// Current composite expressed in `desired`
    pub fn evaluate(&self, desired: &Role) -> Option<SubjectFrameData> {
        let static_data = Arc::clone(self.static_data.as_ref()?);
        let frame = self.snapshot.clone()?;
        translate_for_role(
            &self.role(),
            &self.settings.translators,
            static_data,
            frame,
            desired,
        )
    }

    pub fn static_rebroadcasted(&self) -> bool {
        self.static_rebroadcasted
    }

    pub fn set_static_rebroadcasted(&mut self, sent: bool) {
        self.static_rebroadcasted = sent;
    }

    pub fn last_rebroadcast_frame(&self) -> Option<FrameId> {
        self.last_rebroadcast_frame
    }

    pub fn set_last_rebroadcast_frame(&mut self, id: Option<FrameId>) {
        self.last_rebroadcast_frame = id;
    }
}

impl std::fmt::Debug for VirtualSubjectHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualSubjectHost")
            .field("key", &self.key)
            .field("role", &self.role())
            .field("play_state", &self.play_state)
            .finish()
    }
}

/// Concatenates the properties of several basic-role subjects
///
/// Output properties are named `subject.property`, in the order the subjects
/// were given. Produces nothing until every input has data.
#[derive(Debug, Clone, Default)]
pub struct CompositeVirtualSubject {
    subjects: Vec<SubjectName>,
}

impl CompositeVirtualSubject {
    pub fn new<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SubjectName>,
    {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }
}

impl VirtualSubject for CompositeVirtualSubject {
    fn role(&self) -> Role {
        Role::basic()
    }

    fn dependencies(&self) -> Vec<SubjectName> {
        self.subjects.clone()
    }

    fn update(&mut self, ctx: &VirtualSubjectContext<'_>) -> Option<VirtualFrame> {
        let basic = Role::basic();
        let mut names = Vec::new();
        let mut values = Vec::new();
        let mut newest = f64::MIN;

        for subject in &self.subjects {
            let input = ctx.snapshots.get(subject)?;
            if !input.role.is_child_of(&basic) {
                return None;
            }
            names.extend(
                input
                    .static_data
                    .property_names
                    .iter()
                    .map(|p| format!("{}.{}", subject, p)),
            );
            values.extend_from_slice(&input.frame.property_values);
            newest = newest.max(input.frame.world_time.source_time());
        }

        if self.subjects.is_empty() {
            return None;
        }

        Some(VirtualFrame {
            static_data: StaticData::with_properties(names),
            frame: FrameData::new(newest).with_properties(values),
        })
    }

    fn duplicate(&self) -> Box<dyn VirtualSubject> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceId;

    fn snapshot(names: &[&str], values: Vec<f32>, time: f64) -> SubjectFrameData {
        SubjectFrameData {
            role: Role::basic(),
            static_data: Arc::new(StaticData::with_properties(names.iter().copied())),
            frame: FrameData::new(time).with_properties(values),
        }
    }

    fn inputs() -> HashMap<SubjectName, SubjectFrameData> {
        let mut map = HashMap::new();
        map.insert(SubjectName::new("face"), snapshot(&["jaw"], vec![0.5], 1.0));
        map.insert(
            SubjectName::new("hand"),
            snapshot(&["grip", "spread"], vec![1.0, 0.25], 2.0),
        );
        map
    }

    fn host() -> VirtualSubjectHost {
        let key = SubjectKey::new(SourceId::DEFAULT_VIRTUAL, "rig");
        VirtualSubjectHost::new(key, Box::new(CompositeVirtualSubject::new(["face", "hand"])))
    }

    #[test]
    fn test_composite_concatenates_inputs() {
        let mut composite = CompositeVirtualSubject::new(["face", "hand"]);
        let snapshots = inputs();
        let ctx = VirtualSubjectContext {
            snapshots: &snapshots,
            now: 3.0,
        };

        let out = composite.update(&ctx).unwrap();

        assert_eq!(
            out.static_data.property_names,
            vec!["face.jaw", "hand.grip", "hand.spread"]
        );
        assert_eq!(out.frame.property_values, vec![0.5, 1.0, 0.25]);
        assert_eq!(out.frame.world_time.source_time(), 2.0);
    }

    #[test]
    fn test_composite_waits_for_all_inputs() {
        let mut composite = CompositeVirtualSubject::new(["face", "missing"]);
        let snapshots = inputs();
        let ctx = VirtualSubjectContext {
            snapshots: &snapshots,
            now: 0.0,
        };

        assert!(composite.update(&ctx).is_none());
    }

    #[test]
    fn test_host_assigns_frame_ids() {
        let mut host = host();
        let snapshots = inputs();
        let ctx = VirtualSubjectContext {
            snapshots: &snapshots,
            now: 5.0,
        };

        assert!(host.update(&ctx));
        let first = host.current_frame().unwrap().frame_id;
        assert!(host.update(&ctx));
        let second = host.current_frame().unwrap().frame_id;

        assert!(first.is_assigned());
        assert!(second > first);
        assert_eq!(host.current_frame().unwrap().arrival.world_time, 5.0);
        assert_eq!(host.state(), SubjectState::Connected);
    }

    #[test]
    fn test_host_resets_rebroadcast_on_static_change() {
        let mut host = host();
        let mut snapshots = inputs();
        let ctx = VirtualSubjectContext {
            snapshots: &snapshots,
            now: 0.0,
        };
        host.update(&ctx);
        host.set_static_rebroadcasted(true);

        // Same schema keeps the flag
        host.update(&ctx);
        assert!(host.static_rebroadcasted());

        snapshots.insert(SubjectName::new("face"), snapshot(&["blink"], vec![1.0], 1.0));
        let ctx = VirtualSubjectContext {
            snapshots: &snapshots,
            now: 0.0,
        };
        host.update(&ctx);
        assert!(!host.static_rebroadcasted());
    }

    #[test]
    fn test_host_pause_holds_output() {
        let mut host = host();
        let mut snapshots = inputs();
        host.update(&VirtualSubjectContext {
            snapshots: &snapshots,
            now: 0.0,
        });
        assert!(host.pause());

        snapshots.insert(SubjectName::new("face"), snapshot(&["jaw"], vec![0.9], 4.0));
        assert!(!host.update(&VirtualSubjectContext {
            snapshots: &snapshots,
            now: 1.0,
        }));

        let held = host.evaluate(&Role::basic()).unwrap();
        assert_eq!(held.frame.property_values[0], 0.5);
        assert_eq!(host.state(), SubjectState::Paused);
    }

    #[test]
    fn test_duplicate_keeps_dependencies() {
        let host = host();
        let copy = host.duplicate();

        assert_eq!(
            copy.dependencies(),
            vec![SubjectName::new("face"), SubjectName::new("hand")]
        );
    }
}
