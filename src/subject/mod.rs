//! Subjects and their pipelines
//!
//! A [`Subject`] is either fed by a source ([`LiveSubject`]) or computed from
//! other subjects each tick ([`VirtualSubjectHost`]). The registry stores the
//! enum and dispatches through it.

pub mod live;
pub mod pipeline;
pub mod settings;
pub mod state;
pub mod virtual_subject;

pub use live::{LiveSubject, PreparedFrame};
pub use pipeline::{
    translate_for_role, FrameInterpolator, FramePreProcessor, FrameTranslator,
    LinearInterpolator, PropertyRenameRemapper, SubjectRemapper,
};
pub use settings::{
    BufferSettings, EvaluationMode, PipelineFactory, RoleDefaults, SamplingMode, SourceSettings,
    SubjectSettings, DEFAULT_SETTINGS_CLASS, VIRTUAL_SETTINGS_CLASS,
};
pub use state::{EvaluationRequest, PlayState, SubjectState};
pub use virtual_subject::{
    CompositeVirtualSubject, VirtualFrame, VirtualSubject, VirtualSubjectContext,
    VirtualSubjectHost,
};

use std::sync::Arc;

use crate::data::{FrameData, FrameId, Role, StaticData, SubjectFrameData};

/// A registered subject of either kind
#[derive(Debug)]
pub enum Subject {
    Live(LiveSubject),
    Virtual(VirtualSubjectHost),
}

impl Subject {
    pub fn is_virtual(&self) -> bool {
        matches!(self, Subject::Virtual(_))
    }

    pub fn as_live(&self) -> Option<&LiveSubject> {
        match self {
            Subject::Live(s) => Some(s),
            Subject::Virtual(_) => None,
        }
    }

    pub fn as_live_mut(&mut self) -> Option<&mut LiveSubject> {
        match self {
            Subject::Live(s) => Some(s),
            Subject::Virtual(_) => None,
        }
    }

    pub fn as_virtual_mut(&mut self) -> Option<&mut VirtualSubjectHost> {
        match self {
            Subject::Virtual(s) => Some(s),
            Subject::Live(_) => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Subject::Live(s) => s.role().cloned(),
            Subject::Virtual(s) => Some(s.role()),
        }
    }

    pub fn settings(&self) -> &SubjectSettings {
        match self {
            Subject::Live(s) => s.settings(),
            Subject::Virtual(s) => s.settings(),
        }
    }

    pub fn settings_mut(&mut self) -> &mut SubjectSettings {
        match self {
            Subject::Live(s) => s.settings_mut(),
            Subject::Virtual(s) => s.settings_mut(),
        }
    }

    /// Remapped static data
    pub fn static_data(&self) -> Option<&Arc<StaticData>> {
        match self {
            Subject::Live(s) => s.static_data(true),
            Subject::Virtual(s) => s.static_data(),
        }
    }

    /// This tick's frame (the held frame when paused)
    pub fn current_frame(&self) -> Option<&FrameData> {
        match self {
            Subject::Live(s) => s.current_frame(),
            Subject::Virtual(s) => s.current_frame(),
        }
    }

    pub fn has_valid_frame_snapshot(&self) -> bool {
        match self {
            Subject::Live(s) => s.has_valid_frame_snapshot(),
            Subject::Virtual(s) => s.has_valid_frame_snapshot(),
        }
    }

    /// Evaluate at a request; virtual subjects only have their current frame
    pub fn evaluate(&self, request: EvaluationRequest, desired: &Role) -> Option<SubjectFrameData> {
        match self {
            Subject::Live(s) => s.evaluate(request, desired),
            Subject::Virtual(s) => s.evaluate(desired),
        }
    }

    /// Current snapshot expressed in `desired`
    pub fn evaluate_snapshot(&self, desired: &Role) -> Option<SubjectFrameData> {
        match self {
            Subject::Live(s) => s.evaluate_snapshot(desired),
            Subject::Virtual(s) => s.evaluate(desired),
        }
    }

    pub fn supports_role(&self, role: &Role) -> bool {
        match self {
            Subject::Live(s) => s.supports_role(role),
            Subject::Virtual(s) => s.supports_role(role),
        }
    }

    pub fn pause(&mut self) -> bool {
        match self {
            Subject::Live(s) => s.pause(),
            Subject::Virtual(s) => s.pause(),
        }
    }

    pub fn unpause(&mut self) -> bool {
        match self {
            Subject::Live(s) => s.unpause(),
            Subject::Virtual(s) => s.unpause(),
        }
    }

    pub fn is_paused(&self) -> bool {
        match self {
            Subject::Live(s) => s.is_paused(),
            Subject::Virtual(s) => s.is_paused(),
        }
    }

    pub fn clear_frames(&mut self) {
        match self {
            Subject::Live(s) => s.clear_frames(),
            Subject::Virtual(s) => s.clear_frames(),
        }
    }

    pub fn state(&self, now: f64, staleness: f64) -> SubjectState {
        match self {
            Subject::Live(s) => s.state(now, staleness),
            Subject::Virtual(s) => s.state(),
        }
    }

    pub fn static_rebroadcasted(&self) -> bool {
        match self {
            Subject::Live(s) => s.static_rebroadcasted(),
            Subject::Virtual(s) => s.static_rebroadcasted(),
        }
    }

    pub fn set_static_rebroadcasted(&mut self, sent: bool) {
        match self {
            Subject::Live(s) => s.set_static_rebroadcasted(sent),
            Subject::Virtual(s) => s.set_static_rebroadcasted(sent),
        }
    }

    pub fn last_rebroadcast_frame(&self) -> Option<FrameId> {
        match self {
            Subject::Live(s) => s.last_rebroadcast_frame(),
            Subject::Virtual(s) => s.last_rebroadcast_frame(),
        }
    }

    pub fn set_last_rebroadcast_frame(&mut self, id: Option<FrameId>) {
        match self {
            Subject::Live(s) => s.set_last_rebroadcast_frame(id),
            Subject::Virtual(s) => s.set_last_rebroadcast_frame(id),
        }
    }
}
