//! Source and subject settings, and the factory that fills in pipeline defaults

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::pipeline::{
    FrameInterpolator, FramePreProcessor, FrameTranslator, LinearInterpolator, SubjectRemapper,
};
use crate::data::Role;
use crate::time::{FrameRate, TIMECODE_DAY_SECONDS};

/// Settings class of ordinary sources
pub const DEFAULT_SETTINGS_CLASS: &str = "default";

/// Settings class of virtual-subject sources
pub const VIRTUAL_SETTINGS_CLASS: &str = "virtual";

/// Rate assumed when a source has not reported one yet
const FALLBACK_FRAME_RATE: f64 = 60.0;

const MIN_CAPACITY: usize = 2;
const MAX_CAPACITY: usize = 4096;

/// Which time a source's subjects are sampled at each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Most recently received sample
    #[default]
    Latest,
    /// Consumer wall clock minus the configured offset
    EngineTime,
    /// Consumer scene time minus the configured frame offset
    Timecode,
}

/// How a time request between two samples is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Nearest sample
    Closest,
    /// Blend the bracketing samples when an interpolator is available
    #[default]
    Interpolated,
}

/// Buffering and time alignment for a source's subjects
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSettings {
    /// Span of time the buffer should be able to cover
    pub evaluation_window: Duration,

    /// Explicit capacity, overriding the window-derived one
    pub max_frames: Option<usize>,

    /// Frame rate reported by the source's subjects
    pub detected_frame_rate: Option<FrameRate>,

    /// Extra delay applied to engine-time evaluation, in seconds
    pub engine_time_offset: f64,

    /// Extra delay applied to timecode evaluation, in frames
    pub timecode_frame_offset: f64,

    /// Scene-time wrap period (`None` disables rollover handling)
    pub timecode_rollover: Option<Duration>,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            evaluation_window: Duration::from_millis(250),
            max_frames: None,
            detected_frame_rate: None,
            engine_time_offset: 0.0,
            timecode_frame_offset: 0.0,
            timecode_rollover: Some(Duration::from_secs_f64(TIMECODE_DAY_SECONDS)),
        }
    }
}

impl BufferSettings {
    /// Number of samples to keep per subject
    ///
    /// Derived from the evaluation window at the detected frame rate, plus one
    /// sample so a full window can still be bracketed.
    pub fn capacity(&self) -> usize {
        if let Some(max) = self.max_frames {
            return max.clamp(1, MAX_CAPACITY);
        }
        let fps = self
            .detected_frame_rate
            .filter(FrameRate::is_valid)
            .map(|r| r.as_fps())
            .unwrap_or(FALLBACK_FRAME_RATE);
        let frames = (self.evaluation_window.as_secs_f64() * fps).ceil() as usize + 1;
        frames.clamp(MIN_CAPACITY, MAX_CAPACITY)
    }

    pub fn rollover_seconds(&self) -> Option<f64> {
        self.timecode_rollover.map(|d| d.as_secs_f64())
    }
}

/// Per-source settings
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// Identity used to pick default pipeline stages
    pub settings_class: String,
    pub mode: EvaluationMode,
    pub buffer: BufferSettings,
    /// Adapter-specific address or descriptor
    pub connection_string: String,
    /// Name of a virtual source
    pub source_name: Option<String>,
    /// Adapter-specific options
    pub properties: BTreeMap<String, String>,
}

impl SourceSettings {
    pub fn new(settings_class: impl Into<String>) -> Self {
        Self {
            settings_class: settings_class.into(),
            mode: EvaluationMode::default(),
            buffer: BufferSettings::default(),
            connection_string: String::new(),
            source_name: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn virtual_source(name: impl Into<String>) -> Self {
        Self {
            source_name: Some(name.into()),
            ..Self::new(VIRTUAL_SETTINGS_CLASS)
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.settings_class == VIRTUAL_SETTINGS_CLASS
    }

    /// Set the evaluation mode
    pub fn mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the buffer settings
    pub fn buffer(mut self, buffer: BufferSettings) -> Self {
        self.buffer = buffer;
        self
    }

    /// Set the connection string
    pub fn connection_string(mut self, connection: impl Into<String>) -> Self {
        self.connection_string = connection.into();
        self
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_CLASS)
    }
}

/// Per-subject settings, including its pipeline stages
#[derive(Clone, Default)]
pub struct SubjectSettings {
    pub role: Option<Role>,
    pub sampling: SamplingMode,
    pub interpolator: Option<Arc<dyn FrameInterpolator>>,
    pub pre_processors: Vec<Arc<dyn FramePreProcessor>>,
    pub translators: Vec<Arc<dyn FrameTranslator>>,
    pub remapper: Option<Arc<dyn SubjectRemapper>>,
    /// Rate of the subject's scene time, detected from incoming frames
    pub frame_rate: Option<FrameRate>,
    /// Forward this subject to the rebroadcast sender
    pub rebroadcast: bool,
    /// Name used when rebroadcasting, defaults to the subject name
    pub rebroadcast_name: Option<String>,
}

impl SubjectSettings {
    pub fn new(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    /// Set the sampling mode
    pub fn sampling(mut self, sampling: SamplingMode) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set the interpolator
    pub fn interpolator(mut self, interpolator: Arc<dyn FrameInterpolator>) -> Self {
        self.interpolator = Some(interpolator);
        self
    }

    /// Append a pre-processor
    pub fn pre_processor(mut self, processor: Arc<dyn FramePreProcessor>) -> Self {
        self.pre_processors.push(processor);
        self
    }

    /// Append a translator
    pub fn translator(mut self, translator: Arc<dyn FrameTranslator>) -> Self {
        self.translators.push(translator);
        self
    }

    /// Set the remapper
    pub fn remapper(mut self, remapper: Arc<dyn SubjectRemapper>) -> Self {
        self.remapper = Some(remapper);
        self
    }

    /// Enable rebroadcasting
    pub fn rebroadcast(mut self, enabled: bool) -> Self {
        self.rebroadcast = enabled;
        self
    }
}

impl fmt::Debug for SubjectSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectSettings")
            .field("role", &self.role)
            .field("sampling", &self.sampling)
            .field("interpolator", &self.interpolator.as_ref().map(|i| i.name()))
            .field(
                "pre_processors",
                &self.pre_processors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "translators",
                &self.translators.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("remapper", &self.remapper.as_ref().map(|r| r.name()))
            .field("frame_rate", &self.frame_rate)
            .field("rebroadcast", &self.rebroadcast)
            .field("rebroadcast_name", &self.rebroadcast_name)
            .finish()
    }
}

/// Default stages for one role
#[derive(Clone, Default)]
pub struct RoleDefaults {
    pub interpolator: Option<Arc<dyn FrameInterpolator>>,
    pub pre_processors: Vec<Arc<dyn FramePreProcessor>>,
    pub translators: Vec<Arc<dyn FrameTranslator>>,
    pub remapper: Option<Arc<dyn SubjectRemapper>>,
}

/// Builds [`SubjectSettings`] for newly created subjects
///
/// Lookup order: defaults registered for (settings class, role), then for the
/// role alone, then the fallback interpolator.
#[derive(Clone, Default)]
pub struct PipelineFactory {
    by_role: HashMap<String, RoleDefaults>,
    by_class: HashMap<(String, String), RoleDefaults>,
    fallback_interpolator: Option<Arc<dyn FrameInterpolator>>,
}

impl PipelineFactory {
    /// Factory with a linear interpolator as fallback for the basic role
    pub fn new() -> Self {
        Self {
            fallback_interpolator: Some(Arc::new(LinearInterpolator::default())),
            ..Default::default()
        }
    }

    /// Factory with no defaults at all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register_role_defaults(&mut self, role: &Role, defaults: RoleDefaults) {
        self.by_role.insert(role.name().to_string(), defaults);
    }

    pub fn register_class_defaults(
        &mut self,
        settings_class: impl Into<String>,
        role: &Role,
        defaults: RoleDefaults,
    ) {
        self.by_class
            .insert((settings_class.into(), role.name().to_string()), defaults);
    }

    pub fn set_fallback_interpolator(&mut self, interpolator: Option<Arc<dyn FrameInterpolator>>) {
        self.fallback_interpolator = interpolator;
    }

    /// Settings for a new subject of `role` on a source of `settings_class`
    pub fn build(&self, settings_class: &str, role: &Role) -> SubjectSettings {
        let defaults = self
            .by_class
            .get(&(settings_class.to_string(), role.name().to_string()))
            .or_else(|| self.by_role.get(role.name()))
            .cloned()
            .unwrap_or_default();

        let interpolator = defaults
            .interpolator
            .or_else(|| self.fallback_interpolator.clone())
            .filter(|i| role.is_child_of(&i.role()));

        let pre_processors = defaults
            .pre_processors
            .into_iter()
            .filter(|p| {
                let supported = role.is_child_of(&p.role());
                if !supported {
                    tracing::warn!(
                        role = %role,
                        stage = p.name(),
                        "Pre-processor does not support role, skipping"
                    );
                }
                supported
            })
            .collect();

        let translators = defaults
            .translators
            .into_iter()
            .filter(|t| role.is_child_of(&t.from_role()))
            .collect();

        SubjectSettings {
            role: Some(role.clone()),
            sampling: SamplingMode::default(),
            interpolator,
            pre_processors,
            translators,
            remapper: defaults.remapper,
            frame_rate: None,
            rebroadcast: false,
            rebroadcast_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FrameData, RoleSchema, StaticData};
    use crate::error::DataError;

    #[derive(Debug)]
    struct OtherRole;

    impl RoleSchema for OtherRole {
        fn name(&self) -> &str {
            "other"
        }

        fn is_frame_data_valid(&self, _: &StaticData, _: &FrameData) -> Result<(), DataError> {
            Ok(())
        }
    }

    struct Offset(f32);

    impl FramePreProcessor for Offset {
        fn name(&self) -> &str {
            "offset"
        }

        fn role(&self) -> Role {
            Role::basic()
        }

        fn process(&self, _: &StaticData, frame: &mut FrameData) {
            for v in &mut frame.property_values {
                *v += self.0;
            }
        }
    }

    #[test]
    fn test_capacity_from_window() {
        let settings = BufferSettings::default();
        // 250ms at the 60fps fallback, plus one
        assert_eq!(settings.capacity(), 16);

        let settings = BufferSettings {
            detected_frame_rate: Some(FrameRate::FPS_24),
            evaluation_window: Duration::from_secs(1),
            ..Default::default()
        };
        assert_eq!(settings.capacity(), 25);
    }

    #[test]
    fn test_capacity_bounds() {
        let tiny = BufferSettings {
            evaluation_window: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(tiny.capacity(), MIN_CAPACITY);

        let explicit = BufferSettings {
            max_frames: Some(5),
            ..Default::default()
        };
        assert_eq!(explicit.capacity(), 5);

        let huge = BufferSettings {
            max_frames: Some(usize::MAX),
            ..Default::default()
        };
        assert_eq!(huge.capacity(), MAX_CAPACITY);
    }

    #[test]
    fn test_rollover_default() {
        let settings = BufferSettings::default();

        assert_eq!(settings.rollover_seconds(), Some(TIMECODE_DAY_SECONDS));
    }

    #[test]
    fn test_source_settings_builders() {
        let settings = SourceSettings::default()
            .mode(EvaluationMode::Timecode)
            .connection_string("udp://10.0.0.2:54321");

        assert_eq!(settings.settings_class, DEFAULT_SETTINGS_CLASS);
        assert_eq!(settings.mode, EvaluationMode::Timecode);
        assert_eq!(settings.connection_string, "udp://10.0.0.2:54321");
        assert!(!settings.is_virtual());
        assert!(SourceSettings::virtual_source("rigs").is_virtual());
    }

    #[test]
    fn test_factory_fallback_interpolator() {
        let factory = PipelineFactory::new();

        let basic = factory.build(DEFAULT_SETTINGS_CLASS, &Role::basic());
        assert!(basic.interpolator.is_some());
        assert_eq!(basic.role, Some(Role::basic()));

        // Linear interpolator is registered for the basic role only
        let other = factory.build(DEFAULT_SETTINGS_CLASS, &Role::new(OtherRole));
        assert!(other.interpolator.is_none());

        assert!(PipelineFactory::empty()
            .build(DEFAULT_SETTINGS_CLASS, &Role::basic())
            .interpolator
            .is_none());
    }

    #[test]
    fn test_factory_class_defaults_take_precedence() {
        let mut factory = PipelineFactory::new();
        factory.register_role_defaults(&Role::basic(), RoleDefaults::default());
        factory.register_class_defaults(
            "mocap",
            &Role::basic(),
            RoleDefaults {
                pre_processors: vec![Arc::new(Offset(1.0))],
                ..Default::default()
            },
        );

        assert_eq!(factory.build("mocap", &Role::basic()).pre_processors.len(), 1);
        assert!(factory
            .build(DEFAULT_SETTINGS_CLASS, &Role::basic())
            .pre_processors
            .is_empty());
    }

    #[test]
    fn test_factory_skips_incompatible_stages() {
        let mut factory = PipelineFactory::empty();
        let other = Role::new(OtherRole);
        factory.register_role_defaults(
            &other,
            RoleDefaults {
                pre_processors: vec![Arc::new(Offset(1.0))],
                ..Default::default()
            },
        );

        assert!(factory
            .build(DEFAULT_SETTINGS_CLASS, &other)
            .pre_processors
            .is_empty());
    }

    #[test]
    fn test_subject_settings_debug_lists_stages() {
        let settings = SubjectSettings::new(Role::basic())
            .interpolator(Arc::new(LinearInterpolator::default()))
            .pre_processor(Arc::new(Offset(2.0)));

        let text = format!("{:?}", settings);
        assert!(text.contains("linear"));
        assert!(text.contains("offset"));
    }
}
