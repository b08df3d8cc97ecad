//! Subjects fed by a source
//!
//! A live subject owns its frame buffer and pipeline. Frames are accepted only
//! after static data; each accepted frame is stamped, fed through the source's
//! offset estimators, remapped and appended. Evaluation resolves a request
//! against the buffer, then runs pre-processors and at most one translator.

use std::sync::Arc;

use super::pipeline::translate_for_role;
use super::settings::{BufferSettings, EvaluationMode, SamplingMode, SourceSettings, SubjectSettings};
use super::state::{EvaluationRequest, PlayState, SubjectState};
use crate::buffer::{Bracket, FrameBuffer, SampleTime};
use crate::data::{ArrivalTime, FrameData, FrameId, Role, StaticData, SubjectFrameData};
use crate::error::DataError;
use crate::registry::SubjectKey;
use crate::stats::BufferStats;
use crate::time::QualifiedFrameTime;
use crate::timing::SourceTiming;

/// A validated, stamped and remapped frame ready to be appended
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub frame: FrameData,
    /// Copy taken before remapping, when requested
    pub unmapped: Option<FrameData>,
}

/// Subject whose frames come from a source
pub struct LiveSubject {
    key: SubjectKey,
    role: Option<Role>,
    settings: SubjectSettings,
    buffer: FrameBuffer,
    /// Static data as received, before remapping
    unmapped_static: Option<Arc<StaticData>>,
    timing: Arc<SourceTiming>,
    mode: EvaluationMode,
    buffer_settings: BufferSettings,
    play_state: PlayState,
    paused_frame: Option<FrameData>,
    /// Frame selected for the current tick
    frame_snapshot: Option<FrameData>,
    last_arrival: Option<f64>,
    stats: Arc<BufferStats>,
    static_rebroadcasted: bool,
    last_rebroadcast_frame: Option<FrameId>,
}

impl LiveSubject {
    pub fn new(key: SubjectKey, settings: SubjectSettings, timing: Arc<SourceTiming>) -> Self {
        let buffer_settings = BufferSettings::default();
        Self {
            key,
            role: settings.role.clone(),
            settings,
            buffer: FrameBuffer::with_capacity(buffer_settings.capacity()),
            unmapped_static: None,
            timing,
            mode: EvaluationMode::default(),
            buffer_settings,
            play_state: PlayState::Live,
            paused_frame: None,
            frame_snapshot: None,
            last_arrival: None,
            stats: Arc::new(BufferStats::new()),
            static_rebroadcasted: false,
            last_rebroadcast_frame: None,
        }
    }

    pub fn key(&self) -> &SubjectKey {
        &self.key
    }

    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    pub fn settings(&self) -> &SubjectSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SubjectSettings {
        &mut self.settings
    }

    pub fn stats(&self) -> &Arc<BufferStats> {
        &self.stats
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn has_static_data(&self) -> bool {
        self.buffer.static_data().is_some()
    }

    /// Remapped static data, or the data as received when `remapped` is false
    pub fn static_data(&self, remapped: bool) -> Option<&Arc<StaticData>> {
        if remapped {
            self.buffer.static_data()
        } else {
            self.unmapped_static.as_ref()
        }
    }

    /// Replace the schema; buffered frames no longer match it and are dropped
    pub fn set_static_data(&mut self, role: Role, static_data: StaticData) {
        self.clear_frames();

        let unmapped = Arc::new(static_data);
        let remapped = match &self.settings.remapper {
            Some(remapper) => {
                let mut data = (*unmapped).clone();
                remapper.remap_static_data(&role, &mut data);
                Arc::new(data)
            }
            None => Arc::clone(&unmapped),
        };

        self.buffer.set_static_data(remapped);
        self.unmapped_static = Some(unmapped);
        self.settings.role = Some(role.clone());
        self.role = Some(role);
        self.static_rebroadcasted = false;
    }

    /// Validate, stamp and remap an incoming frame without appending it
    pub fn prepare_frame(
        &self,
        mut frame: FrameData,
        arrival: ArrivalTime,
        keep_unmapped: bool,
    ) -> Result<PreparedFrame, DataError> {
        let (Some(role), Some(unmapped_static), Some(remapped_static)) = (
            self.role.as_ref(),
            self.unmapped_static.as_ref(),
            self.buffer.static_data(),
        ) else {
            return Err(DataError::MissingStaticData);
        };

        if !frame.world_time.source_time().is_finite() {
            return Err(DataError::NonFiniteTime);
        }
        role.is_frame_data_valid(unmapped_static, &frame)?;

        frame.arrival = arrival;
        let offset = self.timing.process_frame(&frame, &arrival);
        frame.world_time.set_offset(offset);

        let unmapped = keep_unmapped.then(|| frame.clone());
        if let Some(remapper) = &self.settings.remapper {
            remapper.remap_frame_data(remapped_static, &mut frame);
        }

        Ok(PreparedFrame { frame, unmapped })
    }

    /// Append a prepared frame, returning the number of evicted samples
    pub fn commit_frame(&mut self, frame: FrameData) -> usize {
        if let Some(scene) = frame.scene_time {
            if scene.rate.is_valid() {
                self.settings.frame_rate = Some(scene.rate);
            }
        }
        self.last_arrival = Some(frame.arrival.world_time);

        let evicted = self.buffer.push(frame);
        self.stats.record_frame();
        self.stats.record_evictions(evicted);
        evicted
    }

    /// Prepare and append in one step
    pub fn add_frame(&mut self, frame: FrameData, arrival: ArrivalTime) -> Result<(), DataError> {
        let prepared = self.prepare_frame(frame, arrival, false)?;
        self.commit_frame(prepared.frame);
        Ok(())
    }

    /// Empty the buffer; pause state is unchanged
    pub fn clear_frames(&mut self) {
        self.buffer.clear_frames();
        self.frame_snapshot = None;
    }

    /// Hold the current snapshot. Returns false if already paused.
    pub fn pause(&mut self) -> bool {
        if self.play_state == PlayState::Paused {
            return false;
        }
        self.paused_frame = self
            .frame_snapshot
            .clone()
            .or_else(|| self.buffer.latest().cloned());
        self.play_state = PlayState::Paused;
        true
    }

    /// Resume live evaluation. Returns false if not paused.
    pub fn unpause(&mut self) -> bool {
        if self.play_state == PlayState::Live {
            return false;
        }
        self.paused_frame = None;
        self.play_state = PlayState::Live;
        true
    }

    pub fn is_paused(&self) -> bool {
        self.play_state == PlayState::Paused
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn is_time_synchronized(&self) -> bool {
        self.mode == EvaluationMode::Timecode
    }

    /// Pull the owning source's settings into the subject
    pub fn cache_settings(&mut self, source: &SourceSettings) {
        self.mode = source.mode;
        let capacity = source.buffer.capacity();
        if capacity != self.buffer.capacity() {
            let evicted = self.buffer.set_capacity(capacity);
            self.stats.record_evictions(evicted);
        }
        if self.buffer_settings != source.buffer {
            self.buffer_settings = source.buffer.clone();
        }
    }

    /// Select this tick's frame according to the source's evaluation mode
    pub fn update(&mut self, now: f64, scene_now: Option<QualifiedFrameTime>) {
        if self.is_paused() {
            return;
        }
        let request = match (self.mode, scene_now) {
            (EvaluationMode::Latest, _) => EvaluationRequest::Latest,
            (EvaluationMode::EngineTime, _) => EvaluationRequest::AtWorldTime(now),
            (EvaluationMode::Timecode, Some(scene)) => EvaluationRequest::AtSceneTime(scene),
            (EvaluationMode::Timecode, None) => EvaluationRequest::Latest,
        };
        self.frame_snapshot = self.resolve(request, false);
    }

    pub fn has_valid_frame_snapshot(&self) -> bool {
        self.current_frame().is_some()
    }

    /// Held frame when paused, otherwise this tick's frame
    pub fn current_frame(&self) -> Option<&FrameData> {
        match self.play_state {
            PlayState::Paused => self.paused_frame.as_ref(),
            PlayState::Live => self.frame_snapshot.as_ref(),
        }
    }

    pub fn latest_frame(&self) -> Option<&FrameData> {
        self.buffer.latest()
    }

    pub fn frame_times(&self) -> Vec<SampleTime> {
        self.buffer.frame_times()
    }

    pub fn last_arrival(&self) -> Option<f64> {
        self.last_arrival
    }

    pub fn state(&self, now: f64, staleness: f64) -> SubjectState {
        if self.is_paused() {
            return SubjectState::Paused;
        }
        if !self.has_static_data() {
            return SubjectState::InvalidOrDisabled;
        }
        SubjectState::from_arrival(self.last_arrival, now, staleness)
    }

    /// Resolve a request and express it in `desired`
    pub fn evaluate(
        &self,
        request: EvaluationRequest,
        desired: &Role,
    ) -> Option<SubjectFrameData> {
        let frame = match self.play_state {
            PlayState::Paused => self.paused_frame.clone()?,
            PlayState::Live => self.resolve(request, true)?,
        };
        self.finish(frame, desired)
    }

    /// This tick's frame, processed and expressed in `desired`
    pub fn evaluate_snapshot(&self, desired: &Role) -> Option<SubjectFrameData> {
        let frame = self.current_frame()?.clone();
        self.finish(frame, desired)
    }

    /// Whether data can be produced in `role`, natively or by translation
    pub fn supports_role(&self, role: &Role) -> bool {
        let Some(native) = &self.role else {
            return false;
        };
        native.is_child_of(role)
            || self
                .settings
                .translators
                .iter()
                .any(|t| native.is_child_of(&t.from_role()) && t.to_role().is_child_of(role))
    }

    /// Run the pre-processors that apply to this subject's role
    pub fn apply_pre_processors(&self, static_data: &StaticData, frame: &mut FrameData) {
        let Some(role) = &self.role else {
            return;
        };
        for processor in &self.settings.pre_processors {
            if role.is_child_of(&processor.role()) {
                processor.process(static_data, frame);
            }
        }
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

    fn finish(&self, mut frame: FrameData, desired: &Role) -> Option<SubjectFrameData> {
        let role = self.role.as_ref()?;
        let static_data = Arc::clone(self.buffer.static_data()?);
        self.apply_pre_processors(&static_data, &mut frame);
        translate_for_role(role, &self.settings.translators, static_data, frame, desired)
    }

    fn resolve(&self, request: EvaluationRequest, record: bool) -> Option<FrameData> {
        match request {
            EvaluationRequest::Latest => {
                let frame = self.buffer.latest()?.clone();
                if record {
                    self.stats.record_evaluation(0.0);
                }
                Some(frame)
            }
            EvaluationRequest::AtWorldTime(time) => {
                let offset = self.timing.world_offset().unwrap_or(0.0);
                let target = time - offset - self.buffer_settings.engine_time_offset;
                let bracket = self.buffer.bracket_world_time(target)?;
                Some(self.sample(bracket, target, record))
            }
            EvaluationRequest::AtSceneTime(scene) => {
                let frames = scene.time.as_decimal() - self.buffer_settings.timecode_frame_offset;
                let target = scene.rate.frames_to_seconds(frames);
                let rollover = self.buffer_settings.rollover_seconds();
                match self.buffer.bracket_scene_time(target, rollover) {
                    Some(bracket) => Some(self.sample(bracket, target, record)),
                    None => {
                        tracing::trace!(subject = %self.key, "No scene time in buffer, using latest");
                        self.resolve(EvaluationRequest::Latest, record)
                    }
                }
            }
        }
    }

    fn sample(&self, bracket: Bracket<'_>, target: f64, record: bool) -> FrameData {
        let blended = match bracket {
            Bracket::Between { lower, upper, alpha }
                if self.settings.sampling == SamplingMode::Interpolated =>
            {
                match (self.interpolator(), self.buffer.static_data()) {
                    (Some(interpolator), Some(static_data)) => Some(interpolator.interpolate(
                        static_data,
                        lower.frame,
                        upper.frame,
                        alpha,
                    )),
                    _ => None,
                }
            }
            _ => None,
        };

        if record {
            if let Bracket::BeforeOldest(_) = bracket {
                self.stats.record_underflow();
            }
            let resolved = if blended.is_some() {
                target
            } else {
                bracket.closest().time
            };
            self.stats.record_evaluation(resolved - target);
        }

        blended.unwrap_or_else(|| bracket.closest().frame.clone())
    }

    fn interpolator(&self) -> Option<&Arc<dyn super::pipeline::FrameInterpolator>> {
        let role = self.role.as_ref()?;
        self.settings
            .interpolator
            .as_ref()
            .filter(|i| role.is_child_of(&i.role()))
    }
}

impl std::fmt::Debug for LiveSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSubject")
            .field("key", &self.key)
            .field("role", &self.role)
            .field("frames", &self.buffer.len())
            .field("play_state", &self.play_state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RoleSchema;
    use crate::registry::SourceId;
    use crate::subject::pipeline::{
        FramePreProcessor, FrameTranslator, LinearInterpolator, PropertyRenameRemapper,
        SubjectRemapper,
    };
    use crate::time::{FrameRate, FrameTime};

    #[derive(Debug)]
    struct SumRole;

    impl RoleSchema for SumRole {
        fn name(&self) -> &str {
            "sum"
        }

        fn is_frame_data_valid(&self, _: &StaticData, f: &FrameData) -> Result<(), DataError> {
            if f.property_values.len() == 1 {
                Ok(())
            } else {
                Err(DataError::Malformed("sum carries one value".into()))
            }
        }
    }

    struct SumTranslator;

    impl FrameTranslator for SumTranslator {
        fn name(&self) -> &str {
            "sum"
        }

        fn from_role(&self) -> Role {
            Role::basic()
        }

        fn to_role(&self) -> Role {
            Role::new(SumRole)
        }

        fn translate(&self, _: &StaticData, frame: &FrameData) -> Option<(StaticData, FrameData)> {
            let total = frame.property_values.iter().sum();
            let mut out = frame.clone();
            out.property_values = vec![total];
            Some((StaticData::with_properties(["sum"]), out))
        }
    }

    struct Scale(f32);

    impl FramePreProcessor for Scale {
        fn name(&self) -> &str {
            "scale"
        }

        fn role(&self) -> Role {
            Role::basic()
        }

        fn process(&self, _: &StaticData, frame: &mut FrameData) {
            for v in &mut frame.property_values {
                *v *= self.0;
            }
        }
    }

    struct Negate;

    impl SubjectRemapper for Negate {
        fn name(&self) -> &str {
            "negate"
        }

        fn remap_static_data(&self, _: &Role, _: &mut StaticData) {}

        fn remap_frame_data(&self, _: &StaticData, frame: &mut FrameData) {
            for v in &mut frame.property_values {
                *v = -*v;
            }
        }
    }

    fn make_subject(settings: SubjectSettings) -> LiveSubject {
        let key = SubjectKey::new(SourceId::new(), "Actor");
        let mut subject = LiveSubject::new(key, settings, Arc::new(SourceTiming::default()));
        subject.set_static_data(Role::basic(), StaticData::with_properties(["x"]));
        subject
    }

    fn interpolated() -> SubjectSettings {
        SubjectSettings::new(Role::basic()).interpolator(Arc::new(LinearInterpolator::default()))
    }

    /// Arrival equal to the producer time keeps the offset at zero
    fn push(subject: &mut LiveSubject, time: f64, value: f32) {
        let arrival = ArrivalTime {
            world_time: time,
            scene_time: None,
        };
        subject
            .add_frame(FrameData::new(time).with_properties(vec![value]), arrival)
            .unwrap();
    }

    fn value(data: &SubjectFrameData) -> f32 {
        data.frame.property_values[0]
    }

    #[test]
    fn test_rejects_frames_before_static_data() {
        let key = SubjectKey::new(SourceId::new(), "Actor");
        let mut subject = LiveSubject::new(
            key,
            SubjectSettings::new(Role::basic()),
            Arc::new(SourceTiming::default()),
        );

        let result = subject.add_frame(FrameData::new(1.0), ArrivalTime::default());
        assert_eq!(result, Err(DataError::MissingStaticData));
        assert_eq!(subject.stats().snapshot().frames_received, 0);
    }

    #[test]
    fn test_rejects_malformed_frames() {
        let mut subject = make_subject(interpolated());

        let result = subject.add_frame(
            FrameData::new(1.0).with_properties(vec![1.0, 2.0]),
            ArrivalTime::default(),
        );

        assert!(matches!(result, Err(DataError::PropertyCountMismatch { .. })));
        assert!(subject.buffer().is_empty());
    }

    #[test]
    fn test_rejects_non_finite_world_time() {
        let mut subject = make_subject(interpolated());

        for time in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = subject.add_frame(
                FrameData::new(time).with_properties(vec![1.0]),
                ArrivalTime::default(),
            );
            assert_eq!(result, Err(DataError::NonFiniteTime));
        }
        assert!(subject.buffer().is_empty());
        assert_eq!(subject.timing.world_offset(), None);

        push(&mut subject, 1.0, 1.0);
        push(&mut subject, 2.0, 2.0);
        push(&mut subject, 3.0, 3.0);
        let result = subject
            .evaluate(EvaluationRequest::AtWorldTime(2.0), &Role::basic())
            .unwrap();
        assert_eq!(value(&result), 2.0);
    }

    #[test]
    fn test_add_frame_stamps_arrival_and_offset() {
        let mut subject = make_subject(interpolated());
        let arrival = ArrivalTime {
            world_time: 105.0,
            scene_time: None,
        };
        subject
            .add_frame(FrameData::new(100.0).with_properties(vec![1.0]), arrival)
            .unwrap();

        let frame = subject.latest_frame().unwrap();
        assert_eq!(frame.arrival.world_time, 105.0);
        assert_eq!(frame.world_time.offset(), 5.0);
        assert_eq!(subject.last_arrival(), Some(105.0));
    }

    #[test]
    fn test_interpolated_world_time() {
        let mut subject = make_subject(interpolated());
        push(&mut subject, 10.0, 0.0);
        push(&mut subject, 10.016, 1.0);
        push(&mut subject, 10.033, 2.0);

        let result = subject
            .evaluate(EvaluationRequest::AtWorldTime(10.02), &Role::basic())
            .unwrap();

        let alpha = (10.02 - 10.016) / (10.033 - 10.016);
        assert!((value(&result) as f64 - (1.0 + alpha)).abs() < 1e-5);
        assert!((result.frame.world_time.source_time() - 10.02).abs() < 1e-9);
        assert!(subject.stats().snapshot().last_eval_delta.abs() < 1e-12);
    }

    #[test]
    fn test_closest_world_time() {
        let mut subject = make_subject(interpolated().sampling(SamplingMode::Closest));
        push(&mut subject, 10.0, 0.0);
        push(&mut subject, 10.016, 1.0);
        push(&mut subject, 10.033, 2.0);

        let result = subject
            .evaluate(EvaluationRequest::AtWorldTime(10.02), &Role::basic())
            .unwrap();

        assert_eq!(value(&result), 1.0);
        assert_eq!(result.frame.world_time.source_time(), 10.016);
    }

    #[test]
    fn test_without_interpolator_falls_back_to_closest() {
        let mut subject = make_subject(SubjectSettings::new(Role::basic()));
        push(&mut subject, 1.0, 1.0);
        push(&mut subject, 2.0, 2.0);

        let result = subject
            .evaluate(EvaluationRequest::AtWorldTime(1.9), &Role::basic())
            .unwrap();
        assert_eq!(value(&result), 2.0);
    }

    #[test]
    fn test_world_time_clamps_to_boundaries() {
        let mut subject = make_subject(interpolated());
        push(&mut subject, 1.0, 1.0);
        push(&mut subject, 2.0, 2.0);
        push(&mut subject, 3.0, 3.0);

        let early = subject
            .evaluate(EvaluationRequest::AtWorldTime(-5.0), &Role::basic())
            .unwrap();
        assert_eq!(value(&early), 1.0);
        assert_eq!(subject.stats().snapshot().underflows, 1);

        let late = subject
            .evaluate(EvaluationRequest::AtWorldTime(50.0), &Role::basic())
            .unwrap();
        assert_eq!(value(&late), 3.0);
        assert_eq!(subject.stats().snapshot().last_eval_delta, -47.0);
    }

    #[test]
    fn test_latest() {
        let mut subject = make_subject(interpolated());
        push(&mut subject, 2.0, 2.0);
        push(&mut subject, 1.0, 1.0);

        let result = subject
            .evaluate(EvaluationRequest::Latest, &Role::basic())
            .unwrap();
        // Most recently appended, not the greatest time
        assert_eq!(value(&result), 1.0);
    }

    #[test]
    fn test_scene_time_evaluation() {
        let mut subject = make_subject(interpolated());
        let rate = FrameRate::FPS_30;
        for (frame, v) in [(30, 0.0), (31, 1.0), (32, 2.0)] {
            let qft = QualifiedFrameTime::new(FrameTime::from_frame(frame), rate);
            subject
                .add_frame(
                    FrameData::new(frame as f64).with_properties(vec![v]).with_scene_time(qft),
                    ArrivalTime::default(),
                )
                .unwrap();
        }

        let request = QualifiedFrameTime::new(FrameTime::new(31, 0.5), rate);
        let result = subject
            .evaluate(EvaluationRequest::AtSceneTime(request), &Role::basic())
            .unwrap();

        assert!((value(&result) - 1.5).abs() < 1e-5);
        assert_eq!(subject.settings().frame_rate, Some(rate));
    }

    #[test]
    fn test_scene_time_without_timecodes_uses_latest() {
        let mut subject = make_subject(interpolated());
        push(&mut subject, 1.0, 1.0);
        push(&mut subject, 2.0, 2.0);

        let request = QualifiedFrameTime::new(FrameTime::from_frame(0), FrameRate::FPS_30);
        let result = subject
            .evaluate(EvaluationRequest::AtSceneTime(request), &Role::basic())
            .unwrap();
        assert_eq!(value(&result), 2.0);
    }

    #[test]
    fn test_pause_freezes_evaluation() {
        let mut subject = make_subject(interpolated());
        push(&mut subject, 1.0, 1.0);
        push(&mut subject, 2.0, 2.0);
        push(&mut subject, 3.0, 3.0);
        subject.update(3.0, None);

        assert!(subject.pause());
        assert!(!subject.pause());
        push(&mut subject, 4.0, 4.0);

        for request in [
            EvaluationRequest::AtWorldTime(10.0),
            EvaluationRequest::AtWorldTime(0.0),
            EvaluationRequest::Latest,
        ] {
            let result = subject.evaluate(request, &Role::basic()).unwrap();
            assert_eq!(value(&result), 3.0);
        }
        assert_eq!(subject.state(4.0, 0.5), SubjectState::Paused);

        assert!(subject.unpause());
        let result = subject
            .evaluate(EvaluationRequest::Latest, &Role::basic())
            .unwrap();
        assert_eq!(value(&result), 4.0);
    }

    #[test]
    fn test_clear_frames_keeps_pause_state() {
        let mut subject = make_subject(interpolated());
        push(&mut subject, 1.0, 1.0);
        subject.pause();

        subject.clear_frames();

        assert!(subject.is_paused());
        assert!(subject.buffer().is_empty());
        // Held frame survives
        assert!(subject.evaluate(EvaluationRequest::Latest, &Role::basic()).is_some());
    }

    #[test]
    fn test_pre_processors_applied_in_order() {
        let settings = interpolated()
            .pre_processor(Arc::new(Scale(2.0)))
            .pre_processor(Arc::new(Scale(-1.0)));
        let mut subject = make_subject(settings);
        push(&mut subject, 1.0, 3.0);

        let result = subject
            .evaluate(EvaluationRequest::Latest, &Role::basic())
            .unwrap();
        assert_eq!(value(&result), -6.0);
        // Buffer keeps the raw sample
        assert_eq!(subject.latest_frame().unwrap().property_values, vec![3.0]);
    }

    #[test]
    fn test_translation_single_hop() {
        let key = SubjectKey::new(SourceId::new(), "Actor");
        let settings = interpolated().translator(Arc::new(SumTranslator));
        let mut subject = LiveSubject::new(key, settings, Arc::new(SourceTiming::default()));
        subject.set_static_data(Role::basic(), StaticData::with_properties(["a", "b"]));
        subject
            .add_frame(
                FrameData::new(1.0).with_properties(vec![2.0, 5.0]),
                ArrivalTime::default(),
            )
            .unwrap();

        let sum = Role::new(SumRole);
        assert!(subject.supports_role(&sum));
        let result = subject.evaluate(EvaluationRequest::Latest, &sum).unwrap();
        assert_eq!(result.role, sum);
        assert_eq!(result.frame.property_values, vec![7.0]);
        assert_eq!(result.static_data.property_names, vec!["sum"]);
    }

    #[test]
    fn test_untranslatable_role_is_none() {
        let mut subject = make_subject(interpolated());
        push(&mut subject, 1.0, 1.0);

        let sum = Role::new(SumRole);
        assert!(!subject.supports_role(&sum));
        assert!(subject.evaluate(EvaluationRequest::Latest, &sum).is_none());
    }

    #[test]
    fn test_remapper_applies_to_static_and_frames() {
        let settings = interpolated()
            .remapper(Arc::new(PropertyRenameRemapper::new().rename("x", "renamed")));
        let mut subject = make_subject(settings);

        assert_eq!(subject.static_data(true).unwrap().property_names, vec!["renamed"]);
        assert_eq!(subject.static_data(false).unwrap().property_names, vec!["x"]);

        let key = SubjectKey::new(SourceId::new(), "Neg");
        let mut negated = LiveSubject::new(
            key,
            interpolated().remapper(Arc::new(Negate)),
            Arc::new(SourceTiming::default()),
        );
        negated.set_static_data(Role::basic(), StaticData::with_properties(["x"]));
        let prepared = negated
            .prepare_frame(
                FrameData::new(1.0).with_properties(vec![2.0]),
                ArrivalTime::default(),
                true,
            )
            .unwrap();

        assert_eq!(prepared.frame.property_values, vec![-2.0]);
        assert_eq!(prepared.unmapped.unwrap().property_values, vec![2.0]);
    }

    #[test]
    fn test_new_static_data_resets_rebroadcast_and_frames() {
        let mut subject = make_subject(interpolated());
        push(&mut subject, 1.0, 1.0);
        subject.set_static_rebroadcasted(true);

        subject.set_static_data(Role::basic(), StaticData::with_properties(["y"]));

        assert!(!subject.static_rebroadcasted());
        assert!(subject.buffer().is_empty());
    }

    #[test]
    fn test_cache_settings_resizes_buffer() {
        let mut subject = make_subject(interpolated());
        for i in 0..10 {
            push(&mut subject, i as f64, i as f32);
        }

        let source = SourceSettings::default().mode(EvaluationMode::EngineTime).buffer(BufferSettings {
            max_frames: Some(4),
            ..Default::default()
        });
        subject.cache_settings(&source);

        assert_eq!(subject.mode(), EvaluationMode::EngineTime);
        assert_eq!(subject.buffer().len(), 4);
        assert_eq!(subject.stats().snapshot().frames_evicted, 6);
    }

    #[test]
    fn test_update_engine_time_snapshot() {
        let mut subject = make_subject(interpolated().sampling(SamplingMode::Closest));
        subject.cache_settings(&SourceSettings::default().mode(EvaluationMode::EngineTime));
        push(&mut subject, 1.0, 1.0);
        push(&mut subject, 2.0, 2.0);
        push(&mut subject, 3.0, 3.0);

        subject.update(2.1, None);

        assert_eq!(subject.current_frame().unwrap().property_values, vec![2.0]);
        assert!(subject.has_valid_frame_snapshot());
        // Snapshot selection is not counted as an evaluation
        assert_eq!(subject.stats().snapshot().evaluations, 0);
    }

    #[test]
    fn test_state_classification() {
        let mut subject = make_subject(interpolated());
        assert_eq!(subject.state(0.0, 0.5), SubjectState::InvalidOrDisabled);

        push(&mut subject, 1.0, 1.0);
        assert_eq!(subject.state(1.2, 0.5), SubjectState::Connected);
        assert_eq!(subject.state(2.0, 0.5), SubjectState::Unresponsive);
    }
}
