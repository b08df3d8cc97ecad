//! Client orchestration
//!
//! The [`Client`] ties the registry, the ingestion queue and the subjects
//! together. Producers push from any thread; the consumer calls
//! [`Client::tick`] once per frame and evaluates subjects any number of
//! times, from any thread.
//!
//! # Tick order
//!
//! 1. Drain the ingestion queue into the registry
//! 2. Destroy entries flagged pending kill
//! 3. Cache the consumer clock for this tick
//! 4. Poll every source
//! 5. Rebuild the enabled-subjects snapshot
//! 6. Update live subjects and collect rebroadcast data
//! 7. Update virtual subjects from the fresh live snapshots

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use super::config::ClientConfig;
use super::events::{ClientEvent, EventBus};
use super::handle::ClientHandle;
use super::preset::{SourcePreset, SubjectPreset};
use super::rebroadcast::{annotations_for, Rebroadcaster};
use super::source::{Source, SourceFactory, VirtualSubjectSource};
use crate::buffer::SampleTime;
use crate::data::{FrameData, Role, StaticData, SubjectFrameData};
use crate::error::{DataError, PresetError, Result};
use crate::ingest::{
    AddedListeners, DataView, Drained, FrameListener, IngestionQueue, ListenerHandle,
    PendingFrame, PendingStatic, RawFrameListener, StaticListener, SubscriptionTarget,
};
use crate::log::LogOnce;
use crate::registry::{
    RegistryError, Removed, SourceCollection, SourceEntry, SourceId, SubjectEntry, SubjectKey,
    SubjectName,
};
use crate::stats::{BufferHealth, ClientStats};
use crate::subject::{
    translate_for_role, EvaluationRequest, LiveSubject, PipelineFactory, RoleDefaults,
    SourceSettings, Subject, SubjectSettings, SubjectState, VirtualSubject, VirtualSubjectContext,
    VirtualSubjectHost,
};
use crate::time::{Clock, FrameRate, QualifiedFrameTime, SystemClock};
use crate::timing::SourceTiming;

/// Name of the virtual source every client starts with
pub const DEFAULT_VIRTUAL_SOURCE_NAME: &str = "default";

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Consumer clock cached at the start of a tick
#[derive(Debug, Clone, Copy, Default)]
struct TickTimes {
    world: f64,
    scene: Option<QualifiedFrameTime>,
}

/// Rebroadcast data collected under the subject lock and sent after it
struct Outgoing {
    key: SubjectKey,
    name: SubjectName,
    static_data: Option<(Role, Arc<StaticData>)>,
    frame: FrameData,
}

/// State shared by the client and the handles given to sources
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    clock: Arc<dyn Clock>,
    pub(crate) registry: SourceCollection,
    queue: IngestionQueue,
    added: AddedListeners,
    events: EventBus,
    pipeline: RwLock<PipelineFactory>,
    factories: RwLock<HashMap<String, Arc<dyn SourceFactory>>>,
    rebroadcaster: RwLock<Option<Arc<dyn Rebroadcaster>>>,
    /// Subject chosen for each name at the last tick
    enabled: RwLock<IndexMap<SubjectName, SubjectKey>>,
    tick_times: Mutex<TickTimes>,
    states: Mutex<HashMap<SubjectKey, SubjectState>>,
    /// Subjects rebroadcast at the last tick, with their outgoing names
    rebroadcasting: Mutex<HashMap<SubjectKey, SubjectName>>,
    log_once: LogOnce,
    created_at: Instant,
}

impl Shared {
    pub(crate) fn push_static(&self, key: SubjectKey, role: Role, static_data: StaticData) {
        self.queue.push_static(key, role, static_data);
    }

    pub(crate) fn push_frame(&self, key: SubjectKey, frame: FrameData) {
        self.queue.push_frame(key, frame);
    }

    fn report_data_error(&self, key: &SubjectKey, error: &DataError) {
        if !self.log_once.first(error.reason(), Some(key)) {
            return;
        }
        match error {
            DataError::MissingStaticData => {
                tracing::warn!(subject = %key, "Frame received before static data, dropping")
            }
            _ => tracing::error!(subject = %key, error = %error, "Invalid frame data, dropping"),
        }
    }

    /// Pick the frame a subject should rebroadcast this tick, if any
    fn collect_rebroadcast(
        &self,
        entry: &mut SubjectEntry,
        out: &mut Vec<Outgoing>,
        eligible: &mut HashMap<SubjectKey, SubjectName>,
    ) {
        let subject = &mut entry.subject;
        if !subject.settings().rebroadcast {
            return;
        }
        let name = subject
            .settings()
            .rebroadcast_name
            .clone()
            .map(SubjectName::new)
            .unwrap_or_else(|| entry.key.name.clone());
        eligible.insert(entry.key.clone(), name.clone());

        let paused = subject.is_paused();
        let frame = match &*subject {
            Subject::Live(live) if !self.config.transmit_evaluated_data && !paused => {
                live.latest_frame().cloned()
            }
            other => other.current_frame().cloned(),
        };
        let Some(mut frame) = frame else {
            return;
        };
        // Paused subjects keep sending their held frame
        if !paused && subject.last_rebroadcast_frame() == Some(frame.frame_id) {
            return;
        }
        let (Some(role), Some(static_data)) = (subject.role(), subject.static_data().cloned())
        else {
            return;
        };

        if self.config.preprocess_rebroadcast {
            if let Subject::Live(live) = &*subject {
                live.apply_pre_processors(&static_data, &mut frame);
            }
        }

        let target = if self.config.translate_rebroadcast {
            subject.settings().translators.first().map(|t| t.to_role())
        } else {
            None
        };
        let data = match target {
            Some(target) => {
                match translate_for_role(
                    &role,
                    &subject.settings().translators,
                    static_data,
                    frame,
                    &target,
                ) {
                    Some(data) => data,
                    None => return,
                }
            }
            None => SubjectFrameData {
                role,
                static_data,
                frame,
            },
        };

        let send_static = !subject.static_rebroadcasted();
        subject.set_static_rebroadcasted(true);
        subject.set_last_rebroadcast_frame(Some(data.frame.frame_id));

        out.push(Outgoing {
            key: entry.key.clone(),
            name,
            static_data: send_static.then(|| (data.role.clone(), Arc::clone(&data.static_data))),
            frame: data.frame,
        });
    }
}

/// Subject data hub
///
/// Dropping the client runs [`shutdown`](Self::shutdown).
pub struct Client {
    shared: Arc<Shared>,
    shut_down: AtomicBool,
}

impl Client {
    /// Create a client on the system clock
    pub fn new(config: ClientConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a client on a caller-provided clock
    pub fn with_clock(config: ClientConfig, clock: Arc<dyn Clock>) -> Self {
        let shared = Arc::new(Shared {
            queue: IngestionQueue::new(
                config.max_pending_static,
                config.max_pending_frames,
                Arc::clone(&clock),
            ),
            events: EventBus::new(config.event_capacity),
            config,
            clock,
            registry: SourceCollection::new(),
            added: AddedListeners::new(),
            pipeline: RwLock::new(PipelineFactory::new()),
            factories: RwLock::new(HashMap::new()),
            rebroadcaster: RwLock::new(None),
            enabled: RwLock::new(IndexMap::new()),
            tick_times: Mutex::new(TickTimes::default()),
            states: Mutex::new(HashMap::new()),
            rebroadcasting: Mutex::new(HashMap::new()),
            log_once: LogOnce::new(),
            created_at: Instant::now(),
        });

        let client = Self {
            shared,
            shut_down: AtomicBool::new(false),
        };

        let default_source = Arc::new(VirtualSubjectSource::new(DEFAULT_VIRTUAL_SOURCE_NAME));
        if let Err(e) = client.register_source(SourceId::DEFAULT_VIRTUAL, default_source, None) {
            tracing::error!(error = %e, "Failed to register the default virtual source");
        }

        client
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Handle for pushing data without owning the client
    pub fn handle(&self) -> ClientHandle {
        ClientHandle::new(&self.shared)
    }

    /// Receive lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Consumer world time cached by the last tick
    pub fn world_time(&self) -> f64 {
        self.shared.tick_times.lock().world
    }

    /// Consumer scene time cached by the last tick
    pub fn scene_time(&self) -> Option<QualifiedFrameTime> {
        self.shared.tick_times.lock().scene
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the client by one consumer frame
    pub fn tick(&self) {
        let shared = &self.shared;

        self.apply_pending(shared.queue.drain());

        let removed = shared.registry.remove_pending_kill();
        self.handle_removed(removed);

        let now = shared.clock.now();
        let scene = shared.clock.scene_time();
        *shared.tick_times.lock() = TickTimes { world: now, scene };

        let mut invalid_sources = HashSet::new();
        for (id, source) in shared.registry.live_sources() {
            source.update();
            if !source.is_source_still_valid() {
                invalid_sources.insert(id);
            }
        }

        let enabled = shared.registry.enabled_subjects();
        let enabled_count = enabled.len();
        *shared.enabled.write() = enabled;

        let mut source_settings = HashMap::new();
        shared.registry.for_each_source(|s| {
            source_settings.insert(s.id, s.settings.clone());
        });

        let sending = shared.rebroadcaster.read().is_some();
        let mut outgoing = Vec::new();
        let mut eligible = HashMap::new();
        let mut snapshots: HashMap<SubjectName, SubjectFrameData> = HashMap::new();
        let mut detected: HashMap<SourceId, FrameRate> = HashMap::new();

        shared.registry.for_each_subject_mut(|entry| {
            let active = entry.is_active();
            let Subject::Live(live) = &mut entry.subject else {
                return;
            };
            // Disabled subjects never present stale frames once re-enabled
            if !active {
                live.clear_frames();
                return;
            }
            if let Some(settings) = source_settings.get(&entry.key.source) {
                live.cache_settings(settings);
            }
            live.update(now, scene);

            if let Some(rate) = live.settings().frame_rate {
                detected.insert(entry.key.source, rate);
            }
            if let Some(role) = live.role().cloned() {
                if let Some(data) = live.evaluate_snapshot(&role) {
                    snapshots.insert(entry.key.name.clone(), data);
                }
            }
            if sending {
                shared.collect_rebroadcast(entry, &mut outgoing, &mut eligible);
            }
        });

        shared.registry.for_each_subject_mut(|entry| {
            if !entry.is_active() {
                return;
            }
            let Subject::Virtual(host) = &mut entry.subject else {
                return;
            };
            host.update(&VirtualSubjectContext {
                snapshots: &snapshots,
                now,
            });
            let data = host.evaluate(&host.role());
            if sending {
                shared.collect_rebroadcast(entry, &mut outgoing, &mut eligible);
            }
            // Later virtual subjects may read this one
            if let Some(data) = data {
                snapshots.insert(entry.key.name.clone(), data);
            }
        });

        for (id, rate) in detected {
            shared.registry.with_source_mut(id, |s| {
                if s.settings.buffer.detected_frame_rate != Some(rate) {
                    tracing::debug!(source = %id, rate = %rate, "Frame rate detected");
                    s.settings.buffer.detected_frame_rate = Some(rate);
                }
            });
        }

        self.send_rebroadcast(outgoing, eligible);
        self.update_states(now, &invalid_sources);

        shared.events.emit(ClientEvent::Ticked {
            enabled_subjects: enabled_count,
        });
    }

    fn apply_pending(&self, drained: Drained) {
        if !drained.statics.is_empty() || !drained.frames.is_empty() {
            tracing::trace!(
                statics = drained.statics.len(),
                frames = drained.frames.len(),
                "Draining ingestion queue"
            );
        }
        for pending in drained.statics {
            self.apply_static(pending);
        }
        for pending in drained.frames {
            self.apply_frame(pending);
        }
    }

    fn apply_static(&self, pending: PendingStatic) {
        let shared = &self.shared;
        let PendingStatic {
            key,
            role,
            static_data,
        } = pending;

        if let Err(e) = role.is_static_data_valid(&static_data) {
            if shared.log_once.first(e.reason(), Some(&key)) {
                tracing::error!(subject = %key, role = %role, error = %e, "Invalid static data, dropping");
            }
            return;
        }

        let source = shared.registry.with_source(key.source, |s| {
            (
                s.pending_kill || s.is_virtual(),
                s.settings.settings_class.clone(),
                Arc::clone(&s.timing),
            )
        });
        let Some((rejected, settings_class, timing)) = source else {
            tracing::debug!(subject = %key, "Static data for unknown source, dropping");
            return;
        };
        if rejected {
            tracing::debug!(subject = %key, "Source does not accept static data, dropping");
            return;
        }

        enum Existing {
            Missing,
            Virtual,
            SameRole,
            OtherRole { enabled: bool },
        }

        let existing = shared
            .registry
            .with_subject(&key, |e| match &e.subject {
                _ if e.pending_kill => Existing::Missing,
                Subject::Virtual(_) => Existing::Virtual,
                Subject::Live(live) if live.role() == Some(&role) => Existing::SameRole,
                Subject::Live(_) => Existing::OtherRole { enabled: e.enabled },
            })
            .unwrap_or(Existing::Missing);

        let enable = match existing {
            Existing::Virtual => {
                tracing::warn!(subject = %key, "Static data pushed to a virtual subject, dropping");
                return;
            }
            Existing::SameRole => {
                shared.registry.with_subject_mut(&key, |e| {
                    if let Some(live) = e.subject.as_live_mut() {
                        live.set_static_data(role.clone(), static_data);
                    }
                });
                tracing::debug!(subject = %key, "Static data replaced");
                None
            }
            Existing::OtherRole { enabled } => {
                tracing::warn!(subject = %key, role = %role, "Subject role changed, recreating");
                shared.registry.take_subject(&key);
                shared.log_once.forget(&key);
                shared.events.emit(ClientEvent::SubjectRemoved(key.clone()));
                Some((enabled, static_data))
            }
            Existing::Missing => {
                let free = shared.registry.find_enabled_subject_key(&key.name).is_none();
                Some((free, static_data))
            }
        };

        if let Some((enabled, static_data)) = enable {
            let settings = shared.pipeline.read().build(&settings_class, &role);
            let mut live = LiveSubject::new(key.clone(), settings, timing);
            live.set_static_data(role.clone(), static_data);

            if let Err(e) = shared
                .registry
                .add_subject(SubjectEntry::new(key.clone(), Subject::Live(live)))
            {
                tracing::warn!(subject = %key, error = %e, "Could not create subject");
                return;
            }
            if enabled {
                if let Err(e) = shared.registry.set_subject_enabled(&key, true) {
                    tracing::warn!(subject = %key, error = %e, "Could not enable subject");
                }
            }
            tracing::info!(subject = %key, role = %role, enabled = enabled, "Subject created");
            shared.events.emit(ClientEvent::SubjectAdded(key.clone()));
        }

        let views = shared.registry.with_subject(&key, |e| {
            e.subject.as_live().map(|live| {
                (
                    live.static_data(true).cloned(),
                    live.static_data(false).cloned(),
                )
            })
        });
        if let Some(Some((remapped, unmapped))) = views {
            if let Some(data) = remapped {
                shared
                    .added
                    .notify_static(&key, DataView::Remapped, &role, &data);
            }
            if let Some(data) = unmapped {
                shared
                    .added
                    .notify_static(&key, DataView::Unmapped, &role, &data);
            }
        }
    }

    fn apply_frame(&self, pending: PendingFrame) {
        let shared = &self.shared;
        let PendingFrame {
            key,
            frame,
            arrival,
        } = pending;

        let accepting = shared
            .registry
            .with_source(key.source, |s| !s.pending_kill)
            .unwrap_or(false);
        if !accepting {
            tracing::trace!(subject = %key, "Frame for unknown or removed source, dropping");
            return;
        }

        let keep_unmapped = shared.added.wants_frames(&key, DataView::Unmapped);
        let prepared = shared
            .registry
            .with_subject(&key, |e| {
                if !e.is_active() {
                    return None;
                }
                let live = e.subject.as_live()?;
                let role = live.role().cloned();
                Some(
                    live.prepare_frame(frame, arrival, keep_unmapped)
                        .map(|p| (p, role)),
                )
            })
            .flatten();

        let (prepared, role) = match prepared {
            Some(Ok(prepared)) => prepared,
            Some(Err(e)) => {
                shared.report_data_error(&key, &e);
                return;
            }
            None => {
                tracing::trace!(subject = %key, "Frame for unknown or disabled subject, dropping");
                return;
            }
        };

        if let Some(role) = &role {
            shared
                .added
                .notify_frame(&key, DataView::Remapped, role, &prepared.frame);
            if let Some(unmapped) = &prepared.unmapped {
                shared
                    .added
                    .notify_frame(&key, DataView::Unmapped, role, unmapped);
            }
        }

        shared.registry.with_subject_mut(&key, |e| {
            if let Some(live) = e.subject.as_live_mut() {
                live.commit_frame(prepared.frame);
            }
        });
    }

    fn handle_removed(&self, removed: Removed) {
        if removed.is_empty() {
            return;
        }
        let shared = &self.shared;
        {
            let mut states = shared.states.lock();
            for key in &removed.subjects {
                states.remove(key);
            }
        }
        for key in removed.subjects {
            shared.log_once.forget(&key);
            shared.events.emit(ClientEvent::SubjectRemoved(key));
        }
        for id in removed.sources {
            shared.events.emit(ClientEvent::SourceRemoved(id));
        }
    }

    fn send_rebroadcast(&self, outgoing: Vec<Outgoing>, eligible: HashMap<SubjectKey, SubjectName>) {
        let shared = &self.shared;
        let stopped: Vec<(SubjectKey, SubjectName)> = {
            let mut previous = shared.rebroadcasting.lock();
            let stopped = previous
                .iter()
                .filter(|(key, _)| !eligible.contains_key(*key))
                .map(|(key, name)| (key.clone(), name.clone()))
                .collect();
            *previous = eligible;
            stopped
        };

        for (key, _) in &stopped {
            shared.registry.with_subject_mut(key, |e| {
                e.subject.set_static_rebroadcasted(false);
                e.subject.set_last_rebroadcast_frame(None);
            });
        }

        let Some(sender) = shared.rebroadcaster.read().clone() else {
            return;
        };
        for (key, name) in stopped {
            tracing::debug!(subject = %key, name = %name, "Rebroadcast stopped");
            sender.remove_subject(&name);
        }
        for item in outgoing {
            let annotations = annotations_for(&item.key);
            if let Some((role, static_data)) = &item.static_data {
                sender.update_subject_static_data(&item.name, role, static_data, &annotations);
            }
            sender.update_subject_frame_data(&item.name, &item.frame, &annotations);
        }
    }

    fn update_states(&self, now: f64, invalid_sources: &HashSet<SourceId>) {
        let shared = &self.shared;
        let staleness = shared.config.staleness_threshold.as_secs_f64();

        let mut current = HashMap::new();
        shared.registry.for_each_subject(|entry| {
            if entry.is_pending_kill() {
                return;
            }
            let state = if !entry.is_enabled() {
                SubjectState::InvalidOrDisabled
            } else if invalid_sources.contains(&entry.key.source) {
                SubjectState::Disconnected
            } else {
                entry.subject.state(now, staleness)
            };
            current.insert(entry.key.clone(), state);
        });

        let changed: Vec<(SubjectKey, SubjectState)> = {
            let mut states = shared.states.lock();
            let changed = current
                .iter()
                .filter(|(key, state)| states.get(*key) != Some(*state))
                .map(|(key, state)| (key.clone(), *state))
                .collect();
            *states = current;
            changed
        };

        for (key, state) in changed {
            tracing::debug!(subject = %key, state = %state, "Subject state changed");
            shared
                .events
                .emit(ClientEvent::SubjectStateChanged { key, state });
        }
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    fn register_source(
        &self,
        id: SourceId,
        source: Arc<dyn Source>,
        settings: Option<SourceSettings>,
    ) -> Result<SourceId> {
        let settings = match settings {
            Some(settings) => settings,
            None => {
                let mut settings = SourceSettings::new(source.settings_class());
                source.initialize_settings(&mut settings);
                settings
            }
        };

        let entry = SourceEntry::new(id, Arc::clone(&source), settings)
            .with_timing(SourceTiming::new(self.shared.config.estimator()));
        self.shared.registry.add_source(entry)?;

        source.receive_client(self.handle(), id);
        self.shared.events.emit(ClientEvent::SourceAdded(id));
        Ok(id)
    }

    /// Register a producer adapter
    pub fn add_source(&self, source: Arc<dyn Source>) -> Result<SourceId> {
        self.register_source(SourceId::new(), source, None)
    }

    /// Register a named source for virtual subjects
    pub fn add_virtual_subject_source(&self, name: impl Into<String>) -> Result<SourceId> {
        let name = name.into();
        if self.shared.registry.virtual_source_by_name(&name).is_some() {
            return Err(RegistryError::VirtualSourceNameTaken(name).into());
        }
        self.register_source(SourceId::new(), Arc::new(VirtualSubjectSource::new(name)), None)
    }

    /// Request removal of a source and its subjects at the next tick
    pub fn remove_source(&self, id: SourceId) -> Result<()> {
        if id == SourceId::DEFAULT_VIRTUAL {
            tracing::warn!("The default virtual source cannot be removed");
            return Ok(());
        }
        self.shared.registry.mark_source_pending_kill(id)?;
        tracing::info!(source = %id, "Source removal requested");
        Ok(())
    }

    /// Request removal of every source except the default virtual source
    pub fn remove_all_sources(&self) {
        for id in self.shared.registry.source_ids() {
            if id != SourceId::DEFAULT_VIRTUAL {
                let _ = self.shared.registry.mark_source_pending_kill(id);
            }
        }
    }

    /// Remove every source and wait for them to shut down
    ///
    /// Returns false if some source still refused after `timeout`; those are
    /// logged by id and type.
    pub fn remove_all_sources_with_timeout(&self, timeout: Duration) -> bool {
        self.remove_all_sources();
        let start = Instant::now();

        loop {
            let removed = self.shared.registry.remove_pending_kill();
            self.handle_removed(removed);
            if self.shared.registry.non_default_source_count() == 0 {
                return true;
            }

            if start.elapsed() >= timeout {
                let mut remaining = Vec::new();
                self.shared.registry.for_each_source(|s| {
                    if s.id != SourceId::DEFAULT_VIRTUAL {
                        remaining.push((s.id, Arc::clone(&s.source)));
                    }
                });
                for (id, source) in remaining {
                    tracing::warn!(
                        source = %id,
                        source_type = %source.source_type(),
                        timeout_ms = timeout.as_millis() as u64,
                        "Source did not shut down in time"
                    );
                }
                return false;
            }

            std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
        }
    }

    pub fn has_source_been_added(&self, id: SourceId) -> bool {
        self.shared
            .registry
            .with_source(id, |s| !s.pending_kill)
            .unwrap_or(false)
    }

    /// Sources that feed live subjects
    pub fn sources(&self) -> Vec<SourceId> {
        let mut ids = Vec::new();
        self.shared.registry.for_each_source(|s| {
            if !s.pending_kill && !s.is_virtual() {
                ids.push(s.id);
            }
        });
        ids
    }

    /// Sources holding virtual subjects, the default one included
    pub fn virtual_sources(&self) -> Vec<SourceId> {
        let mut ids = Vec::new();
        self.shared.registry.for_each_source(|s| {
            if !s.pending_kill && s.is_virtual() {
                ids.push(s.id);
            }
        });
        ids
    }

    fn source_handle(&self, id: SourceId) -> Option<Arc<dyn Source>> {
        self.shared
            .registry
            .with_source(id, |s| Arc::clone(&s.source))
    }

    pub fn source_type(&self, id: SourceId) -> Option<String> {
        self.source_handle(id).map(|s| s.source_type())
    }

    pub fn source_machine_name(&self, id: SourceId) -> Option<String> {
        self.source_handle(id).map(|s| s.source_machine_name())
    }

    pub fn source_status(&self, id: SourceId) -> Option<String> {
        self.source_handle(id).map(|s| s.source_status())
    }

    pub fn is_source_still_valid(&self, id: SourceId) -> bool {
        self.source_handle(id)
            .map(|s| s.is_source_still_valid())
            .unwrap_or(false)
    }

    pub fn source_settings(&self, id: SourceId) -> Option<SourceSettings> {
        self.shared
            .registry
            .with_source(id, |s| s.settings.clone())
    }

    /// Replace a source's settings and notify the source
    pub fn update_source_settings(&self, id: SourceId, settings: SourceSettings) -> Result<()> {
        let source = self
            .shared
            .registry
            .with_source_mut(id, |s| {
                s.settings = settings.clone();
                Arc::clone(&s.source)
            })
            .ok_or(RegistryError::SourceNotFound(id))?;
        source.on_settings_changed(&settings);
        Ok(())
    }

    /// Make a source type available to [`create_source`](Self::create_source)
    pub fn register_source_factory(&self, factory: Arc<dyn SourceFactory>) {
        let source_type = factory.source_type().to_string();
        tracing::debug!(source_type = %source_type, "Source factory registered");
        self.shared.factories.write().insert(source_type, factory);
    }

    /// Set or clear the rebroadcast sender
    pub fn set_rebroadcaster(&self, rebroadcaster: Option<Arc<dyn Rebroadcaster>>) {
        *self.shared.rebroadcaster.write() = rebroadcaster;
    }

    /// Replace the factory that supplies default pipeline stages
    pub fn set_pipeline_factory(&self, factory: PipelineFactory) {
        *self.shared.pipeline.write() = factory;
    }

    pub fn register_role_defaults(&self, role: &Role, defaults: RoleDefaults) {
        self.shared
            .pipeline
            .write()
            .register_role_defaults(role, defaults);
    }

    // ------------------------------------------------------------------
    // Presets
    // ------------------------------------------------------------------

    /// Recreate a source from a preset
    pub fn create_source(&self, preset: SourcePreset) -> Result<SourceId> {
        if !preset.id.is_valid() {
            return Err(PresetError::InvalidSourceId.into());
        }
        if preset.id == SourceId::DEFAULT_VIRTUAL {
            return Err(PresetError::DefaultVirtualSource.into());
        }
        if self.shared.registry.contains_source(preset.id) {
            return Err(PresetError::DuplicateSource(preset.id).into());
        }

        let source: Arc<dyn Source> = if preset.settings.is_virtual() {
            let name = preset.settings.source_name.clone().unwrap_or_default();
            Arc::new(VirtualSubjectSource::new(name))
        } else {
            let factory = self
                .shared
                .factories
                .read()
                .get(&preset.source_type)
                .cloned()
                .ok_or_else(|| PresetError::UnknownSourceType(preset.source_type.clone()))?;
            factory
                .create(&preset.settings.connection_string)
                .ok_or_else(|| PresetError::FactoryFailed(preset.source_type.clone()))?
        };

        self.register_source(preset.id, source, Some(preset.settings))
    }

    pub fn source_preset(&self, id: SourceId) -> Option<SourcePreset> {
        let (source, settings) = self
            .shared
            .registry
            .with_source(id, |s| (Arc::clone(&s.source), s.settings.clone()))?;
        Some(SourcePreset::new(id, source.source_type(), settings))
    }

    /// Recreate a subject from a preset
    ///
    /// A subject already registered under the key is replaced only when it
    /// is pending kill.
    pub fn create_subject(&self, preset: SubjectPreset) -> Result<()> {
        let SubjectPreset {
            key,
            role,
            settings,
            virtual_subject,
            enabled,
        } = preset;

        let role = role.ok_or_else(|| PresetError::RoleUndefined(key.clone()))?;
        if key.name.is_empty() {
            return Err(PresetError::EmptySubjectName.into());
        }

        let source = self
            .shared
            .registry
            .with_source(key.source, |s| {
                (!s.pending_kill).then(|| (s.is_virtual(), Arc::clone(&s.timing)))
            })
            .flatten();
        let Some((is_virtual, timing)) = source else {
            return Err(PresetError::SourceNotFound(key.source).into());
        };

        let duplicate = self
            .shared
            .registry
            .with_subject(&key, |e| !e.pending_kill)
            .unwrap_or(false);
        if duplicate {
            return Err(PresetError::DuplicateSubject(key).into());
        }

        let subject = match (is_virtual, virtual_subject) {
            (true, Some(inner)) => {
                let mut host = VirtualSubjectHost::new(key.clone(), inner);
                let role = host.role();
                *host.settings_mut() = SubjectSettings {
                    role: Some(role),
                    ..settings
                };
                Subject::Virtual(host)
            }
            (true, None) => return Err(PresetError::MissingVirtualSubject(key).into()),
            (false, Some(_)) => return Err(RegistryError::NotVirtualSource(key.source).into()),
            (false, None) => {
                let settings = SubjectSettings {
                    role: Some(role),
                    ..settings
                };
                Subject::Live(LiveSubject::new(key.clone(), settings, timing))
            }
        };

        self.shared
            .registry
            .add_subject(SubjectEntry::new(key.clone(), subject))?;
        if enabled {
            self.shared.registry.set_subject_enabled(&key, true)?;
        }
        self.shared.events.emit(ClientEvent::SubjectAdded(key));
        Ok(())
    }

    pub fn subject_preset(&self, key: &SubjectKey) -> Option<SubjectPreset> {
        self.shared.registry.with_subject(key, |e| SubjectPreset {
            key: e.key.clone(),
            role: e.subject.role(),
            settings: e.subject.settings().clone(),
            virtual_subject: match &e.subject {
                Subject::Virtual(host) => Some(host.duplicate()),
                Subject::Live(_) => None,
            },
            enabled: e.enabled,
        })
    }

    // ------------------------------------------------------------------
    // Subjects
    // ------------------------------------------------------------------

    /// Queue static data; applied at the next tick
    pub fn push_subject_static_data(&self, key: SubjectKey, role: Role, static_data: StaticData) {
        self.shared.push_static(key, role, static_data);
    }

    /// Queue a frame; applied at the next tick
    pub fn push_subject_frame_data(&self, key: SubjectKey, frame: FrameData) {
        self.shared.push_frame(key, frame);
    }

    /// Request removal of a subject at the next tick
    pub fn remove_subject(&self, key: &SubjectKey) -> Result<()> {
        self.shared.registry.mark_subject_pending_kill(key)?;
        Ok(())
    }

    /// Register a virtual subject on a virtual source
    pub fn add_virtual_subject(
        &self,
        key: SubjectKey,
        subject: Box<dyn VirtualSubject>,
    ) -> Result<()> {
        let is_virtual = self
            .shared
            .registry
            .with_source(key.source, |s| s.is_virtual())
            .ok_or(RegistryError::SourceNotFound(key.source))?;
        if !is_virtual {
            return Err(RegistryError::NotVirtualSource(key.source).into());
        }
        if key.name.is_empty() {
            return Err(PresetError::EmptySubjectName.into());
        }

        let enable = self
            .shared
            .registry
            .find_enabled_subject_key(&key.name)
            .is_none();
        let host = VirtualSubjectHost::new(key.clone(), subject);
        self.shared
            .registry
            .add_subject(SubjectEntry::new(key.clone(), Subject::Virtual(host)))?;
        if enable {
            self.shared.registry.set_subject_enabled(&key, true)?;
        }

        tracing::info!(subject = %key, "Virtual subject added");
        self.shared.events.emit(ClientEvent::SubjectAdded(key));
        Ok(())
    }

    fn enabled_by_name(&self, name: &SubjectName) -> Option<SubjectKey> {
        self.shared.registry.find_enabled_subject_key(name)
    }

    /// Hold the enabled subject with this name on its current frame
    pub fn pause_subject(&self, name: impl Into<SubjectName>) -> bool {
        let Some(key) = self.enabled_by_name(&name.into()) else {
            return false;
        };
        let paused = self
            .shared
            .registry
            .with_subject_mut(&key, |e| e.subject.pause())
            .unwrap_or(false);
        if paused {
            tracing::info!(subject = %key, "Subject paused");
        }
        paused
    }

    pub fn unpause_subject(&self, name: impl Into<SubjectName>) -> bool {
        let Some(key) = self.enabled_by_name(&name.into()) else {
            return false;
        };
        let resumed = self
            .shared
            .registry
            .with_subject_mut(&key, |e| e.subject.unpause())
            .unwrap_or(false);
        if resumed {
            tracing::info!(subject = %key, "Subject unpaused");
        }
        resumed
    }

    /// Empty the buffer of the enabled subject with this name
    pub fn clear_subject_frames(&self, name: impl Into<SubjectName>) -> bool {
        match self.enabled_by_name(&name.into()) {
            Some(key) => self.clear_subject_frames_by_key(&key),
            None => false,
        }
    }

    pub fn clear_subject_frames_by_key(&self, key: &SubjectKey) -> bool {
        self.shared
            .registry
            .with_subject_mut(key, |e| e.subject.clear_frames())
            .is_some()
    }

    pub fn clear_all_subject_frames(&self) {
        self.shared
            .registry
            .for_each_subject_mut(|e| e.subject.clear_frames());
    }

    /// Registered subjects, excluding those pending kill
    pub fn subjects(&self, include_disabled: bool, include_virtual: bool) -> Vec<SubjectKey> {
        let mut keys = Vec::new();
        self.shared.registry.for_each_subject(|e| {
            if e.pending_kill
                || (!include_disabled && !e.enabled)
                || (!include_virtual && e.is_virtual())
            {
                return;
            }
            keys.push(e.key.clone());
        });
        keys
    }

    /// Whether the subject has data to evaluate
    pub fn is_subject_valid(&self, key: &SubjectKey) -> bool {
        self.shared
            .registry
            .with_subject(key, |e| !e.pending_kill && e.subject.has_valid_frame_snapshot())
            .unwrap_or(false)
    }

    pub fn is_subject_enabled(&self, key: &SubjectKey) -> bool {
        self.shared
            .registry
            .with_subject(key, |e| e.is_active())
            .unwrap_or(false)
    }

    /// Enable a subject (disabling others with its name) or disable it
    pub fn set_subject_enabled(&self, key: &SubjectKey, enabled: bool) -> Result<()> {
        self.shared.registry.set_subject_enabled(key, enabled)?;
        Ok(())
    }

    /// Whether the subject is evaluated against scene time
    pub fn is_subject_time_synchronized(&self, key: &SubjectKey) -> bool {
        self.shared
            .registry
            .with_subject(key, |e| {
                e.subject
                    .as_live()
                    .map(|l| l.is_time_synchronized())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    pub fn subject_role(&self, key: &SubjectKey) -> Option<Role> {
        self.shared
            .registry
            .with_subject(key, |e| e.subject.role())
            .flatten()
    }

    pub fn does_subject_support_role(&self, key: &SubjectKey, role: &Role) -> bool {
        self.shared
            .registry
            .with_subject(key, |e| e.subject.supports_role(role))
            .unwrap_or(false)
    }

    pub fn subjects_supporting_role(
        &self,
        role: &Role,
        include_disabled: bool,
        include_virtual: bool,
    ) -> Vec<SubjectKey> {
        let mut keys = Vec::new();
        self.shared.registry.for_each_subject(|e| {
            if e.pending_kill
                || (!include_disabled && !e.enabled)
                || (!include_virtual && e.is_virtual())
            {
                return;
            }
            if e.subject.supports_role(role) {
                keys.push(e.key.clone());
            }
        });
        keys
    }

    /// Time coordinates of every buffered sample, in receive order
    pub fn subject_frame_times(&self, key: &SubjectKey) -> Vec<SampleTime> {
        self.shared
            .registry
            .with_subject(key, |e| {
                e.subject
                    .as_live()
                    .map(|l| l.frame_times())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Advisory connectivity state, computed now
    pub fn subject_state(&self, key: &SubjectKey) -> SubjectState {
        let source_valid = self.is_source_still_valid(key.source);
        let now = self.shared.clock.now();
        let staleness = self.shared.config.staleness_threshold.as_secs_f64();

        self.shared
            .registry
            .with_subject(key, |e| {
                if !e.is_active() {
                    SubjectState::InvalidOrDisabled
                } else if !source_valid {
                    SubjectState::Disconnected
                } else {
                    e.subject.state(now, staleness)
                }
            })
            .unwrap_or(SubjectState::InvalidOrDisabled)
    }

    /// Static data after remapping, or as received when `remapped` is false
    pub fn subject_static_data(&self, key: &SubjectKey, remapped: bool) -> Option<Arc<StaticData>> {
        self.shared
            .registry
            .with_subject(key, |e| match &e.subject {
                Subject::Live(live) => live.static_data(remapped).cloned(),
                Subject::Virtual(host) => host.static_data().cloned(),
            })
            .flatten()
    }

    pub fn subject_settings(&self, key: &SubjectKey) -> Option<SubjectSettings> {
        self.shared
            .registry
            .with_subject(key, |e| e.subject.settings().clone())
    }

    /// Replace a subject's settings; its role is kept
    ///
    /// A new remapper applies from the next static data.
    pub fn update_subject_settings(&self, key: &SubjectKey, settings: SubjectSettings) -> Result<()> {
        self.shared
            .registry
            .with_subject_mut(key, |e| {
                let role = e.subject.role();
                *e.subject.settings_mut() = SubjectSettings { role, ..settings };
            })
            .ok_or_else(|| RegistryError::SubjectNotFound(key.clone()))?;
        Ok(())
    }

    pub fn has_pending_subject_frames(&self, key: &SubjectKey) -> bool {
        self.shared.queue.has_pending_frames_for(key)
    }

    /// Subject chosen for each name at the last tick
    pub fn enabled_subjects(&self) -> Vec<SubjectKey> {
        self.shared.enabled.read().values().cloned().collect()
    }

    pub fn subject_stats(&self, key: &SubjectKey) -> Option<BufferHealth> {
        self.shared
            .registry
            .with_subject(key, |e| e.subject.as_live().map(|l| l.stats().snapshot()))
            .flatten()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            sources: self.shared.registry.source_count(),
            subjects: self.shared.registry.subject_count(),
            enabled_subjects: self.shared.enabled.read().len(),
            pending_static: self.shared.queue.pending_static(),
            pending_frames: self.shared.queue.pending_frames(),
            queue: self.shared.queue.stats(),
            uptime: self.shared.created_at.elapsed(),
        }
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    fn evaluate_with<F>(&self, key: &SubjectKey, f: F) -> Option<SubjectFrameData>
    where
        F: FnOnce(&Subject) -> Option<SubjectFrameData>,
    {
        let result = self
            .shared
            .registry
            .with_subject(key, |e| if e.pending_kill { None } else { f(&e.subject) })
            .flatten();
        if result.is_some() {
            self.shared
                .events
                .emit(ClientEvent::SubjectEvaluated(key.clone()));
        }
        result
    }

    fn snapshot_key(&self, name: &SubjectName) -> Option<SubjectKey> {
        self.shared.enabled.read().get(name).cloned()
    }

    /// Evaluate a subject by key at any request
    pub fn evaluate(
        &self,
        key: &SubjectKey,
        request: EvaluationRequest,
        role: &Role,
    ) -> Option<SubjectFrameData> {
        self.evaluate_with(key, |s| s.evaluate(request, role))
    }

    /// This tick's frame of the enabled subject with this name
    pub fn evaluate_frame(&self, name: impl Into<SubjectName>, role: &Role) -> Option<SubjectFrameData> {
        let key = self.snapshot_key(&name.into())?;
        self.evaluate_with(&key, |s| s.evaluate_snapshot(role))
    }

    /// The enabled subject with this name, sampled at a consumer world time
    pub fn evaluate_frame_at_world_time(
        &self,
        name: impl Into<SubjectName>,
        world_time: f64,
        role: &Role,
    ) -> Option<SubjectFrameData> {
        let key = self.snapshot_key(&name.into())?;
        self.evaluate(&key, EvaluationRequest::AtWorldTime(world_time), role)
    }

    /// The enabled subject with this name, sampled at a scene time
    pub fn evaluate_frame_at_scene_time(
        &self,
        name: impl Into<SubjectName>,
        scene_time: QualifiedFrameTime,
        role: &Role,
    ) -> Option<SubjectFrameData> {
        let key = self.snapshot_key(&name.into())?;
        self.evaluate(&key, EvaluationRequest::AtSceneTime(scene_time), role)
    }

    /// This tick's frame of a specific subject, enabled or not
    pub fn evaluate_frame_from_source(&self, key: &SubjectKey, role: &Role) -> Option<SubjectFrameData> {
        self.evaluate_with(key, |s| s.evaluate_snapshot(role))
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Observe data for one subject as it is pushed, on the pushing thread
    pub fn register_for_subject_received(
        &self,
        key: SubjectKey,
        on_static: Option<StaticListener>,
        on_frame: Option<RawFrameListener>,
    ) -> ListenerHandle {
        self.shared
            .queue
            .received_listeners()
            .register(key, on_static, on_frame)
    }

    pub fn unregister_for_subject_received(&self, key: &SubjectKey, handle: ListenerHandle) -> bool {
        self.shared
            .queue
            .received_listeners()
            .unregister(key, handle)
    }

    /// Observe data as it enters subjects, on the consumer thread
    pub fn register_for_data_added(
        &self,
        target: SubscriptionTarget,
        view: DataView,
        on_static: Option<StaticListener>,
        on_frame: Option<FrameListener>,
    ) -> ListenerHandle {
        self.shared
            .added
            .register(target, view, on_static, on_frame)
    }

    pub fn unregister_for_data_added(&self, handle: ListenerHandle) -> bool {
        self.shared.added.unregister(handle)
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Remove every source, waiting up to the configured timeout, then
    /// drop all remaining state
    ///
    /// Returns false if some source had to be dropped without agreeing to
    /// shut down. Later calls do nothing and return true.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return true;
        }

        let clean = self.remove_all_sources_with_timeout(self.shared.config.shutdown_timeout);

        let stopped: Vec<SubjectName> = self
            .shared
            .rebroadcasting
            .lock()
            .drain()
            .map(|(_, name)| name)
            .collect();
        if let Some(sender) = self.shared.rebroadcaster.read().clone() {
            for name in &stopped {
                sender.remove_subject(name);
            }
        }

        self.shared.registry.clear();
        self.shared.queue.clear();
        self.shared.enabled.write().clear();
        self.shared.states.lock().clear();

        tracing::info!(clean = clean, "Client shut down");
        clean
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("sources", &self.shared.registry.source_count())
            .field("subjects", &self.shared.registry.subject_count())
            .finish()
    }
}
