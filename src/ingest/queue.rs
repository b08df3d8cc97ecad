//! Any-thread ingestion queue
//!
//! Producers push static and frame data from arbitrary threads; the consumer
//! drains both lists once per tick. Each list is a bounded channel. When a
//! list is full the queue pops from its own receiver to discard the oldest
//! entry, so a push never blocks and the retained entries are always the most
//! recent ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use super::listeners::ReceivedListeners;
use crate::data::{ArrivalTime, FrameData, FrameId, Role, StaticData};
use crate::log::LogThrottle;
use crate::registry::SubjectKey;
use crate::stats::{QueueHealth, QueueStats};
use crate::time::Clock;

/// Default ceiling for pending static entries
pub const DEFAULT_MAX_PENDING_STATIC: usize = 256;

/// Default ceiling for pending frames
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 2048;

const OVERFLOW_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Static data waiting to be applied
#[derive(Debug, Clone)]
pub struct PendingStatic {
    pub key: SubjectKey,
    pub role: Role,
    pub static_data: StaticData,
}

/// Frame waiting to be applied
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub key: SubjectKey,
    pub frame: FrameData,
    /// Consumer clock when the frame was pushed
    pub arrival: ArrivalTime,
}

/// Everything taken from the queue by one drain
#[derive(Debug, Default)]
pub struct Drained {
    pub statics: Vec<PendingStatic>,
    pub frames: Vec<PendingFrame>,
}

/// Bounded FIFO that discards its oldest entry instead of blocking
#[derive(Debug)]
struct BoundedPending<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> BoundedPending<T> {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Append, handing each entry discarded to make room to `on_drop`
    fn push(&self, mut item: T, mut on_drop: impl FnMut(T)) -> usize {
        let mut dropped = 0;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(rejected)) => {
                    item = rejected;
                    if let Ok(oldest) = self.rx.try_recv() {
                        on_drop(oldest);
                        dropped += 1;
                    }
                }
                // Both ends live in this struct
                Err(TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }

    /// Take what is pending now; later pushes wait for the next drain
    fn drain(&self) -> Vec<T> {
        let count = self.rx.len();
        self.rx.try_iter().take(count).collect()
    }

    fn len(&self) -> usize {
        self.rx.len()
    }

    fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Staging area between producer threads and the consumer tick
pub struct IngestionQueue {
    statics: BoundedPending<PendingStatic>,
    frames: BoundedPending<PendingFrame>,
    /// Pending frame count per subject
    frames_per_subject: Mutex<HashMap<SubjectKey, usize>>,
    received: ReceivedListeners,
    clock: Arc<dyn Clock>,
    stats: QueueStats,
    static_overflow: LogThrottle,
    frame_overflow: LogThrottle,
}

impl IngestionQueue {
    pub fn new(max_pending_static: usize, max_pending_frames: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            statics: BoundedPending::new(max_pending_static),
            frames: BoundedPending::new(max_pending_frames),
            frames_per_subject: Mutex::new(HashMap::new()),
            received: ReceivedListeners::new(),
            clock,
            stats: QueueStats::new(),
            static_overflow: LogThrottle::new(OVERFLOW_WARN_INTERVAL),
            frame_overflow: LogThrottle::new(OVERFLOW_WARN_INTERVAL),
        }
    }

    /// Listeners notified on the pushing thread
    pub fn received_listeners(&self) -> &ReceivedListeners {
        &self.received
    }

    /// Queue static data; nothing is validated here
    pub fn push_static(&self, key: SubjectKey, role: Role, static_data: StaticData) {
        self.received.notify_static(&key, &role, &static_data);

        let dropped = self.statics.push(
            PendingStatic {
                key,
                role,
                static_data,
            },
            drop,
        );
        self.stats.record_static(dropped);
        if dropped > 0 {
            if let Some(suppressed) = self.static_overflow.ready() {
                tracing::warn!(
                    dropped = dropped,
                    suppressed = suppressed,
                    "Pending static data overflow, dropping oldest"
                );
            }
        }
    }

    /// Queue a frame, stamping its arrival on the consumer clock
    pub fn push_frame(&self, key: SubjectKey, frame: FrameData) {
        self.received.notify_frame(&key, &frame);

        let arrival = ArrivalTime {
            world_time: self.clock.now(),
            scene_time: self.clock.scene_time(),
        };
        *self.frames_per_subject.lock().entry(key.clone()).or_default() += 1;
        let dropped = self.frames.push(
            PendingFrame {
                key,
                frame,
                arrival,
            },
            |oldest| self.forget_frame(&oldest.key),
        );
        self.stats.record_frame(dropped);
        if dropped > 0 {
            if let Some(suppressed) = self.frame_overflow.ready() {
                tracing::warn!(
                    dropped = dropped,
                    suppressed = suppressed,
                    "Pending frame overflow, dropping oldest"
                );
            }
        }
    }

    /// Take all pending entries, assigning receive-order ids to frames
    pub fn drain(&self) -> Drained {
        let statics = self.statics.drain();
        let mut frames = self.frames.drain();
        for pending in &mut frames {
            pending.frame.frame_id = FrameId::next();
            self.forget_frame(&pending.key);
        }
        Drained { statics, frames }
    }

    fn forget_frame(&self, key: &SubjectKey) {
        let mut counts = self.frames_per_subject.lock();
        if let Some(count) = counts.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                counts.remove(key);
            }
        }
    }

    pub fn pending_static(&self) -> usize {
        self.statics.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Whether frames for this subject are waiting
    pub fn has_pending_frames_for(&self, key: &SubjectKey) -> bool {
        self.frames_per_subject.lock().contains_key(key)
    }

    pub fn clear(&self) {
        self.statics.clear();
        self.frames.clear();
        self.frames_per_subject.lock().clear();
    }

    pub fn stats(&self) -> QueueHealth {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::registry::SourceId;
    use crate::time::ManualClock;

    fn queue(max_static: usize, max_frames: usize) -> IngestionQueue {
        IngestionQueue::new(max_static, max_frames, Arc::new(ManualClock::new(0.0)))
    }

    fn key() -> SubjectKey {
        SubjectKey::new(SourceId::new(), "Actor")
    }

    #[test]
    fn test_bounded_frames_keep_newest() {
        let queue = queue(4, 8);
        let key = key();

        for i in 0..20 {
            queue.push_frame(key.clone(), FrameData::new(i as f64));
            assert!(queue.pending_frames() <= 8);
        }

        let drained = queue.drain();
        let times: Vec<f64> = drained
            .frames
            .iter()
            .map(|p| p.frame.world_time.source_time())
            .collect();
        assert_eq!(times, (12..20).map(|i| i as f64).collect::<Vec<_>>());
        assert_eq!(queue.stats().frames_dropped, 12);
        assert_eq!(queue.stats().frames_pushed, 20);
    }

    #[test]
    fn test_bounded_statics_keep_newest() {
        let queue = queue(2, 8);
        for name in ["a", "b", "c"] {
            queue.push_static(key(), Role::basic(), StaticData::with_properties([name]));
        }

        let drained = queue.drain();
        let names: Vec<&str> = drained
            .statics
            .iter()
            .map(|p| p.static_data.property_names[0].as_str())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(queue.stats().statics_dropped, 1);
    }

    #[test]
    fn test_drain_assigns_increasing_frame_ids() {
        let queue = queue(4, 8);
        let key = key();
        queue.push_frame(key.clone(), FrameData::new(1.0));
        queue.push_frame(key.clone(), FrameData::new(1.0));

        let drained = queue.drain();
        let ids: Vec<FrameId> = drained.frames.iter().map(|p| p.frame.frame_id).collect();
        assert!(ids[0].is_assigned());
        assert!(ids[1] > ids[0]);
        assert_eq!(queue.pending_frames(), 0);
    }

    #[test]
    fn test_arrival_stamped_at_push() {
        let clock = Arc::new(ManualClock::new(3.5));
        let queue = IngestionQueue::new(4, 4, clock.clone());
        queue.push_frame(key(), FrameData::new(1.0));
        clock.set(9.0);

        let drained = queue.drain();
        assert_eq!(drained.frames[0].arrival.world_time, 3.5);
    }

    #[test]
    fn test_received_listener_runs_before_queueing() {
        let queue = Arc::new(queue(4, 4));
        let key = key();
        let seen = Arc::new(AtomicUsize::new(0));

        let observer = Arc::clone(&seen);
        let queue_ref = Arc::downgrade(&queue);
        queue.received_listeners().register(
            key.clone(),
            None,
            Some(Arc::new(move |_: &SubjectKey, _: &FrameData| {
                let pending = queue_ref.upgrade().map(|q| q.pending_frames()).unwrap_or(99);
                observer.store(pending, Ordering::Relaxed);
            })),
        );

        queue.push_frame(key, FrameData::new(0.0));
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        assert_eq!(queue.pending_frames(), 1);
    }

    #[test]
    fn test_has_pending_frames_for() {
        let queue = queue(4, 8);
        let a = key();
        let b = SubjectKey::new(SourceId::new(), "Other");
        queue.push_frame(a.clone(), FrameData::new(1.0));
        queue.push_frame(a.clone(), FrameData::new(2.0));

        assert!(queue.has_pending_frames_for(&a));
        assert!(!queue.has_pending_frames_for(&b));

        queue.drain();
        assert!(!queue.has_pending_frames_for(&a));
    }

    #[test]
    fn test_overflow_updates_subject_counts() {
        let queue = queue(4, 2);
        let a = key();
        let b = SubjectKey::new(SourceId::new(), "Other");
        queue.push_frame(a.clone(), FrameData::new(1.0));
        queue.push_frame(b.clone(), FrameData::new(1.0));
        queue.push_frame(b.clone(), FrameData::new(2.0));

        // The only frame for `a` was the oldest and got dropped
        assert!(!queue.has_pending_frames_for(&a));
        assert!(queue.has_pending_frames_for(&b));
    }

    #[test]
    fn test_concurrent_pushes_are_bounded() {
        let queue = Arc::new(queue(4, 64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let key = SubjectKey::new(SourceId::new(), format!("s{}", t));
                    for i in 0..100 {
                        queue.push_frame(key.clone(), FrameData::new(i as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(queue.pending_frames() <= 64);
        let health = queue.stats();
        assert_eq!(health.frames_pushed, 400);
        assert_eq!(health.frames_pushed - health.frames_dropped, queue.drain().frames.len() as u64);
    }
}
