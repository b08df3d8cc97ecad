//! Per-subject frame buffer
//!
//! Samples are kept in receive order and evicted oldest-first once the
//! capacity is reached. Receive order is not time order in general, so time
//! queries scan the whole buffer and resolve ties by receive position.
//!
//! Queries return a [`Bracket`] describing where the requested time falls;
//! the subject turns that into a closest or interpolated sample.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::data::{FrameData, StaticData};
use crate::time::{wrapped_delta, FrameRate, QualifiedFrameTime, WorldTime};

/// Capacity used when nothing else is configured
pub const DEFAULT_CAPACITY: usize = 16;

/// A buffered frame together with the time it was matched on
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub frame: &'a FrameData,
    pub time: f64,
}

/// Position of a requested time relative to the buffered samples
#[derive(Debug, Clone, Copy)]
pub enum Bracket<'a> {
    /// Request precedes every sample; holds the earliest one
    BeforeOldest(Sample<'a>),
    /// Request follows every sample; holds the latest one
    AfterNewest(Sample<'a>),
    /// A sample sits exactly at the requested time
    Exact(Sample<'a>),
    /// Request falls strictly between two samples
    Between {
        lower: Sample<'a>,
        upper: Sample<'a>,
        /// Fractional position of the request from `lower` to `upper`
        alpha: f64,
    },
}

impl<'a> Bracket<'a> {
    /// The sample nearest to the request, preferring the earlier one on ties
    pub fn closest(&self) -> Sample<'a> {
        match *self {
            Bracket::BeforeOldest(s) | Bracket::AfterNewest(s) | Bracket::Exact(s) => s,
            Bracket::Between { lower, upper, alpha } => {
                if alpha <= 0.5 {
                    lower
                } else {
                    upper
                }
            }
        }
    }
}

/// Time coordinates of one buffered sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTime {
    pub world_time: WorldTime,
    pub scene_time: Option<QualifiedFrameTime>,
}

/// Bounded, receive-ordered sample store plus the active static data
#[derive(Debug)]
pub struct FrameBuffer {
    capacity: usize,
    static_data: Option<Arc<StaticData>>,
    frames: VecDeque<FrameData>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a buffer holding at most `capacity` samples (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            static_data: None,
            frames: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting the oldest samples if needed
    ///
    /// Returns the number of evicted samples.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);
        self.evict_to(self.capacity)
    }

    pub fn set_static_data(&mut self, static_data: Arc<StaticData>) {
        self.static_data = Some(static_data);
    }

    pub fn static_data(&self) -> Option<&Arc<StaticData>> {
        self.static_data.as_ref()
    }

    /// Append a sample, returning how many old samples were evicted
    pub fn push(&mut self, frame: FrameData) -> usize {
        let evicted = self.evict_to(self.capacity - 1);
        self.frames.push_back(frame);
        evicted
    }

    /// Drop all samples but keep the static data
    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    /// Drop samples and static data
    pub fn clear(&mut self) {
        self.clear_frames();
        self.static_data = None;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Most recently appended sample
    pub fn latest(&self) -> Option<&FrameData> {
        self.frames.back()
    }

    /// Samples in receive order
    pub fn frames(&self) -> impl Iterator<Item = &FrameData> {
        self.frames.iter()
    }

    pub fn frame_times(&self) -> Vec<SampleTime> {
        self.frames
            .iter()
            .map(|f| SampleTime {
                world_time: f.world_time,
                scene_time: f.scene_time,
            })
            .collect()
    }

    /// Smallest and largest producer world time in the buffer
    pub fn world_time_range(&self) -> Option<(f64, f64)> {
        let mut times = self.frames.iter().map(|f| f.world_time.source_time());
        let first = times.next()?;
        Some(times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }

    /// Locate a producer world time among the samples
    pub fn bracket_world_time(&self, target: f64) -> Option<Bracket<'_>> {
        let times = self
            .frames
            .iter()
            .map(|f| f.world_time.source_time())
            .collect::<Vec<_>>();
        self.bracket(&times, target)
    }

    /// Locate a scene time (in seconds) among the samples that carry one
    ///
    /// Samples sharing a timecode frame with no explicit subframe are spread
    /// across that frame in receive order. With `rollover` set, sample times
    /// are unwrapped to the representation nearest the request.
    pub fn bracket_scene_time(&self, target: f64, rollover: Option<f64>) -> Option<Bracket<'_>> {
        let mut groups: HashMap<(i64, FrameRate), Vec<usize>> = HashMap::new();
        for (index, frame) in self.frames.iter().enumerate() {
            if let Some(scene) = frame.scene_time {
                groups
                    .entry((scene.time.frame, scene.rate))
                    .or_default()
                    .push(index);
            }
        }
        if groups.is_empty() {
            return None;
        }

        let mut times = vec![f64::NAN; self.frames.len()];
        for indices in groups.values() {
            let bind = indices.len() > 1
                && indices.iter().all(|&i| {
                    self.frames[i]
                        .scene_time
                        .map(|s| s.time.sub_frame == 0.0)
                        .unwrap_or(false)
                });

            for (position, &index) in indices.iter().enumerate() {
                let Some(scene) = self.frames[index].scene_time else {
                    continue;
                };
                let sub_frame = if bind {
                    position as f64 / indices.len() as f64
                } else {
                    scene.time.sub_frame as f64
                };
                let mut seconds = scene.rate.frames_to_seconds(scene.time.frame as f64 + sub_frame);
                if let Some(modulus) = rollover {
                    seconds = target + wrapped_delta(seconds, target, modulus);
                }
                times[index] = seconds;
            }
        }

        self.bracket(&times, target)
    }

    /// Shared search; `times[i]` is NaN for samples that do not take part
    fn bracket(&self, times: &[f64], target: f64) -> Option<Bracket<'_>> {
        let mut lower: Option<(usize, f64)> = None;
        let mut upper: Option<(usize, f64)> = None;

        for (index, &time) in times.iter().enumerate() {
            if time.is_nan() {
                continue;
            }
            if time <= target {
                // Greatest time not after the target, earliest received on ties
                if lower.map_or(true, |(_, t)| time > t) {
                    lower = Some((index, time));
                }
            } else if upper.map_or(true, |(_, t)| time < t) {
                upper = Some((index, time));
            }
        }

        let sample = |(index, time): (usize, f64)| Sample {
            frame: &self.frames[index],
            time,
        };

        match (lower, upper) {
            (None, None) => None,
            (None, Some(u)) => Some(Bracket::BeforeOldest(sample(u))),
            (Some(l), None) if l.1 == target => Some(Bracket::Exact(sample(l))),
            (Some(l), None) => Some(Bracket::AfterNewest(sample(l))),
            (Some(l), Some(_)) if l.1 == target => Some(Bracket::Exact(sample(l))),
            (Some(l), Some(u)) => Some(Bracket::Between {
                lower: sample(l),
                upper: sample(u),
                alpha: (target - l.1) / (u.1 - l.1),
            }),
        }
    }

    fn evict_to(&mut self, keep: usize) -> usize {
        let mut evicted = 0;
        while self.frames.len() > keep {
            self.frames.pop_front();
            evicted += 1;
        }
        evicted
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
