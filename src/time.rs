//! Time coordinates carried by samples and evaluation requests
//!
//! Three clocks are involved when a sample travels through the hub:
//!
//! - **World time**: the producer's wall clock, stamped by the source
//! - **Arrival time**: the consumer's wall clock, stamped when a sample is pushed
//! - **Scene time**: an optional timecode plus frame rate coordinate
//!
//! The consumer side is abstracted by [`Clock`] so tests can drive time
//! deterministically with [`ManualClock`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Length of a timecode day in seconds
pub const TIMECODE_DAY_SECONDS: f64 = 86_400.0;

/// Rational frame rate (e.g. 30000/1001 for 29.97)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub const FPS_24: FrameRate = FrameRate::new(24, 1);
    pub const FPS_30: FrameRate = FrameRate::new(30, 1);
    pub const FPS_60: FrameRate = FrameRate::new(60, 1);

    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// A rate with a zero numerator or denominator cannot convert frames
    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Frames per second as a float, 0.0 when invalid
    pub fn as_fps(&self) -> f64 {
        if self.is_valid() {
            self.numerator as f64 / self.denominator as f64
        } else {
            0.0
        }
    }

    /// Duration of one frame in seconds
    pub fn frame_duration(&self) -> f64 {
        if self.is_valid() {
            self.denominator as f64 / self.numerator as f64
        } else {
            0.0
        }
    }

    pub fn frames_to_seconds(&self, frames: f64) -> f64 {
        frames * self.frame_duration()
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> f64 {
        seconds * self.as_fps()
    }

    /// Whole frames per timecode second (29.97 counts as 30)
    fn timecode_fps(&self) -> i64 {
        self.as_fps().ceil().max(1.0) as i64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}fps", self.numerator)
        } else {
            write!(f, "{:.3}fps", self.as_fps())
        }
    }
}

/// Frame number plus a fractional subframe in `[0, 1)`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    pub frame: i64,
    pub sub_frame: f32,
}

impl FrameTime {
    pub fn new(frame: i64, sub_frame: f32) -> Self {
        let sub_frame = if sub_frame.is_finite() {
            sub_frame.clamp(0.0, 0.999_999)
        } else {
            0.0
        };
        Self { frame, sub_frame }
    }

    pub fn from_frame(frame: i64) -> Self {
        Self {
            frame,
            sub_frame: 0.0,
        }
    }

    pub fn as_decimal(&self) -> f64 {
        self.frame as f64 + self.sub_frame as f64
    }
}

/// A frame time qualified by the rate it was counted at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualifiedFrameTime {
    pub time: FrameTime,
    pub rate: FrameRate,
}

impl QualifiedFrameTime {
    pub fn new(time: FrameTime, rate: FrameRate) -> Self {
        Self { time, rate }
    }

    pub fn from_timecode(timecode: Timecode, rate: FrameRate) -> Self {
        Self {
            time: FrameTime::from_frame(timecode.to_frame_number(rate)),
            rate,
        }
    }

    pub fn as_seconds(&self) -> f64 {
        self.rate.frames_to_seconds(self.time.as_decimal())
    }

    pub fn timecode(&self) -> Timecode {
        Timecode::from_frame_number(self.time.frame, self.rate)
    }
}

impl fmt::Display for QualifiedFrameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.timecode(), self.rate)
    }
}

/// Non-drop-frame SMPTE style timecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl Timecode {
    pub fn new(hours: u32, minutes: u32, seconds: u32, frames: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            frames,
        }
    }

    /// Build a timecode from an absolute frame count, wrapping at 24 hours
    pub fn from_frame_number(frame: i64, rate: FrameRate) -> Self {
        let fps = rate.timecode_fps();
        let frames_per_day = fps * TIMECODE_DAY_SECONDS as i64;
        let total = frame.rem_euclid(frames_per_day);

        let frames = total % fps;
        let total_seconds = total / fps;

        Self {
            hours: (total_seconds / 3600) as u32,
            minutes: ((total_seconds / 60) % 60) as u32,
            seconds: (total_seconds % 60) as u32,
            frames: frames as u32,
        }
    }

    pub fn to_frame_number(&self, rate: FrameRate) -> i64 {
        let fps = rate.timecode_fps();
        let seconds =
            self.hours as i64 * 3600 + self.minutes as i64 * 60 + self.seconds as i64;
        seconds * fps + self.frames as i64
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// Signed difference `a - b` folded into `(-modulus / 2, modulus / 2]`
///
/// Used to compare scene times across a timecode rollover.
pub fn wrapped_delta(a: f64, b: f64, modulus: f64) -> f64 {
    if modulus <= 0.0 {
        return a - b;
    }
    let half = modulus / 2.0;
    let mut delta = (a - b).rem_euclid(modulus);
    if delta > half {
        delta -= modulus;
    }
    delta
}

/// Producer wall-clock time plus the estimated producer-to-consumer offset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldTime {
    time: f64,
    offset: f64,
}

impl WorldTime {
    pub fn new(time: f64) -> Self {
        Self { time, offset: 0.0 }
    }

    pub fn with_offset(time: f64, offset: f64) -> Self {
        Self { time, offset }
    }

    /// Time as stamped by the producer
    pub fn source_time(&self) -> f64 {
        self.time
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    /// Producer time translated into the consumer timeline
    pub fn offsetted_time(&self) -> f64 {
        self.time + self.offset
    }
}

/// Source of consumer-side time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Consumer wall-clock seconds
    fn now(&self) -> f64;

    /// Consumer scene time, when a timecode provider is attached
    fn scene_time(&self) -> Option<QualifiedFrameTime> {
        None
    }
}

/// Monotonic clock measured from construction
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Externally driven clock
///
/// Every read returns exactly what was last set, which makes clock-offset
/// and staleness behaviour reproducible.
#[derive(Debug, Default)]
pub struct ManualClock {
    seconds: AtomicU64,
    scene: Mutex<Option<QualifiedFrameTime>>,
}

impl ManualClock {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds: AtomicU64::new(seconds.to_bits()),
            scene: Mutex::new(None),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }

    pub fn set_scene_time(&self, scene: Option<QualifiedFrameTime>) {
        *self.scene.lock() = scene;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::Relaxed))
    }

    fn scene_time(&self) -> Option<QualifiedFrameTime> {
        *self.scene.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate_conversion() {
        let rate = FrameRate::FPS_30;

        assert!(rate.is_valid());
        assert_eq!(rate.as_fps(), 30.0);
        assert!((rate.frames_to_seconds(45.0) - 1.5).abs() < 1e-12);
        assert!((rate.seconds_to_frames(2.0) - 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_frame_rate() {
        let rate = FrameRate::new(0, 1);

        assert!(!rate.is_valid());
        assert_eq!(rate.as_fps(), 0.0);
        assert_eq!(rate.frame_duration(), 0.0);
    }

    #[test]
    fn test_frame_time_clamps_sub_frame() {
        assert_eq!(FrameTime::new(3, -0.5).sub_frame, 0.0);
        assert!(FrameTime::new(3, 1.5).sub_frame < 1.0);
        assert_eq!(FrameTime::new(3, f32::NAN).sub_frame, 0.0);
        assert!((FrameTime::new(3, 0.25).as_decimal() - 3.25).abs() < 1e-6);
    }

    #[test]
    fn test_timecode_round_trip() {
        let rate = FrameRate::FPS_24;
        let tc = Timecode::new(1, 2, 3, 4);
        let frame = tc.to_frame_number(rate);

        assert_eq!(frame, (3600 + 120 + 3) * 24 + 4);
        assert_eq!(Timecode::from_frame_number(frame, rate), tc);
        assert_eq!(tc.to_string(), "01:02:03:04");
    }

    #[test]
    fn test_timecode_wraps_at_day() {
        let rate = FrameRate::FPS_30;
        let last = Timecode::new(23, 59, 59, 29);
        let next = Timecode::from_frame_number(last.to_frame_number(rate) + 1, rate);

        assert_eq!(next, Timecode::new(0, 0, 0, 0));
    }

    #[test]
    fn test_qualified_frame_time_seconds() {
        let qft = QualifiedFrameTime::new(FrameTime::new(15, 0.5), FrameRate::FPS_30);

        assert!((qft.as_seconds() - 0.516_666).abs() < 1e-5);
        assert_eq!(qft.timecode(), Timecode::new(0, 0, 0, 15));
    }

    #[test]
    fn test_wrapped_delta_across_rollover() {
        let day = TIMECODE_DAY_SECONDS;

        // Plain difference when far from the boundary
        assert!((wrapped_delta(10.0, 4.0, day) - 6.0).abs() < 1e-9);
        // Just after midnight compared with just before it
        assert!((wrapped_delta(0.5, day - 0.5, day) - 1.0).abs() < 1e-9);
        assert!((wrapped_delta(day - 0.5, 0.5, day) + 1.0).abs() < 1e-9);
        // Non-positive modulus disables wrapping
        assert_eq!(wrapped_delta(5.0, 1.0, 0.0), 4.0);
    }

    #[test]
    fn test_world_time_offset() {
        let mut time = WorldTime::new(10.0);
        time.set_offset(2.5);

        assert_eq!(time.source_time(), 10.0);
        assert_eq!(time.offsetted_time(), 12.5);
        assert_eq!(WorldTime::with_offset(1.0, -0.5).offsetted_time(), 0.5);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(5.0);
        assert_eq!(clock.now(), 5.0);

        clock.advance(0.25);
        assert_eq!(clock.now(), 5.25);

        assert!(clock.scene_time().is_none());
        let scene = QualifiedFrameTime::new(FrameTime::from_frame(10), FrameRate::FPS_24);
        clock.set_scene_time(Some(scene));
        assert_eq!(clock.scene_time(), Some(scene));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();

        assert!(b >= a);
        assert!(clock.scene_time().is_none());
    }
}
