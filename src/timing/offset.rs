//! Smoothed producer-to-consumer clock offset
//!
//! The estimator tracks `consumer_arrival - producer_time`. The first sample
//! seeds the estimate; every later sample moves it toward the instantaneous
//! offset by at most `correction_step`, so one noisy sample can never cause a
//! visible jump. While tracking, only a fraction of the remaining error is
//! applied per sample.
//!
//! Producer intervals are kept in a ring to tell jitter from discontinuities
//! (decoder restart, timecode rollover). One anomalous interval is ignored. A
//! streak of them switches to converging mode, which applies the whole error
//! up to `correction_step` until the estimate catches up.
//!
//! Non-finite samples are rejected and leave the estimator untouched.

use std::collections::VecDeque;

/// Default maximum change of the estimate per sample, in seconds
pub const DEFAULT_CORRECTION_STEP: f64 = 1e-4;

/// Default number of producer intervals kept for discontinuity detection
pub const DEFAULT_INTERVAL_HISTORY: usize = 200;

/// Default number of consecutive anomalous intervals before converging
pub const DEFAULT_DISCONTINUITY_STREAK: u32 = 5;

/// Intervals needed before the mean is trusted
const MIN_INTERVALS_FOR_DETECTION: usize = 8;

/// An interval this many times the mean counts as anomalous
const DISCONTINUITY_FACTOR: f64 = 10.0;

/// Share of the remaining error applied per sample while tracking
const TRACKING_GAIN: f64 = 0.1;

/// Estimator tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    pub correction_step: f64,
    pub interval_history: usize,
    pub discontinuity_streak: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            correction_step: DEFAULT_CORRECTION_STEP,
            interval_history: DEFAULT_INTERVAL_HISTORY,
            discontinuity_streak: DEFAULT_DISCONTINUITY_STREAK,
        }
    }
}

/// What a call to [`ClockOffsetEstimator::update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetUpdate {
    /// Same producer time as the previous sample, nothing changed
    Duplicate,
    /// First sample: estimate set directly
    Seeded,
    /// Estimate ramped toward the instantaneous offset
    Corrected,
    /// Discontinuity detected, converging mode armed
    Rearmed,
    /// Producer or consumer time was not finite, nothing changed
    Rejected,
}

/// Offset estimator for one clock of one source
#[derive(Debug, Clone)]
pub struct ClockOffsetEstimator {
    config: EstimatorConfig,
    estimate: Option<f64>,
    last_producer_time: Option<f64>,
    intervals: VecDeque<f64>,
    interval_sum: f64,
    anomalous_streak: u32,
    converging: bool,
}

impl ClockOffsetEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            estimate: None,
            last_producer_time: None,
            intervals: VecDeque::with_capacity(config.interval_history),
            interval_sum: 0.0,
            anomalous_streak: 0,
            converging: false,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Current estimate of `consumer - producer`, if any sample was seen
    pub fn estimated_offset(&self) -> Option<f64> {
        self.estimate
    }

    /// Whether a discontinuity is still being caught up with
    pub fn is_converging(&self) -> bool {
        self.converging
    }

    /// Mean of the tracked producer intervals
    pub fn mean_interval(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            None
        } else {
            Some(self.interval_sum / self.intervals.len() as f64)
        }
    }

    /// Feed one sample's producer time and its consumer arrival time
    pub fn update(&mut self, producer_time: f64, consumer_time: f64) -> OffsetUpdate {
        if !producer_time.is_finite() || !consumer_time.is_finite() {
            return OffsetUpdate::Rejected;
        }

        let mut rearmed = false;
        if let Some(last) = self.last_producer_time {
            if producer_time == last {
                return OffsetUpdate::Duplicate;
            }

            let interval = producer_time - last;
            if self.is_anomalous(interval) {
                self.anomalous_streak += 1;
                if self.anomalous_streak >= self.config.discontinuity_streak {
                    tracing::debug!(
                        streak = self.anomalous_streak,
                        interval = interval,
                        "Clock discontinuity detected, converging offset"
                    );
                    self.rearm();
                    rearmed = true;
                }
            } else {
                self.anomalous_streak = 0;
                self.push_interval(interval);
            }
        }
        self.last_producer_time = Some(producer_time);

        let instantaneous = consumer_time - producer_time;
        let Some(current) = self.estimate else {
            self.estimate = Some(instantaneous);
            return OffsetUpdate::Seeded;
        };

        let step = self.config.correction_step;
        let error = instantaneous - current;
        let gain = if self.converging { 1.0 } else { TRACKING_GAIN };
        self.estimate = Some(current + (error * gain).clamp(-step, step));

        if self.converging && error.abs() <= step {
            self.converging = false;
            tracing::trace!(offset = instantaneous, "Clock offset converged");
        }

        if rearmed {
            OffsetUpdate::Rearmed
        } else {
            OffsetUpdate::Corrected
        }
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.estimate = None;
        self.last_producer_time = None;
        self.converging = false;
        self.clear_intervals();
    }

    fn is_anomalous(&self, interval: f64) -> bool {
        if interval <= 0.0 {
            return true;
        }
        if self.intervals.len() < MIN_INTERVALS_FOR_DETECTION {
            return false;
        }
        match self.mean_interval() {
            Some(mean) => interval > mean * DISCONTINUITY_FACTOR,
            None => false,
        }
    }

    fn push_interval(&mut self, interval: f64) {
        if self.config.interval_history == 0 {
            return;
        }
        while self.intervals.len() >= self.config.interval_history {
            if let Some(old) = self.intervals.pop_front() {
                self.interval_sum -= old;
            }
        }
        self.intervals.push_back(interval);
        self.interval_sum += interval;
    }

    fn rearm(&mut self) {
        self.converging = true;
        self.clear_intervals();
    }

    fn clear_intervals(&mut self) {
        self.intervals.clear();
        self.interval_sum = 0.0;
        self.anomalous_streak = 0;
    }
}

impl Default for ClockOffsetEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `count` samples at a steady rate with a constant offset
    fn feed(estimator: &mut ClockOffsetEstimator, start: f64, count: usize, offset: f64) -> f64 {
        let mut t = start;
        for _ in 0..count {
            estimator.update(t, t + offset);
            t += 1.0 / 60.0;
        }
        t
    }

    #[test]
    fn test_first_sample_seeds() {
        let mut estimator = ClockOffsetEstimator::default();

        assert_eq!(estimator.estimated_offset(), None);
        assert_eq!(estimator.update(10.0, 110.0), OffsetUpdate::Seeded);
        assert_eq!(estimator.estimated_offset(), Some(100.0));
    }

    #[test]
    fn test_single_sample_moves_at_most_one_step() {
        let mut estimator = ClockOffsetEstimator::default();
        let t = feed(&mut estimator, 0.0, 20, 5.0);
        let before = estimator.estimated_offset().unwrap();

        // Instantaneous offset wildly different from the estimate
        assert_eq!(estimator.update(t, t + 1000.0), OffsetUpdate::Corrected);
        let after = estimator.estimated_offset().unwrap();

        assert!((after - before).abs() <= DEFAULT_CORRECTION_STEP + 1e-12);
        assert!(after > before);
    }

    #[test]
    fn test_every_update_bounded_after_seed() {
        let mut estimator = ClockOffsetEstimator::default();
        estimator.update(0.0, 0.0);

        let offsets = [3.0, -7.0, 0.5, 1e6, -1e6, 0.0];
        let mut t = 0.0;
        for offset in offsets {
            t += 1.0 / 30.0;
            let before = estimator.estimated_offset().unwrap();
            estimator.update(t, t + offset);
            let after = estimator.estimated_offset().unwrap();
            assert!((after - before).abs() <= DEFAULT_CORRECTION_STEP + 1e-12);
        }
    }

    #[test]
    fn test_converges_toward_instantaneous() {
        let config = EstimatorConfig {
            correction_step: 0.01,
            ..Default::default()
        };
        let mut estimator = ClockOffsetEstimator::new(config);
        estimator.update(0.0, 1.0);

        let mut t = 0.0;
        for _ in 0..200 {
            t += 0.1;
            estimator.update(t, t + 1.05);
        }
        assert!((estimator.estimated_offset().unwrap() - 1.05).abs() < 1e-6);
        assert!(!estimator.is_converging());
    }

    #[test]
    fn test_duplicate_producer_time_ignored() {
        let mut estimator = ClockOffsetEstimator::default();
        estimator.update(1.0, 2.0);
        estimator.update(1.1, 2.1);
        let before = estimator.estimated_offset();

        // Second subject of the same producer frame
        assert_eq!(estimator.update(1.1, 5.0), OffsetUpdate::Duplicate);
        assert_eq!(estimator.estimated_offset(), before);
    }

    #[test]
    fn test_single_anomaly_is_jitter() {
        let mut estimator = ClockOffsetEstimator::default();
        let t = feed(&mut estimator, 0.0, 30, 2.0);
        let before = estimator.estimated_offset().unwrap();

        // One large gap, then back to normal
        let jump = t + 30.0;
        assert_eq!(estimator.update(jump, jump + 50.0), OffsetUpdate::Corrected);
        feed(&mut estimator, jump + 1.0 / 60.0, 3, 50.0);

        let after = estimator.estimated_offset().unwrap();
        assert!((after - before).abs() <= 4.0 * DEFAULT_CORRECTION_STEP + 1e-9);
    }

    #[test]
    fn test_streak_of_anomalies_stays_bounded() {
        let mut estimator = ClockOffsetEstimator::default();
        let mut t = feed(&mut estimator, 0.0, 30, 2.0);

        // Producer clock goes backwards five times in a row
        let mut result = OffsetUpdate::Corrected;
        for _ in 0..DEFAULT_DISCONTINUITY_STREAK {
            t -= 100.0;
            let before = estimator.estimated_offset().unwrap();
            result = estimator.update(t, 500.0);
            let after = estimator.estimated_offset().unwrap();
            assert!((after - before).abs() <= DEFAULT_CORRECTION_STEP + 1e-12);
        }

        assert_eq!(result, OffsetUpdate::Rearmed);
        assert!(estimator.is_converging());
        assert!((estimator.estimated_offset().unwrap() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_rearmed_estimator_catches_up_faster() {
        let config = EstimatorConfig {
            correction_step: 0.01,
            ..Default::default()
        };
        let mut tracking = ClockOffsetEstimator::new(config);
        let mut rearmed = ClockOffsetEstimator::new(config);
        let start = feed(&mut tracking, 0.0, 30, 2.0);
        feed(&mut rearmed, 0.0, 30, 2.0);

        // Offset moves to 2.05 across a streak of backward jumps
        let mut t = start;
        for _ in 0..DEFAULT_DISCONTINUITY_STREAK {
            t -= 100.0;
            rearmed.update(t, t + 2.05);
        }
        assert!(rearmed.is_converging());

        let mut regular = start;
        for _ in 0..DEFAULT_DISCONTINUITY_STREAK + 10 {
            tracking.update(regular, regular + 2.05);
            regular += 1.0 / 60.0;
        }
        for _ in 0..10 {
            t += 1.0 / 60.0;
            let before = rearmed.estimated_offset().unwrap();
            rearmed.update(t, t + 2.05);
            let after = rearmed.estimated_offset().unwrap();
            assert!((after - before).abs() <= 0.01 + 1e-12);
        }

        assert!((rearmed.estimated_offset().unwrap() - 2.05).abs() < 1e-9);
        assert!(!rearmed.is_converging());
        assert!((tracking.estimated_offset().unwrap() - 2.05).abs() > 1e-3);
    }

    #[test]
    fn test_non_finite_samples_rejected() {
        let mut estimator = ClockOffsetEstimator::default();
        let t = feed(&mut estimator, 0.0, 10, 2.0);
        let before = estimator.estimated_offset();

        assert_eq!(estimator.update(f64::NAN, t), OffsetUpdate::Rejected);
        assert_eq!(estimator.update(t, f64::INFINITY), OffsetUpdate::Rejected);
        assert_eq!(estimator.estimated_offset(), before);

        feed(&mut estimator, t, 100, 2.0);
        let offset = estimator.estimated_offset().unwrap();
        assert!(offset.is_finite());
        assert!((offset - 2.0).abs() < 1e-9);
        assert!(estimator.mean_interval().unwrap().is_finite());
    }

    #[test]
    fn test_rejected_sample_before_seed() {
        let mut estimator = ClockOffsetEstimator::default();

        assert_eq!(estimator.update(f64::NAN, 1.0), OffsetUpdate::Rejected);
        assert_eq!(estimator.estimated_offset(), None);
        assert_eq!(estimator.update(1.0, 3.0), OffsetUpdate::Seeded);
    }

    #[test]
    fn test_interval_history_is_bounded() {
        let config = EstimatorConfig {
            interval_history: 4,
            ..Default::default()
        };
        let mut estimator = ClockOffsetEstimator::new(config);
        for i in 0..10 {
            estimator.update(i as f64, i as f64);
        }

        assert!((estimator.mean_interval().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(estimator.intervals.len(), 4);
    }

    #[test]
    fn test_reset() {
        let mut estimator = ClockOffsetEstimator::default();
        estimator.update(1.0, 3.0);
        estimator.reset();

        assert_eq!(estimator.estimated_offset(), None);
        assert_eq!(estimator.mean_interval(), None);
        assert_eq!(estimator.update(1.0, 4.0), OffsetUpdate::Seeded);
    }
}
