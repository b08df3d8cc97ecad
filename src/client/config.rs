//! Client configuration

use std::str::FromStr;
use std::time::Duration;

use crate::ingest::{DEFAULT_MAX_PENDING_FRAMES, DEFAULT_MAX_PENDING_STATIC};
use crate::timing::{
    EstimatorConfig, DEFAULT_CORRECTION_STEP, DEFAULT_DISCONTINUITY_STREAK,
    DEFAULT_INTERVAL_HISTORY,
};

/// Client configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Pending static entries kept between ticks before the oldest are dropped
    pub max_pending_static: usize,

    /// Pending frames kept between ticks before the oldest are dropped
    pub max_pending_frames: usize,

    /// How long shutdown waits for sources to stop
    pub shutdown_timeout: Duration,

    /// Time without frames after which a subject is unresponsive
    pub staleness_threshold: Duration,

    /// Largest change applied to a clock offset estimate per sample, in seconds
    pub clock_correction_step: f64,

    /// Producer intervals tracked for discontinuity detection
    pub offset_interval_history: usize,

    /// Consecutive anomalous intervals that switch an estimate to converging
    pub discontinuity_streak: u32,

    /// Rebroadcast the evaluated snapshot instead of the latest raw frame
    pub transmit_evaluated_data: bool,

    /// Run pre-processors on rebroadcast frames
    pub preprocess_rebroadcast: bool,

    /// Translate rebroadcast frames to the subject's rebroadcast role
    pub translate_rebroadcast: bool,

    /// Capacity of the client event channel
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_pending_static: DEFAULT_MAX_PENDING_STATIC,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            shutdown_timeout: Duration::from_secs(2),
            staleness_threshold: Duration::from_millis(500),
            clock_correction_step: DEFAULT_CORRECTION_STEP,
            offset_interval_history: DEFAULT_INTERVAL_HISTORY,
            discontinuity_streak: DEFAULT_DISCONTINUITY_STREAK,
            transmit_evaluated_data: false,
            preprocess_rebroadcast: false,
            translate_rebroadcast: false,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `LINKHUB_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse(&lookup, "LINKHUB_MAX_PENDING_STATIC") {
            config.max_pending_static = v;
        }
        if let Some(v) = parse(&lookup, "LINKHUB_MAX_PENDING_FRAMES") {
            config.max_pending_frames = v;
        }
        if let Some(v) = parse_seconds(&lookup, "LINKHUB_SHUTDOWN_TIMEOUT") {
            config.shutdown_timeout = v;
        }
        if let Some(v) = parse_seconds(&lookup, "LINKHUB_STALENESS_THRESHOLD") {
            config.staleness_threshold = v;
        }
        if let Some(v) = parse::<f64, _>(&lookup, "LINKHUB_CLOCK_CORRECTION_STEP") {
            if v.is_finite() && v >= 0.0 {
                config.clock_correction_step = v;
            } else {
                tracing::warn!(value = v, "LINKHUB_CLOCK_CORRECTION_STEP out of range, ignoring");
            }
        }

        config
    }

    /// Set the pending static ceiling
    pub fn max_pending_static(mut self, max: usize) -> Self {
        self.max_pending_static = max.max(1);
        self
    }

    /// Set the pending frame ceiling
    pub fn max_pending_frames(mut self, max: usize) -> Self {
        self.max_pending_frames = max.max(1);
        self
    }

    /// Set shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the staleness threshold
    pub fn staleness_threshold(mut self, threshold: Duration) -> Self {
        self.staleness_threshold = threshold;
        self
    }

    /// Set the clock correction step
    pub fn clock_correction_step(mut self, step: f64) -> Self {
        self.clock_correction_step = step.max(0.0);
        self
    }

    /// Rebroadcast evaluated snapshots instead of raw frames
    pub fn transmit_evaluated_data(mut self, enabled: bool) -> Self {
        self.transmit_evaluated_data = enabled;
        self
    }

    /// Set event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Offset estimator settings derived from this config
    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            correction_step: self.clock_correction_step,
            interval_history: self.offset_interval_history,
            discontinuity_streak: self.discontinuity_streak,
        }
    }
}

fn parse<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Unparseable config value, using default");
            None
        }
    }
}

fn parse_seconds<F>(lookup: &F, name: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let seconds: f64 = parse(lookup, name)?;
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) => Some(duration),
        Err(_) => {
            tracing::warn!(variable = name, value = seconds, "Invalid duration, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.max_pending_static, 256);
        assert_eq!(config.max_pending_frames, 2048);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.staleness_threshold, Duration::from_millis(500));
        assert_eq!(config.clock_correction_step, 1e-4);
        assert!(!config.transmit_evaluated_data);
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("LINKHUB_MAX_PENDING_STATIC", "16"),
            ("LINKHUB_MAX_PENDING_FRAMES", " 64 "),
            ("LINKHUB_SHUTDOWN_TIMEOUT", "0.25"),
            ("LINKHUB_STALENESS_THRESHOLD", "1.5"),
            ("LINKHUB_CLOCK_CORRECTION_STEP", "0.001"),
        ]));

        assert_eq!(config.max_pending_static, 16);
        assert_eq!(config.max_pending_frames, 64);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
        assert_eq!(config.staleness_threshold, Duration::from_millis(1500));
        assert_eq!(config.clock_correction_step, 0.001);
    }

    #[test]
    fn test_from_lookup_ignores_bad_values() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("LINKHUB_MAX_PENDING_FRAMES", "lots"),
            ("LINKHUB_SHUTDOWN_TIMEOUT", "-3"),
            ("LINKHUB_CLOCK_CORRECTION_STEP", "NaN"),
        ]));

        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_builder_chaining() {
        let config = ClientConfig::default()
            .max_pending_static(8)
            .max_pending_frames(0)
            .shutdown_timeout(Duration::from_millis(10))
            .staleness_threshold(Duration::from_secs(1))
            .clock_correction_step(-1.0)
            .transmit_evaluated_data(true)
            .event_capacity(16);

        assert_eq!(config.max_pending_static, 8);
        assert_eq!(config.max_pending_frames, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(10));
        assert_eq!(config.staleness_threshold, Duration::from_secs(1));
        assert_eq!(config.clock_correction_step, 0.0);
        assert!(config.transmit_evaluated_data);
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_estimator_config() {
        let estimator = ClientConfig::default().clock_correction_step(0.01).estimator();

        assert_eq!(estimator.correction_step, 0.01);
        assert_eq!(estimator.interval_history, DEFAULT_INTERVAL_HISTORY);
        assert_eq!(estimator.discontinuity_streak, DEFAULT_DISCONTINUITY_STREAK);
    }
}
