//! Subject state machine and evaluation requests

use std::fmt;

use crate::time::QualifiedFrameTime;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    /// New frames are evaluated
    #[default]
    Live,
    /// Evaluation holds the snapshot taken at pause time
    Paused,
}

/// Advisory status reported for a subject
///
/// Evaluation never depends on this; it still returns the best available
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectState {
    /// Frames arrived within the staleness threshold
    Connected,
    /// Frames stopped arriving
    Unresponsive,
    /// The source reports it is no longer valid
    Disconnected,
    /// Unknown, disabled, or without data
    InvalidOrDisabled,
    /// Held by an explicit pause
    Paused,
}

impl SubjectState {
    /// Classify connectivity from the last arrival time
    pub fn from_arrival(last_arrival: Option<f64>, now: f64, staleness: f64) -> Self {
        match last_arrival {
            None => SubjectState::InvalidOrDisabled,
            Some(at) if now - at <= staleness => SubjectState::Connected,
            Some(_) => SubjectState::Unresponsive,
        }
    }
}

impl fmt::Display for SubjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubjectState::Connected => "connected",
            SubjectState::Unresponsive => "unresponsive",
            SubjectState::Disconnected => "disconnected",
            SubjectState::InvalidOrDisabled => "invalid",
            SubjectState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// What time an evaluation should resolve
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvaluationRequest {
    /// Most recently appended sample
    Latest,
    /// Consumer world time in seconds
    AtWorldTime(f64),
    /// Scene time coordinate
    AtSceneTime(QualifiedFrameTime),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_arrival() {
        assert_eq!(
            SubjectState::from_arrival(None, 10.0, 0.5),
            SubjectState::InvalidOrDisabled
        );
        assert_eq!(
            SubjectState::from_arrival(Some(9.6), 10.0, 0.5),
            SubjectState::Connected
        );
        assert_eq!(
            SubjectState::from_arrival(Some(9.0), 10.0, 0.5),
            SubjectState::Unresponsive
        );
    }

    #[test]
    fn test_default_play_state() {
        assert_eq!(PlayState::default(), PlayState::Live);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SubjectState::Paused.to_string(), "paused");
        assert_eq!(SubjectState::Unresponsive.to_string(), "unresponsive");
    }
}
