//! Producer/consumer clock alignment

pub mod offset;
pub mod source;

pub use offset::{
    ClockOffsetEstimator, EstimatorConfig, OffsetUpdate, DEFAULT_CORRECTION_STEP,
    DEFAULT_DISCONTINUITY_STREAK, DEFAULT_INTERVAL_HISTORY,
};
pub use source::SourceTiming;
