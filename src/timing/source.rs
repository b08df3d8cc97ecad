//! Per-source timing state
//!
//! Every source owns two estimators, one for world time and one for scene
//! time. Subjects of the same source share them through an `Arc`, which is
//! what makes the duplicate-stamp check work across subjects.

use parking_lot::Mutex;

use super::offset::{ClockOffsetEstimator, EstimatorConfig, OffsetUpdate};
use crate::data::{ArrivalTime, FrameData};

/// Clock alignment for one source
#[derive(Debug)]
pub struct SourceTiming {
    world: Mutex<ClockOffsetEstimator>,
    scene: Mutex<ClockOffsetEstimator>,
}

impl SourceTiming {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            world: Mutex::new(ClockOffsetEstimator::new(config)),
            scene: Mutex::new(ClockOffsetEstimator::new(config)),
        }
    }

    /// Feed a freshly stamped frame through both estimators
    ///
    /// Returns the world-time offset to apply to the frame.
    pub fn process_frame(&self, frame: &FrameData, arrival: &ArrivalTime) -> f64 {
        let offset = {
            let mut world = self.world.lock();
            world.update(frame.world_time.source_time(), arrival.world_time);
            world.estimated_offset().unwrap_or(0.0)
        };

        if let (Some(produced), Some(consumed)) = (frame.scene_time, arrival.scene_time) {
            let update = self
                .scene
                .lock()
                .update(produced.as_seconds(), consumed.as_seconds());
            if update == OffsetUpdate::Seeded {
                tracing::trace!(scene_time = %produced, "Scene offset seeded");
            }
        }

        offset
    }

    pub fn world_offset(&self) -> Option<f64> {
        self.world.lock().estimated_offset()
    }

    pub fn scene_offset(&self) -> Option<f64> {
        self.scene.lock().estimated_offset()
    }

    pub fn reset(&self) {
        self.world.lock().reset();
        self.scene.lock().reset();
    }
}

impl Default for SourceTiming {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}
