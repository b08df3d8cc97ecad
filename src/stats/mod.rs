//! Statistics

pub mod metrics;

pub use metrics::{BufferHealth, BufferStats, ClientStats, QueueHealth, QueueStats};
