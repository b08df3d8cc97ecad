//! Sample storage for subjects

pub mod frame_buffer;

pub use frame_buffer::{Bracket, FrameBuffer, Sample, SampleTime, DEFAULT_CAPACITY};
