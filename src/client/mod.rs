//! Client API
//!
//! Provides the consumer-facing hub:
//! - Registering sources and virtual subjects
//! - Ticking, evaluation and listener registration
//! - Presets, rebroadcast and lifecycle events

pub mod client;
pub mod config;
pub mod events;
pub mod handle;
pub mod preset;
pub mod rebroadcast;
pub mod source;

pub use client::{Client, DEFAULT_VIRTUAL_SOURCE_NAME};
pub use config::ClientConfig;
pub use events::{ClientEvent, EventBus};
pub use handle::ClientHandle;
pub use preset::{SourcePreset, SubjectPreset};
pub use rebroadcast::{annotations_for, Annotations, Rebroadcaster, SOURCE_ANNOTATION, SUBJECT_ANNOTATION};
pub use source::{Source, SourceFactory, VirtualSubjectSource};
