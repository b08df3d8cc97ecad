//! Real-time subject data hub
//!
//! Producers ("sources") push schema-described samples for named subjects
//! from any thread. A single consumer ticks the hub once per frame; each tick
//! applies the pending data, buffers it per subject and picks the frame every
//! subject should present, aligned to the consumer's wall clock or scene time.
//!
//! # Data flow
//!
//! ```text
//!  Source threads                Consumer thread
//!  ──────────────                ───────────────
//!  push_static ─┐
//!               ├─► IngestionQueue ──tick──► SourceCollection
//!  push_frame ──┘      (bounded)              ├─ SourceEntry (timing, settings)
//!                                             └─ SubjectEntry
//!                                                 ├─ LiveSubject ─► FrameBuffer
//!                                                 └─ VirtualSubjectHost
//!                                                          │
//!                          evaluate_frame / evaluate ◄─────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use linkhub::{Client, ClientConfig, ClientHandle, FrameData, Role, Source, SourceId, StaticData, SubjectKey};
//!
//! struct Camera;
//!
//! impl Source for Camera {
//!     fn receive_client(&self, client: ClientHandle, source_id: SourceId) {
//!         let key = SubjectKey::new(source_id, "Camera");
//!         std::thread::spawn(move || {
//!             client.push_subject_static_data(
//!                 key.clone(),
//!                 Role::basic(),
//!                 StaticData::with_properties(["focal_length"]),
//!             );
//!             client.push_subject_frame_data(key, FrameData::new(0.0).with_properties(vec![35.0]));
//!         });
//!     }
//!
//!     fn is_source_still_valid(&self) -> bool {
//!         true
//!     }
//!
//!     fn request_source_shutdown(&self) -> bool {
//!         true
//!     }
//!
//!     fn source_type(&self) -> String {
//!         "camera".into()
//!     }
//!
//!     fn source_status(&self) -> String {
//!         "streaming".into()
//!     }
//! }
//!
//! let client = Client::new(ClientConfig::from_env());
//! client.add_source(std::sync::Arc::new(Camera))?;
//!
//! client.tick();
//! if let Some(data) = client.evaluate_frame("Camera", &Role::basic()) {
//!     println!("{:?}", data.frame.property_values);
//! }
//! # Ok::<(), linkhub::Error>(())
//! ```

pub mod buffer;
pub mod client;
pub mod data;
pub mod error;
pub mod ingest;
pub mod log;
pub mod registry;
pub mod stats;
pub mod subject;
pub mod time;
pub mod timing;

pub use client::{
    Client, ClientConfig, ClientEvent, ClientHandle, Rebroadcaster, Source, SourceFactory,
    SourcePreset, SubjectPreset, VirtualSubjectSource,
};
pub use data::{FrameData, FrameId, Role, RoleSchema, StaticData, SubjectFrameData};
pub use error::{DataError, Error, PresetError, Result};
pub use ingest::{DataView, ListenerHandle, SubscriptionTarget};
pub use registry::{RegistryError, SourceId, SubjectKey, SubjectName};
pub use subject::{
    EvaluationMode, EvaluationRequest, SamplingMode, SourceSettings, SubjectSettings,
    SubjectState, VirtualSubject,
};
pub use time::{Clock, FrameRate, FrameTime, ManualClock, QualifiedFrameTime, SystemClock, Timecode};
