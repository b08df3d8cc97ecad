//! Source and subject registry
//!
//! The registry exclusively owns every source and subject. Producers only
//! hold ids and keys; all mutation funnels through the client.
//!
//! # Architecture
//!
//! ```text
//!                        SourceCollection
//!              ┌──────────────────────────────────┐
//!              │ sources: RwLock<                 │
//!              │   IndexMap<SourceId, SourceEntry │
//!              │     { source, settings, timing }>│
//!              │   virtual_by_name                │
//!              │ >                                │
//!              │ subjects: RwLock<                │
//!              │   IndexMap<SubjectKey,           │
//!              │     SubjectEntry { subject }>    │
//!              │ >                                │
//!              └────────────────┬─────────────────┘
//!                               │
//!        ┌──────────────────────┼──────────────────────┐
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//!   [tick: drain]        [tick: pending kill]    [evaluate]
//!   with_subject_mut()   remove_pending_kill()   with_subject()
//! ```
//!
//! # Deferred removal
//!
//! Removal is requested from any thread by flagging an entry pending kill.
//! Entries are destroyed only inside `tick`, on the consumer thread.

pub mod entry;
pub mod error;
pub mod key;
pub mod store;

pub use entry::{SourceEntry, SubjectEntry};
pub use error::RegistryError;
pub use key::{SourceId, SubjectKey, SubjectName};
pub use store::{Removed, SourceCollection};
