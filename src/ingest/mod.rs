//! Producer-side ingestion
//!
//! Pushes are accepted from any thread and staged in an [`IngestionQueue`]
//! until the consumer's next tick applies them to the registry.

pub mod listeners;
pub mod queue;

pub use listeners::{
    AddedListeners, DataView, FrameListener, ListenerHandle, RawFrameListener,
    ReceivedListeners, StaticListener, SubscriptionTarget,
};
pub use queue::{
    Drained, IngestionQueue, PendingFrame, PendingStatic, DEFAULT_MAX_PENDING_FRAMES,
    DEFAULT_MAX_PENDING_STATIC,
};
