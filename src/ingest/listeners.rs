//! Data listeners
//!
//! Two kinds of observers exist. "Received" listeners are keyed by subject
//! key and run on the producer thread, before data is queued. "Added"
//! listeners are keyed by a [`SubscriptionTarget`] and run on the consumer
//! thread while the queue is drained.
//!
//! Callbacks are cloned out under the lock and invoked after it is released,
//! so a callback may register or remove listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::data::{FrameData, Role, StaticData};
use crate::registry::{SubjectKey, SubjectName};

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

/// Callback for static data: subject, role, data
pub type StaticListener = Arc<dyn Fn(&SubjectKey, &Role, &StaticData) + Send + Sync>;

/// Callback for frame data: subject, role, frame
pub type FrameListener = Arc<dyn Fn(&SubjectKey, &Role, &FrameData) + Send + Sync>;

/// Callback for frames before they are queued: subject, frame
pub type RawFrameListener = Arc<dyn Fn(&SubjectKey, &FrameData) + Send + Sync>;

/// Identifies a registration for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    fn next() -> Self {
        ListenerHandle(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which subjects an added-listener observes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionTarget {
    /// Every subject with this name, on any source
    Subject(SubjectName),
    /// Every subject
    AllSubjects,
}

impl SubscriptionTarget {
    fn matches(&self, key: &SubjectKey) -> bool {
        match self {
            SubscriptionTarget::Subject(name) => &key.name == name,
            SubscriptionTarget::AllSubjects => true,
        }
    }
}

/// Whether a listener sees data before or after the subject's remapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataView {
    #[default]
    Remapped,
    Unmapped,
}

struct RawRegistration {
    handle: ListenerHandle,
    on_static: Option<StaticListener>,
    on_frame: Option<RawFrameListener>,
}

/// Listeners invoked on the producer thread as data is pushed
#[derive(Default)]
pub struct ReceivedListeners {
    by_key: RwLock<HashMap<SubjectKey, Vec<RawRegistration>>>,
}

impl ReceivedListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        key: SubjectKey,
        on_static: Option<StaticListener>,
        on_frame: Option<RawFrameListener>,
    ) -> ListenerHandle {
        let handle = ListenerHandle::next();
        self.by_key
            .write()
            .entry(key)
            .or_default()
            .push(RawRegistration {
                handle,
                on_static,
                on_frame,
            });
        handle
    }

    /// Returns false if the handle was not registered for `key`
    pub fn unregister(&self, key: &SubjectKey, handle: ListenerHandle) -> bool {
        let mut by_key = self.by_key.write();
        let Some(list) = by_key.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.handle != handle);
        let removed = list.len() != before;
        if list.is_empty() {
            by_key.remove(key);
        }
        removed
    }

    pub fn notify_static(&self, key: &SubjectKey, role: &Role, static_data: &StaticData) {
        let callbacks: Vec<StaticListener> = match self.by_key.read().get(key) {
            Some(list) => list.iter().filter_map(|r| r.on_static.clone()).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(key, role, static_data);
        }
    }

    pub fn notify_frame(&self, key: &SubjectKey, frame: &FrameData) {
        let callbacks: Vec<RawFrameListener> = match self.by_key.read().get(key) {
            Some(list) => list.iter().filter_map(|r| r.on_frame.clone()).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(key, frame);
        }
    }

    /// Drop every registration for one subject
    pub fn remove_subject(&self, key: &SubjectKey) {
        self.by_key.write().remove(key);
    }
}

struct AddedRegistration {
    handle: ListenerHandle,
    target: SubscriptionTarget,
    view: DataView,
    on_static: Option<StaticListener>,
    on_frame: Option<FrameListener>,
}

/// Listeners invoked on the consumer thread as data enters a subject
#[derive(Default)]
pub struct AddedListeners {
    registrations: RwLock<Vec<AddedRegistration>>,
}

impl AddedListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        target: SubscriptionTarget,
        view: DataView,
        on_static: Option<StaticListener>,
        on_frame: Option<FrameListener>,
    ) -> ListenerHandle {
        let handle = ListenerHandle::next();
        self.registrations.write().push(AddedRegistration {
            handle,
            target,
            view,
            on_static,
            on_frame,
        });
        handle
    }

    /// Returns false if the handle was not registered
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.handle != handle);
        registrations.len() != before
    }

    /// Whether any frame listener wants the given view of this subject
    pub fn wants_frames(&self, key: &SubjectKey, view: DataView) -> bool {
        self.registrations
            .read()
            .iter()
            .any(|r| r.view == view && r.on_frame.is_some() && r.target.matches(key))
    }

    pub fn notify_static(
        &self,
        key: &SubjectKey,
        view: DataView,
        role: &Role,
        static_data: &StaticData,
    ) {
        let callbacks: Vec<StaticListener> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.view == view && r.target.matches(key))
            .filter_map(|r| r.on_static.clone())
            .collect();
        for callback in callbacks {
            callback(key, role, static_data);
        }
    }

    pub fn notify_frame(&self, key: &SubjectKey, view: DataView, role: &Role, frame: &FrameData) {
        let callbacks: Vec<FrameListener> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.view == view && r.target.matches(key))
            .filter_map(|r| r.on_frame.clone())
            .collect();
        for callback in callbacks {
            callback(key, role, frame);
        }
    }
}
