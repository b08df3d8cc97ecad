//! Source collection implementation
//!
//! The authoritative store of sources and subjects. Both maps are guarded by
//! their own `RwLock`; when both are needed the source lock is taken first.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::entry::{SourceEntry, SubjectEntry};
use super::error::RegistryError;
use super::key::{SourceId, SubjectKey, SubjectName};
use crate::client::Source;

thread_local! {
    /// Depth of registry visitors running on this thread
    static VISITING: Cell<u32> = const { Cell::new(0) };
}

/// Marks the current thread as inside a visitor for its lifetime
struct VisitGuard;

impl VisitGuard {
    fn enter() -> Self {
        VISITING.with(|v| v.set(v.get() + 1));
        VisitGuard
    }
}

impl Drop for VisitGuard {
    fn drop(&mut self) {
        VISITING.with(|v| v.set(v.get().saturating_sub(1)));
    }
}

/// Rejects access from inside a visitor callback
///
/// Panics in debug builds. Release builds log and let the caller skip the
/// operation.
fn check_reentry(operation: &'static str) -> Result<(), RegistryError> {
    if VISITING.with(|v| v.get()) == 0 {
        return Ok(());
    }
    debug_assert!(false, "registry re-entered from a visitor ({})", operation);
    tracing::error!(operation = operation, "Registry re-entered from a visitor, ignoring");
    Err(RegistryError::ReentrantAccess)
}

#[derive(Default)]
struct SourceTable {
    entries: IndexMap<SourceId, SourceEntry>,
    virtual_by_name: HashMap<String, SourceId>,
}

/// What a call to [`SourceCollection::remove_pending_kill`] removed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Removed {
    pub sources: Vec<SourceId>,
    pub subjects: Vec<SubjectKey>,
}

impl Removed {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.subjects.is_empty()
    }
}

/// Registry of sources and subjects
///
/// Insertion order is preserved; it decides which subject wins when several
/// enabled subjects share a name.
#[derive(Default)]
pub struct SourceCollection {
    sources: RwLock<SourceTable>,
    subjects: RwLock<IndexMap<SubjectKey, SubjectEntry>>,
}

impl SourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source
    pub fn add_source(&self, entry: SourceEntry) -> Result<(), RegistryError> {
        check_reentry("add_source")?;
        let mut sources = self.sources.write();

        if sources.entries.contains_key(&entry.id) {
            return Err(RegistryError::SourceAlreadyExists(entry.id));
        }
        if let Some(name) = entry.virtual_name() {
            if sources.virtual_by_name.contains_key(name) {
                return Err(RegistryError::VirtualSourceNameTaken(name.to_string()));
            }
            sources.virtual_by_name.insert(name.to_string(), entry.id);
        }

        tracing::info!(
            source = %entry.id,
            settings_class = %entry.settings.settings_class,
            "Source registered"
        );
        sources.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Register a subject
    ///
    /// A subject already under this key is replaced only if it is pending
    /// kill.
    pub fn add_subject(&self, entry: SubjectEntry) -> Result<(), RegistryError> {
        check_reentry("add_subject")?;
        let sources = self.sources.read();
        let source = sources
            .entries
            .get(&entry.key.source)
            .ok_or(RegistryError::SourceNotFound(entry.key.source))?;
        if source.pending_kill {
            return Err(RegistryError::SourcePendingKill(source.id));
        }

        let mut subjects = self.subjects.write();
        if let Some(existing) = subjects.get(&entry.key) {
            if !existing.pending_kill {
                return Err(RegistryError::SubjectAlreadyExists(entry.key.clone()));
            }
            // Drop the old one so the replacement takes the newest position
            subjects.shift_remove(&entry.key);
        }

        tracing::info!(
            subject = %entry.key,
            enabled = entry.enabled,
            virtual_subject = entry.is_virtual(),
            "Subject registered"
        );
        subjects.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Remove a subject immediately, returning it
    ///
    /// Only the consumer thread does this; other callers flag the subject
    /// with [`mark_subject_pending_kill`](Self::mark_subject_pending_kill).
    pub fn take_subject(&self, key: &SubjectKey) -> Option<SubjectEntry> {
        check_reentry("take_subject").ok()?;
        self.subjects.write().shift_remove(key)
    }

    /// Flag a source and its subjects for removal at the next tick
    pub fn mark_source_pending_kill(&self, id: SourceId) -> Result<(), RegistryError> {
        check_reentry("mark_source_pending_kill")?;
        let mut sources = self.sources.write();
        let source = sources
            .entries
            .get_mut(&id)
            .ok_or(RegistryError::SourceNotFound(id))?;
        source.pending_kill = true;

        let mut subjects = self.subjects.write();
        for subject in subjects.values_mut().filter(|s| s.key.source == id) {
            subject.pending_kill = true;
        }

        tracing::debug!(source = %id, "Source marked for removal");
        Ok(())
    }

    /// Flag a subject for removal at the next tick
    pub fn mark_subject_pending_kill(&self, key: &SubjectKey) -> Result<(), RegistryError> {
        check_reentry("mark_subject_pending_kill")?;
        let mut subjects = self.subjects.write();
        let subject = subjects
            .get_mut(key)
            .ok_or_else(|| RegistryError::SubjectNotFound(key.clone()))?;
        subject.pending_kill = true;

        tracing::debug!(subject = %key, "Subject marked for removal");
        Ok(())
    }

    /// Destroy flagged subjects, and flagged sources that agree to shut down
    ///
    /// Sources are asked through [`Source::request_source_shutdown`] without
    /// any registry lock held. A source that declines stays flagged and is
    /// asked again next time.
    pub fn remove_pending_kill(&self) -> Removed {
        if check_reentry("remove_pending_kill").is_err() {
            return Removed::default();
        }

        let flagged: Vec<(SourceId, Arc<dyn Source>)> = self
            .sources
            .read()
            .entries
            .values()
            .filter(|s| s.pending_kill)
            .map(|s| (s.id, Arc::clone(&s.source)))
            .collect();

        let ready: Vec<SourceId> = flagged
            .into_iter()
            .filter(|(_, source)| source.request_source_shutdown())
            .map(|(id, _)| id)
            .collect();

        let mut removed = Removed::default();

        let mut sources = self.sources.write();
        for id in ready {
            if let Some(entry) = sources.entries.shift_remove(&id) {
                if let Some(name) = entry.virtual_name() {
                    sources.virtual_by_name.remove(name);
                }
                tracing::info!(source = %id, "Source removed");
                removed.sources.push(id);
            }
        }

        let mut subjects = self.subjects.write();
        subjects.retain(|key, subject| {
            let orphaned = !sources.entries.contains_key(&key.source);
            if subject.pending_kill || orphaned {
                tracing::info!(subject = %key, "Subject removed");
                removed.subjects.push(key.clone());
                false
            } else {
                true
            }
        });

        removed
    }

    /// Visit every source with the source lock held
    ///
    /// The callback must not call back into the collection.
    pub fn for_each_source<F>(&self, mut f: F)
    where
        F: FnMut(&SourceEntry),
    {
        if check_reentry("for_each_source").is_err() {
            return;
        }
        let sources = self.sources.read();
        let _guard = VisitGuard::enter();
        for entry in sources.entries.values() {
            f(entry);
        }
    }

    /// Visit every subject with the subject lock held for reading
    pub fn for_each_subject<F>(&self, mut f: F)
    where
        F: FnMut(&SubjectEntry),
    {
        if check_reentry("for_each_subject").is_err() {
            return;
        }
        let subjects = self.subjects.read();
        let _guard = VisitGuard::enter();
        for entry in subjects.values() {
            f(entry);
        }
    }

    /// Visit every subject with the subject lock held for writing
    pub fn for_each_subject_mut<F>(&self, mut f: F)
    where
        F: FnMut(&mut SubjectEntry),
    {
        if check_reentry("for_each_subject_mut").is_err() {
            return;
        }
        let mut subjects = self.subjects.write();
        let _guard = VisitGuard::enter();
        for entry in subjects.values_mut() {
            f(entry);
        }
    }

    pub fn with_source<R>(&self, id: SourceId, f: impl FnOnce(&SourceEntry) -> R) -> Option<R> {
        check_reentry("with_source").ok()?;
        let sources = self.sources.read();
        let entry = sources.entries.get(&id)?;
        let _guard = VisitGuard::enter();
        Some(f(entry))
    }

    pub fn with_source_mut<R>(
        &self,
        id: SourceId,
        f: impl FnOnce(&mut SourceEntry) -> R,
    ) -> Option<R> {
        check_reentry("with_source_mut").ok()?;
        let mut sources = self.sources.write();
        let entry = sources.entries.get_mut(&id)?;
        let _guard = VisitGuard::enter();
        Some(f(entry))
    }

    pub fn with_subject<R>(&self, key: &SubjectKey, f: impl FnOnce(&SubjectEntry) -> R) -> Option<R> {
        check_reentry("with_subject").ok()?;
        let subjects = self.subjects.read();
        let entry = subjects.get(key)?;
        let _guard = VisitGuard::enter();
        Some(f(entry))
    }

    pub fn with_subject_mut<R>(
        &self,
        key: &SubjectKey,
        f: impl FnOnce(&mut SubjectEntry) -> R,
    ) -> Option<R> {
        check_reentry("with_subject_mut").ok()?;
        let mut subjects = self.subjects.write();
        let entry = subjects.get_mut(key)?;
        let _guard = VisitGuard::enter();
        Some(f(entry))
    }

    /// First-registered enabled subject with this name
    pub fn find_enabled_subject_key(&self, name: &SubjectName) -> Option<SubjectKey> {
        check_reentry("find_enabled_subject_key").ok()?;
        self.subjects
            .read()
            .values()
            .find(|s| s.is_active() && &s.key.name == name)
            .map(|s| s.key.clone())
    }

    /// Enable or disable a subject
    ///
    /// Enabling a subject disables every other subject with the same name.
    pub fn set_subject_enabled(&self, key: &SubjectKey, enabled: bool) -> Result<(), RegistryError> {
        check_reentry("set_subject_enabled")?;
        let mut subjects = self.subjects.write();
        if !subjects.contains_key(key) {
            return Err(RegistryError::SubjectNotFound(key.clone()));
        }

        if enabled {
            for other in subjects
                .values_mut()
                .filter(|s| s.key.name == key.name && &s.key != key && s.enabled)
            {
                other.enabled = false;
                tracing::debug!(subject = %other.key, "Subject disabled by another with the same name");
            }
        }
        if let Some(subject) = subjects.get_mut(key) {
            subject.enabled = enabled;
        }
        Ok(())
    }

    /// Enabled subject keys, at most one per name, first-registered first
    pub fn enabled_subjects(&self) -> IndexMap<SubjectName, SubjectKey> {
        let mut enabled = IndexMap::new();
        if check_reentry("enabled_subjects").is_err() {
            return enabled;
        }
        for subject in self.subjects.read().values().filter(|s| s.is_active()) {
            enabled
                .entry(subject.key.name.clone())
                .or_insert_with(|| subject.key.clone());
        }
        enabled
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        if check_reentry("source_ids").is_err() {
            return Vec::new();
        }
        self.sources.read().entries.keys().copied().collect()
    }

    pub fn subject_keys(&self) -> Vec<SubjectKey> {
        if check_reentry("subject_keys").is_err() {
            return Vec::new();
        }
        self.subjects.read().keys().cloned().collect()
    }

    /// Producer adapters of sources that are not pending kill
    pub fn live_sources(&self) -> Vec<(SourceId, Arc<dyn Source>)> {
        if check_reentry("live_sources").is_err() {
            return Vec::new();
        }
        self.sources
            .read()
            .entries
            .values()
            .filter(|s| !s.pending_kill)
            .map(|s| (s.id, Arc::clone(&s.source)))
            .collect()
    }

    pub fn virtual_source_by_name(&self, name: &str) -> Option<SourceId> {
        check_reentry("virtual_source_by_name").ok()?;
        self.sources.read().virtual_by_name.get(name).copied()
    }

    pub fn contains_source(&self, id: SourceId) -> bool {
        self.with_source(id, |_| ()).is_some()
    }

    pub fn contains_subject(&self, key: &SubjectKey) -> bool {
        self.with_subject(key, |_| ()).is_some()
    }

    pub fn source_count(&self) -> usize {
        self.sources.read().entries.len()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.read().len()
    }

    /// Number of sources other than the default virtual source
    pub fn non_default_source_count(&self) -> usize {
        self.sources
            .read()
            .entries
            .keys()
            .filter(|id| **id != SourceId::DEFAULT_VIRTUAL)
            .count()
    }

    /// Drop every source and subject without asking sources to shut down
    pub fn clear(&self) {
        if check_reentry("clear").is_err() {
            return;
        }
        let mut sources = self.sources.write();
        let mut subjects = self.subjects.write();
        subjects.clear();
        sources.entries.clear();
        sources.virtual_by_name.clear();
    }
}
