// ── Typed entity collection ──
//
// One reader/writer-locked map per entity kind, plus a `watch` snapshot
// for push-based change notification. Writers batch their changes under a
// single writer lock and publish one snapshot when the batch ends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use tokio::sync::watch;
use uuid::Uuid;

use crate::model::Entity;
use crate::stream::Snapshot;

pub(crate) struct TypedCollection<T: Entity> {
    /// Primary storage: row uuid -> entity.
    by_uuid: RwLock<HashMap<Uuid, Arc<T>>>,

    /// Name-ordered snapshot, rebuilt at the end of every changing batch.
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<T: Entity> TypedCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_uuid: RwLock::new(HashMap::new()),
            snapshot,
        }
    }

    /// Take the writer lock for a batch of changes. The lock is released
    /// and the snapshot published when the returned batch is dropped.
    pub(crate) fn batch(&self) -> CollectionBatch<'_, T> {
        CollectionBatch {
            entries: self.by_uuid.write(),
            snapshot: &self.snapshot,
            changed: false,
        }
    }

    pub(crate) fn get(&self, uuid: &Uuid) -> Option<Arc<T>> {
        self.by_uuid.read().get(uuid).cloned()
    }

    /// Linear scan for the first entity with the given name.
    pub(crate) fn by_name(&self, name: &str) -> Option<Arc<T>> {
        self.by_uuid
            .read()
            .values()
            .find(|entity| entity.name() == name)
            .cloned()
    }

    /// Resolve references in order, skipping any that are not cached.
    pub(crate) fn resolve(&self, refs: &[Uuid]) -> Vec<Arc<T>> {
        let entries = self.by_uuid.read();
        refs.iter().filter_map(|id| entries.get(id).cloned()).collect()
    }

    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_uuid.read().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_uuid.read().is_empty()
    }
}

/// Exclusive write access to a [`TypedCollection`].
pub(crate) struct CollectionBatch<'a, T: Entity> {
    entries: RwLockWriteGuard<'a, HashMap<Uuid, Arc<T>>>,
    snapshot: &'a watch::Sender<Snapshot<T>>,
    changed: bool,
}

impl<T: Entity> CollectionBatch<'_, T> {
    /// Replace the entity at its uuid wholesale.
    pub(crate) fn upsert(&mut self, entity: T) {
        self.entries.insert(entity.uuid(), Arc::new(entity));
        self.changed = true;
    }

    /// Returns `true` if an entity was evicted.
    pub(crate) fn remove(&mut self, uuid: &Uuid) -> bool {
        let removed = self.entries.remove(uuid).is_some();
        self.changed |= removed;
        removed
    }
}

impl<T: Entity> Drop for CollectionBatch<'_, T> {
    fn drop(&mut self) {
        if !self.changed {
            return;
        }
        let mut values: Vec<Arc<T>> = self.entries.values().cloned().collect();
        values.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.uuid().cmp(&b.uuid())));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
