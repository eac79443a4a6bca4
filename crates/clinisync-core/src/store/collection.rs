// ── Generic reactive entity collection ──
//
// Concurrent keyed storage with push-based change notification via
// `watch` channels. Snapshots are kept sorted by the collection's
// ordering function so subscribers can render them directly.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

pub(crate) type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// A reactive collection for a single entity type.
///
/// Every mutation rebuilds the sorted snapshot that subscribers receive.
pub(crate) struct EntityCollection<T: Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    order: fn(&T, &T) -> Ordering,
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new(order: fn(&T, &T) -> Ordering) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            order,
            snapshot,
        }
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Replace the contents with `entities`: upsert every incoming item,
    /// then drop keys that were not in the batch. Publishes once.
    pub(crate) fn upsert_and_prune(&self, entities: Vec<(String, T)>) -> usize {
        let incoming: HashSet<String> = entities.iter().map(|(k, _)| k.clone()).collect();
        for (key, entity) in entities {
            self.by_key.insert(key, Arc::new(entity));
        }

        let stale: Vec<String> = self
            .by_key
            .iter()
            .filter(|r| !incoming.contains(r.key()))
            .map(|r| r.key().clone())
            .collect();
        for key in &stale {
            self.by_key.remove(key);
        }

        self.publish();
        stale.len()
    }

    /// Apply `f` to the entity at `key` if present, storing the result.
    pub(crate) fn modify(&self, key: &str, f: impl FnOnce(&T) -> T) -> bool {
        let updated = match self.by_key.get_mut(key) {
            Some(mut entry) => {
                let next = f(entry.value());
                *entry.value_mut() = Arc::new(next);
                true
            }
            None => false,
        };
        if updated {
            self.publish();
        }
        updated
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let mut values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        let order = self.order;
        values.sort_by(|a, b| order(a, b));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
