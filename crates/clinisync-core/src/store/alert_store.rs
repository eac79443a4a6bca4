// ── Alert store ──
//
// The single source of truth for the alert list. Realtime frames, REST
// snapshots, and mutation results all land here; renderers read the
// published snapshot and never hold their own copy.
//
// Order is newest-first: unknown ids go to the front, known ids are
// replaced in place. Every write is checked against the stored revision
// so a late or replayed frame can never roll an alert back.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::model::{Alert, AlertId, Revision};

/// Result of a single-alert write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// New id, placed at the front.
    Inserted,
    /// Known id, replaced at its current position.
    Replaced,
    /// Older than what the store already holds (or than its tombstone).
    Stale,
}

/// Counts from one snapshot merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub upserted: usize,
    pub pruned: usize,
    /// Fetched rows dropped because local state was newer.
    pub skipped: usize,
    /// Local rows kept despite being absent from the fetch.
    pub retained: usize,
}

/// Marks the store's write sequence when a fetch starts.
///
/// Local writes made after the ticket survive a snapshot merge even if the
/// fetched list does not contain them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

struct Tombstone {
    revision: Revision,
    seq: u64,
}

struct AlertState {
    alerts: IndexMap<AlertId, Arc<Alert>>,
    tombstones: HashMap<AlertId, Tombstone>,
    /// Sequence number of the last local write per id.
    written: HashMap<AlertId, u64>,
    seq: u64,
}

pub struct AlertStore {
    state: RwLock<AlertState>,
    capacity: usize,
    snapshot: watch::Sender<Arc<Vec<Arc<Alert>>>>,
}

impl AlertStore {
    pub fn new(capacity: usize) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            state: RwLock::new(AlertState {
                alerts: IndexMap::new(),
                tombstones: HashMap::new(),
                written: HashMap::new(),
                seq: 0,
            }),
            capacity: capacity.max(1),
            snapshot,
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Upsert one alert.
    pub fn apply_update(&self, alert: Alert) -> ApplyOutcome {
        let outcome = {
            let mut state = self.write();
            let outcome = state.upsert(alert, self.capacity);
            if outcome != ApplyOutcome::Stale {
                self.publish(&state);
            }
            outcome
        };
        trace!(?outcome, "alert update applied");
        outcome
    }

    /// Remove one alert and remember its revision.
    ///
    /// Returns `false` (and changes nothing) for an unknown id.
    pub fn apply_delete(&self, id: &AlertId) -> bool {
        let mut state = self.write();
        let Some(removed) = state.alerts.shift_remove(id) else {
            trace!(alert_id = %id, "delete for unknown alert ignored");
            return false;
        };
        let seq = state.bump(id);
        state.tombstones.insert(
            id.clone(),
            Tombstone {
                revision: removed.revision(),
                seq,
            },
        );
        self.publish(&state);
        true
    }

    /// Drop an alert that no longer matches the active filter. Unlike
    /// [`apply_delete`](Self::apply_delete) this leaves no tombstone.
    pub fn evict(&self, id: &AlertId) -> bool {
        let mut state = self.write();
        if state.alerts.shift_remove(id).is_none() {
            return false;
        }
        state.bump(id);
        self.publish(&state);
        true
    }

    /// Start a fetch. Pass the ticket to [`apply_snapshot`](Self::apply_snapshot).
    pub fn begin_fetch(&self) -> FetchTicket {
        FetchTicket(self.read().seq)
    }

    /// Merge a fetched list: upsert every fetched alert, then prune local
    /// alerts the fetch did not return, except those written after `ticket`.
    ///
    /// The result takes the fetched order, with retained local writes kept
    /// at the front.
    pub fn apply_snapshot(
        &self,
        fetched: impl IntoIterator<Item = Alert>,
        ticket: FetchTicket,
    ) -> SnapshotOutcome {
        let mut state = self.write();
        let mut outcome = SnapshotOutcome::default();
        let mut next: IndexMap<AlertId, Arc<Alert>> = IndexMap::new();
        let mut seen: HashSet<AlertId> = HashSet::new();

        for alert in fetched {
            seen.insert(alert.id.clone());
            if next.contains_key(&alert.id) {
                continue;
            }
            if state.is_tombstoned(&alert) {
                outcome.skipped += 1;
                continue;
            }
            let newer_local = state
                .alerts
                .get(&alert.id)
                .filter(|local| local.revision() > alert.revision())
                .cloned();
            if let Some(local) = newer_local {
                outcome.skipped += 1;
                next.insert(alert.id.clone(), local);
            } else {
                outcome.upserted += 1;
                state.tombstones.remove(&alert.id);
                next.insert(alert.id.clone(), Arc::new(alert));
            }
        }

        // Local writes newer than the fetch survive, ahead of fetched rows.
        let mut retained: IndexMap<AlertId, Arc<Alert>> = IndexMap::new();
        for (id, alert) in &state.alerts {
            if next.contains_key(id) {
                continue;
            }
            if state.written.get(id).is_some_and(|seq| *seq > ticket.0) {
                retained.insert(id.clone(), Arc::clone(alert));
            } else {
                outcome.pruned += 1;
            }
        }
        outcome.retained = retained.len();
        retained.extend(next);
        retained.truncate(self.capacity);
        state.alerts = retained;

        // Bookkeeping older than the fetch is now settled by the server.
        state.written.retain(|_, seq| *seq > ticket.0);
        state
            .tombstones
            .retain(|id, t| t.seq > ticket.0 || seen.contains(id));

        self.publish(&state);
        debug!(
            upserted = outcome.upserted,
            pruned = outcome.pruned,
            skipped = outcome.skipped,
            retained = outcome.retained,
            "alert snapshot merged"
        );
        outcome
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &AlertId) -> Option<Arc<Alert>> {
        self.read().alerts.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().alerts.is_empty()
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Alert>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Alert>>>> {
        self.snapshot.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AlertState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AlertState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &AlertState) {
        let values: Vec<Arc<Alert>> = state.alerts.values().cloned().collect();
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

impl AlertState {
    fn bump(&mut self, id: &AlertId) -> u64 {
        self.seq += 1;
        self.written.insert(id.clone(), self.seq);
        self.seq
    }

    fn is_tombstoned(&self, alert: &Alert) -> bool {
        self.tombstones
            .get(&alert.id)
            .is_some_and(|t| alert.revision() <= t.revision)
    }

    fn upsert(&mut self, alert: Alert, capacity: usize) -> ApplyOutcome {
        if self.is_tombstoned(&alert) {
            return ApplyOutcome::Stale;
        }

        let id = alert.id.clone();
        let outcome = match self.alerts.get_mut(&id) {
            Some(slot) => {
                if alert.revision() < slot.revision() {
                    return ApplyOutcome::Stale;
                }
                *slot = Arc::new(alert);
                ApplyOutcome::Replaced
            }
            None => {
                self.alerts.shift_insert(0, id.clone(), Arc::new(alert));
                self.alerts.truncate(capacity);
                ApplyOutcome::Inserted
            }
        };
        self.tombstones.remove(&id);
        self.bump(&id);
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{AlertCategory, AlertSeverity, AlertStatus};

    fn base_time() -> DateTime<Utc> {
        "2026-03-01T08:00:00Z".parse().unwrap()
    }

    fn alert(id: &str, version: u64) -> Alert {
        Alert {
            id: AlertId::from(id),
            title: format!("Alert {id}"),
            message: String::new(),
            severity: AlertSeverity::High,
            status: AlertStatus::Active,
            category: AlertCategory::System,
            source: None,
            timestamp: base_time(),
            updated_at: None,
            version: Some(version),
            metadata: serde_json::Value::Null,
        }
    }

    fn ids(store: &AlertStore) -> Vec<String> {
        store.snapshot().iter().map(|a| a.id.to_string()).collect()
    }

    fn seeded(ids: &[&str]) -> AlertStore {
        let store = AlertStore::new(1000);
        let ticket = store.begin_fetch();
        store.apply_snapshot(ids.iter().map(|id| alert(id, 1)), ticket);
        store
    }

    #[test]
    fn update_then_delete_scenario() {
        let store = seeded(&["a", "b", "c"]);
        assert_eq!(store.len(), 3);

        assert_eq!(store.apply_update(alert("x", 1)), ApplyOutcome::Inserted);
        assert_eq!(store.len(), 4);
        assert_eq!(store.snapshot()[0].id.as_str(), "x");

        assert!(store.apply_delete(&AlertId::from("x")));
        assert_eq!(ids(&store), ["a", "b", "c"]);
    }

    #[test]
    fn known_id_is_replaced_in_place() {
        let store = seeded(&["a", "b", "c"]);
        let mut updated = alert("b", 2);
        updated.status = AlertStatus::Acknowledged;

        assert_eq!(store.apply_update(updated), ApplyOutcome::Replaced);
        assert_eq!(ids(&store), ["a", "b", "c"]);
        assert_eq!(store.snapshot()[1].status, AlertStatus::Acknowledged);
    }

    #[test]
    fn delete_of_unknown_id_is_noop() {
        let store = seeded(&["a", "b"]);
        let before = store.snapshot();
        assert!(!store.apply_delete(&AlertId::from("zzz")));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn stale_update_is_dropped() {
        let store = seeded(&[]);
        store.apply_update(alert("a", 5));
        let mut old = alert("a", 4);
        old.title = "rolled back".into();
        assert_eq!(store.apply_update(old), ApplyOutcome::Stale);
        assert_eq!(store.get(&AlertId::from("a")).unwrap().title, "Alert a");

        // Same revision is an idempotent replay and is accepted.
        assert_eq!(store.apply_update(alert("a", 5)), ApplyOutcome::Replaced);
    }

    #[test]
    fn timestamps_order_unversioned_writes() {
        let store = seeded(&[]);
        let mut newer = alert("a", 0);
        newer.version = None;
        newer.updated_at = Some(base_time() + Duration::minutes(5));
        store.apply_update(newer);

        let mut older = alert("a", 0);
        older.version = None;
        older.updated_at = Some(base_time() + Duration::minutes(1));
        assert_eq!(store.apply_update(older), ApplyOutcome::Stale);
    }

    #[test]
    fn tombstone_blocks_late_fetch_resurrection() {
        let store = seeded(&["a", "b"]);
        let ticket = store.begin_fetch();
        assert!(store.apply_delete(&AlertId::from("a")));

        // A fetch that started before the delete still returns "a".
        let outcome = store.apply_snapshot(vec![alert("a", 1), alert("b", 1)], ticket);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(ids(&store), ["b"]);

        // A genuinely newer revision does come back.
        let ticket = store.begin_fetch();
        store.apply_snapshot(vec![alert("a", 2), alert("b", 1)], ticket);
        assert_eq!(ids(&store), ["a", "b"]);
    }

    #[test]
    fn snapshot_keeps_writes_made_during_fetch() {
        let store = seeded(&["a", "b"]);
        let ticket = store.begin_fetch();

        // Realtime insert lands while the fetch is in flight.
        store.apply_update(alert("x", 1));

        let outcome = store.apply_snapshot(vec![alert("b", 1)], ticket);
        assert_eq!(outcome.pruned, 1);
        assert_eq!(outcome.retained, 1);
        assert_eq!(ids(&store), ["x", "b"]);
    }

    #[test]
    fn snapshot_does_not_roll_back_newer_local_state() {
        let store = seeded(&["a"]);
        let ticket = store.begin_fetch();
        let mut acked = alert("a", 2);
        acked.status = AlertStatus::Acknowledged;
        store.apply_update(acked);

        let outcome = store.apply_snapshot(vec![alert("a", 1)], ticket);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(
            store.get(&AlertId::from("a")).unwrap().status,
            AlertStatus::Acknowledged
        );
    }

    #[test]
    fn capacity_drops_oldest() {
        let store = AlertStore::new(3);
        for id in ["a", "b", "c", "d"] {
            store.apply_update(alert(id, 1));
        }
        assert_eq!(ids(&store), ["d", "c", "b"]);
    }

    #[test]
    fn evict_leaves_no_tombstone() {
        let store = seeded(&["a"]);
        assert!(store.evict(&AlertId::from("a")));
        assert!(store.is_empty());
        assert_eq!(store.apply_update(alert("a", 1)), ApplyOutcome::Inserted);
    }
}
