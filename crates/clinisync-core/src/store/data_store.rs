// ── Central reactive data store ──
//
// Holds the alert list and the notification inbox. Every write path
// (realtime frames, REST refreshes, confirmed mutations) goes through
// here; readers subscribe to the published snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::alert_store::{AlertStore, ApplyOutcome, FetchTicket, SnapshotOutcome};
use super::collection::EntityCollection;
use crate::model::{Alert, AlertId, Notification, NotificationStatus};
use crate::stream::EntityStream;

/// Central reactive store for alerts and notifications.
pub struct DataStore {
    pub(crate) alerts: AlertStore,
    pub(crate) notifications: EntityCollection<Notification>,
    pub(crate) last_full_refresh: watch::Sender<Option<DateTime<Utc>>>,
    pub(crate) last_realtime_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new(max_alerts: usize) -> Self {
        let (last_full_refresh, _) = watch::channel(None);
        let (last_realtime_event, _) = watch::channel(None);

        Self {
            alerts: AlertStore::new(max_alerts),
            notifications: EntityCollection::new(|a: &Notification, b: &Notification| {
                b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
            }),
            last_full_refresh,
            last_realtime_event,
        }
    }

    // ── Alert writes ─────────────────────────────────────────────────

    pub(crate) fn apply_alert_update(&self, alert: Alert) -> ApplyOutcome {
        self.alerts.apply_update(alert)
    }

    pub(crate) fn apply_alert_deleted(&self, id: &AlertId) -> bool {
        self.alerts.apply_delete(id)
    }

    pub(crate) fn evict_alert(&self, id: &AlertId) -> bool {
        self.alerts.evict(id)
    }

    pub(crate) fn begin_alert_fetch(&self) -> FetchTicket {
        self.alerts.begin_fetch()
    }

    pub(crate) fn apply_alert_snapshot(
        &self,
        alerts: impl IntoIterator<Item = Alert>,
        ticket: FetchTicket,
    ) -> SnapshotOutcome {
        let outcome = self.alerts.apply_snapshot(alerts, ticket);
        self.last_full_refresh.send_replace(Some(Utc::now()));
        outcome
    }

    pub(crate) fn mark_realtime_event(&self) {
        self.last_realtime_event.send_replace(Some(Utc::now()));
    }

    // ── Notification writes ──────────────────────────────────────────

    pub(crate) fn apply_notification_snapshot(&self, notifications: Vec<Notification>) -> usize {
        self.notifications
            .upsert_and_prune(notifications.into_iter().map(|n| (n.id.clone(), n)).collect())
    }

    /// Record a server-confirmed read.
    pub(crate) fn mark_notification_read(&self, id: &str, at: DateTime<Utc>) -> bool {
        self.notifications.modify(id, |n| Notification {
            status: NotificationStatus::Read,
            read_at: n.read_at.or(Some(at)),
            ..n.clone()
        })
    }

    pub(crate) fn remove_notification(&self, id: &str) -> bool {
        self.notifications.remove(id).is_some()
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn alerts_snapshot(&self) -> Arc<Vec<Arc<Alert>>> {
        self.alerts.snapshot()
    }

    pub fn notifications_snapshot(&self) -> Arc<Vec<Arc<Notification>>> {
        self.notifications.snapshot()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn alert_by_id(&self, id: &AlertId) -> Option<Arc<Alert>> {
        self.alerts.get(id)
    }

    pub fn notification_by_id(&self, id: &str) -> Option<Arc<Notification>> {
        self.notifications.get(id)
    }

    // ── Count accessors ──────────────────────────────────────────────

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }

    /// Unread notifications in the local inbox.
    pub fn unread_count(&self) -> usize {
        self.notifications
            .snapshot()
            .iter()
            .filter(|n| n.is_unread())
            .count()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_alerts(&self) -> EntityStream<Alert> {
        EntityStream::new(self.alerts.subscribe())
    }

    pub fn subscribe_notifications(&self) -> EntityStream<Notification> {
        EntityStream::new(self.notifications.subscribe())
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_full_refresh.borrow()
    }

    pub fn last_realtime_event(&self) -> Option<DateTime<Utc>> {
        *self.last_realtime_event.borrow()
    }

    /// How long ago the alert list was last fetched, or `None` if never.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_full_refresh().map(|t| Utc::now() - t)
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_ALERTS)
    }
}
