// ── Reactive entity streams ──
//
// Subscription types for consuming store changes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{Alert, AlertFilter, Notification, NotificationFilter};

/// A subscription to a collection of entities.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via the `changed()` method or by converting to a `Stream`.
pub struct EntityStream<T: Send + Sync + 'static> {
    current: Arc<Vec<Arc<T>>>,
    receiver: watch::Receiver<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Vec<Arc<T>>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation time (or at the last `changed`).
    pub fn current(&self) -> &Arc<Vec<Arc<T>>> {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<Vec<Arc<T>>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Arc<T>>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> EntityWatchStream<T> {
        EntityWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

impl EntityStream<Alert> {
    /// The latest alerts that pass `filter`, in store order.
    pub fn filtered(&self, filter: &AlertFilter) -> Vec<Arc<Alert>> {
        filter.apply(self.latest().iter())
    }
}

impl EntityStream<Notification> {
    pub fn filtered(&self, filter: &NotificationFilter) -> Vec<Arc<Notification>> {
        self.latest()
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect()
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then a new one each time the
/// underlying collection is mutated.
pub struct EntityWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> Stream for EntityWatchStream<T> {
    type Item = Arc<Vec<Arc<T>>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Arc<Vec<Arc<T>>> is Unpin, so WatchStream is too.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::model::{AlertCategory, AlertId, AlertSeverity, AlertStatus};
    use crate::store::DataStore;

    fn alert(id: &str, severity: AlertSeverity) -> Alert {
        Alert {
            id: AlertId::from(id),
            title: format!("Alert {id}"),
            message: String::new(),
            severity,
            status: AlertStatus::Active,
            category: AlertCategory::Clinical,
            source: None,
            timestamp: "2026-03-01T08:00:00Z".parse().unwrap(),
            updated_at: None,
            version: Some(1),
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn changed_tracks_store_writes() {
        let store = DataStore::default();
        let mut stream = store.subscribe_alerts();
        assert!(stream.current().is_empty());

        store.apply_alert_update(alert("a", AlertSeverity::Low));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(stream.current().len(), 1);
    }

    #[tokio::test]
    async fn filtered_view_is_a_subset() {
        let store = DataStore::default();
        store.apply_alert_update(alert("a", AlertSeverity::Low));
        store.apply_alert_update(alert("b", AlertSeverity::Critical));

        let stream = store.subscribe_alerts();
        let filter = AlertFilter {
            severities: [AlertSeverity::Critical].into(),
            ..AlertFilter::default()
        };
        let view = stream.filtered(&filter);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id.as_str(), "b");
        assert_eq!(stream.latest().len(), 2);
    }

    #[tokio::test]
    async fn into_stream_yields_current_then_updates() {
        let store = DataStore::default();
        let mut stream = store.subscribe_alerts().into_stream();
        assert!(stream.next().await.unwrap().is_empty());

        store.apply_alert_update(alert("a", AlertSeverity::High));
        assert_eq!(stream.next().await.unwrap().len(), 1);
    }
}
