// ── Filter state for alert and notification lists ──
//
// A filter is both a local predicate (applied to store snapshots) and a
// server query (rendered to REST params and realtime subscribe frames).
// Empty sets mean "any".

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinisync_api::{AlertQuery, NotificationQuery};

use super::alert::{Alert, AlertCategory, AlertSeverity, AlertStatus};
use super::notification::{Notification, NotificationPriority, NotificationStatus};
use crate::cache::{ALERTS_RESOURCE, NOTIFICATIONS_RESOURCE, QueryKey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertFilter {
    pub categories: BTreeSet<AlertCategory>,
    pub severities: BTreeSet<AlertSeverity>,
    pub statuses: BTreeSet<AlertStatus>,
    pub sources: BTreeSet<String>,
    /// Inclusive lower bound on `timestamp`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of title, message, or source.
    pub search: Option<String>,
}

impl AlertFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        (self.categories.is_empty() || self.categories.contains(&alert.category))
            && (self.severities.is_empty() || self.severities.contains(&alert.severity))
            && (self.statuses.is_empty() || self.statuses.contains(&alert.status))
            && (self.sources.is_empty()
                || alert
                    .source
                    .as_ref()
                    .is_some_and(|s| self.sources.contains(s)))
            && self.from.is_none_or(|from| alert.timestamp >= from)
            && self.to.is_none_or(|to| alert.timestamp <= to)
            && search_matches(
                self.search.as_deref(),
                [
                    Some(alert.title.as_str()),
                    Some(alert.message.as_str()),
                    alert.source.as_deref(),
                ],
            )
    }

    /// Keep only the alerts that satisfy every active predicate, in order.
    pub fn apply<'a, I>(&self, alerts: I) -> Vec<std::sync::Arc<Alert>>
    where
        I: IntoIterator<Item = &'a std::sync::Arc<Alert>>,
    {
        alerts
            .into_iter()
            .filter(|a| self.matches(a))
            .cloned()
            .collect()
    }

    /// Wire form for REST queries and realtime subscriptions.
    pub fn to_query(&self) -> AlertQuery {
        AlertQuery {
            categories: self.categories.iter().map(ToString::to_string).collect(),
            severities: self.severities.iter().map(ToString::to_string).collect(),
            statuses: self.statuses.iter().map(ToString::to_string).collect(),
            sources: self.sources.iter().cloned().collect(),
            from: self.from,
            to: self.to,
            search: self.search.clone().filter(|s| !s.is_empty()),
        }
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        self.to_query().to_params()
    }

    /// `["system-alerts", ...filter values]`
    pub fn query_key(&self) -> QueryKey {
        QueryKey::from_params(ALERTS_RESOURCE, &self.query_params())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub statuses: BTreeSet<NotificationStatus>,
    pub priorities: BTreeSet<NotificationPriority>,
    pub unread_only: bool,
    pub search: Option<String>,
}

impl NotificationFilter {
    pub fn matches(&self, n: &Notification) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&n.status))
            && (self.priorities.is_empty() || self.priorities.contains(&n.priority))
            && (!self.unread_only || n.is_unread())
            && search_matches(
                self.search.as_deref(),
                [Some(n.title.as_str()), Some(n.message.as_str()), None],
            )
    }

    pub fn to_query(&self) -> NotificationQuery {
        NotificationQuery {
            statuses: self.statuses.iter().map(ToString::to_string).collect(),
            priorities: self.priorities.iter().map(ToString::to_string).collect(),
            unread_only: self.unread_only,
            search: self.search.clone().filter(|s| !s.is_empty()),
        }
    }

    pub fn query_key(&self) -> QueryKey {
        QueryKey::from_params(NOTIFICATIONS_RESOURCE, &self.to_query().to_params())
    }
}

fn search_matches(needle: Option<&str>, haystacks: [Option<&str>; 3]) -> bool {
    let Some(needle) = needle.filter(|n| !n.is_empty()) else {
        return true;
    };
    let needle = needle.to_lowercase();
    haystacks
        .into_iter()
        .flatten()
        .any(|h| h.to_lowercase().contains(&needle))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::AlertId;

    fn alert(id: &str, severity: AlertSeverity, status: AlertStatus, hour: u32) -> Arc<Alert> {
        Arc::new(Alert {
            id: AlertId::from(id),
            title: format!("Alert {id}"),
            message: "Pharmacy fridge temperature out of range".into(),
            severity,
            status,
            category: AlertCategory::Inventory,
            source: Some("cold-chain".into()),
            timestamp: format!("2026-03-01T{hour:02}:00:00Z").parse().unwrap(),
            updated_at: None,
            version: None,
            metadata: serde_json::Value::Null,
        })
    }

    fn sample() -> Vec<Arc<Alert>> {
        vec![
            alert("a", AlertSeverity::Critical, AlertStatus::Active, 8),
            alert("b", AlertSeverity::High, AlertStatus::Acknowledged, 9),
            alert("c", AlertSeverity::Low, AlertStatus::Active, 10),
            alert("d", AlertSeverity::Critical, AlertStatus::Resolved, 11),
        ]
    }

    #[test]
    fn empty_filter_matches_everything() {
        let all = sample();
        assert_eq!(AlertFilter::default().apply(&all).len(), all.len());
        assert!(AlertFilter::default().is_empty());
    }

    #[test]
    fn filtered_list_is_subset_satisfying_every_predicate() {
        let all = sample();
        let filter = AlertFilter {
            severities: [AlertSeverity::Critical, AlertSeverity::High].into(),
            statuses: [AlertStatus::Active, AlertStatus::Acknowledged].into(),
            from: Some("2026-03-01T08:00:00Z".parse().unwrap()),
            to: Some("2026-03-01T10:00:00Z".parse().unwrap()),
            search: Some("FRIDGE".into()),
            ..AlertFilter::default()
        };

        let filtered = filter.apply(&all);
        let ids: Vec<_> = filtered.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        for a in &filtered {
            assert!(all.iter().any(|x| x.id == a.id));
            assert!(filter.severities.contains(&a.severity));
            assert!(filter.statuses.contains(&a.status));
        }
    }

    #[test]
    fn date_range_is_inclusive() {
        let all = sample();
        let filter = AlertFilter {
            from: Some("2026-03-01T09:00:00Z".parse().unwrap()),
            to: Some("2026-03-01T09:00:00Z".parse().unwrap()),
            ..AlertFilter::default()
        };
        let ids: Vec<_> = filter.apply(&all).iter().map(|a| a.id.to_string()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn source_filter_requires_a_source() {
        let mut a = (*alert("x", AlertSeverity::Info, AlertStatus::Active, 8)).clone();
        a.source = None;
        let filter = AlertFilter {
            sources: ["cold-chain".to_owned()].into(),
            ..AlertFilter::default()
        };
        assert!(!filter.matches(&a));
    }

    #[test]
    fn query_key_changes_with_filter() {
        let base = AlertFilter::default();
        let narrowed = AlertFilter {
            severities: [AlertSeverity::High].into(),
            ..AlertFilter::default()
        };
        assert_eq!(base.query_key().resource(), "system-alerts");
        assert_ne!(base.query_key(), narrowed.query_key());
        insta::assert_debug_snapshot!(narrowed.query_key().parts(), @r#"
        [
            "system-alerts",
            "severity=high",
        ]
        "#);
    }

    #[test]
    fn wire_query_uses_lowercase_names() {
        let filter = AlertFilter {
            categories: [AlertCategory::Clinical].into(),
            statuses: [AlertStatus::Suppressed].into(),
            search: Some(String::new()),
            ..AlertFilter::default()
        };
        let query = filter.to_query();
        assert_eq!(query.categories, ["clinical"]);
        assert_eq!(query.statuses, ["suppressed"]);
        assert!(query.search.is_none());
    }

    #[test]
    fn notification_unread_filter() {
        let n = Notification {
            id: "n1".into(),
            title: "Discharge summary signed".into(),
            message: String::new(),
            priority: NotificationPriority::Normal,
            status: NotificationStatus::Read,
            kind: None,
            recipient: None,
            created_at: "2026-03-01T08:00:00Z".parse().unwrap(),
            read_at: None,
            metadata: serde_json::Value::Null,
        };
        let filter = NotificationFilter {
            unread_only: true,
            ..NotificationFilter::default()
        };
        assert!(!filter.matches(&n));
        assert!(NotificationFilter::default().matches(&n));
    }
}
