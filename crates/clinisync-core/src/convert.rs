// ── API-to-domain type conversions ──
//
// Bridges raw `clinisync_api` wire types into `clinisync_core::model`
// domain types. Unrecognised enum strings never fail a conversion: they
// fall back to a neutral value and are logged at debug level.

use clinisync_api::types::{AlertResponse, NotificationResponse};
use tracing::debug;

use crate::model::{
    Alert, AlertCategory, AlertId, AlertSeverity, AlertStatus, Notification,
    NotificationPriority, NotificationStatus,
};

// ── Enum parsing helpers ───────────────────────────────────────────

fn parse_severity(raw: &str) -> AlertSeverity {
    match raw.parse() {
        Ok(s) => s,
        Err(_) => match raw.to_ascii_lowercase().as_str() {
            "warning" | "warn" => AlertSeverity::Medium,
            "error" | "urgent" => AlertSeverity::High,
            _ => {
                debug!(severity = raw, "unrecognised alert severity, using info");
                AlertSeverity::Info
            }
        },
    }
}

fn parse_status(raw: &str) -> AlertStatus {
    raw.parse().unwrap_or_else(|_| {
        debug!(status = raw, "unrecognised alert status");
        AlertStatus::Unknown
    })
}

fn parse_category(raw: Option<&str>) -> AlertCategory {
    raw.and_then(|c| c.parse().ok())
        .unwrap_or(AlertCategory::Other)
}

fn parse_priority(raw: &str) -> NotificationPriority {
    raw.parse().unwrap_or_else(|_| {
        debug!(priority = raw, "unrecognised notification priority, using normal");
        NotificationPriority::Normal
    })
}

fn parse_notification_status(raw: &str) -> NotificationStatus {
    raw.parse().unwrap_or_else(|_| {
        debug!(status = raw, "unrecognised notification status");
        NotificationStatus::Unknown
    })
}

// ── Alert ──────────────────────────────────────────────────────────

impl From<AlertResponse> for Alert {
    fn from(r: AlertResponse) -> Self {
        Self {
            id: AlertId::from(r.id),
            severity: parse_severity(&r.severity),
            status: parse_status(&r.status),
            category: parse_category(r.category.as_deref()),
            title: r.title,
            message: r.message,
            source: r.source.filter(|s| !s.is_empty()),
            timestamp: r.timestamp,
            updated_at: r.updated_at,
            version: r.version,
            metadata: r.metadata,
        }
    }
}

// ── Notification ───────────────────────────────────────────────────

impl From<NotificationResponse> for Notification {
    fn from(r: NotificationResponse) -> Self {
        Self {
            id: r.id,
            priority: parse_priority(&r.priority),
            status: parse_notification_status(&r.status),
            title: r.title,
            message: r.message,
            kind: r.kind,
            recipient: r.recipient,
            created_at: r.created_at,
            read_at: r.read_at,
            metadata: r.metadata,
        }
    }
}
