// ── Typed request structs for Command payloads ──
//
// Domain-typed inputs for the write commands. Each converts into the
// string-typed wire body the data service expects.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use clinisync_api::types as wire;

use crate::model::{AlertCategory, AlertSeverity};

// ── Alerts ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAlertRequest {
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateAlertRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<AlertSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<AlertCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl UpdateAlertRequest {
    /// True when no field would be sent.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Synthetic alert raised through the back end's delivery pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAlertRequest {
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Default for TestAlertRequest {
    fn default() -> Self {
        Self {
            severity: AlertSeverity::Info,
            category: AlertCategory::System,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuppressOptions {
    /// `None` suppresses until the alert is reactivated by hand.
    pub duration: Option<Duration>,
    pub reason: Option<String>,
}

// ── Wire conversions ───────────────────────────────────────────────

impl From<CreateAlertRequest> for wire::NewAlertRequest {
    fn from(r: CreateAlertRequest) -> Self {
        Self {
            title: r.title,
            message: r.message,
            severity: r.severity.to_string(),
            category: r.category.to_string(),
            source: r.source,
            metadata: r.metadata,
        }
    }
}

impl From<UpdateAlertRequest> for wire::AlertUpdateRequest {
    fn from(r: UpdateAlertRequest) -> Self {
        Self {
            title: r.title,
            message: r.message,
            severity: r.severity.map(|s| s.to_string()),
            category: r.category.map(|c| c.to_string()),
            metadata: r.metadata,
        }
    }
}

impl From<TestAlertRequest> for wire::TestAlertRequest {
    fn from(r: TestAlertRequest) -> Self {
        Self {
            severity: r.severity.to_string(),
            category: r.category.to_string(),
            message: r.message,
        }
    }
}

impl From<SuppressOptions> for wire::SuppressRequest {
    fn from(o: SuppressOptions) -> Self {
        Self {
            // Round up so a 30s suppression is not sent as zero minutes.
            duration_minutes: o.duration.map(|d| d.as_secs().div_ceil(60)),
            reason: o.reason,
        }
    }
}
