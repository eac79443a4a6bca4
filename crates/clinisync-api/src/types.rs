// Wire types for the monitoring-alerts and notifications APIs.
//
// Field names follow the back end's camelCase JSON. Enumerated fields
// (severity, status, category, priority) stay as strings here; the core
// crate converts them into typed enums with an `Unknown` fallback so a
// new server-side value never breaks deserialization.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Alerts ───────────────────────────────────────────────────────────

/// An alert record as returned by `/api/monitoring/alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResponse {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    /// Some endpoints call this `priority`.
    #[serde(alias = "priority")]
    pub severity: String,
    pub status: String,
    /// Some endpoints call this `type`.
    #[serde(default, alias = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Monotonic server-side revision, when the back end provides one.
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Body for `POST /api/monitoring/alerts` and the import endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlertRequest {
    pub title: String,
    pub message: String,
    pub severity: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Body for `PUT /api/monitoring/alerts/{id}`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body for `POST /api/monitoring/alerts/test`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAlertRequest {
    pub severity: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of `POST /api/monitoring/alerts/import`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Aggregate counters from `GET /api/monitoring/alerts/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatsResponse {
    pub total: u64,
    #[serde(default)]
    pub by_status: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_severity: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_category: BTreeMap<String, u64>,
}

/// Export payload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Alert list filter on the wire.
///
/// Sent as query parameters on REST calls and as the `filters` object on
/// realtime `subscribe` / `update-filters` frames. Empty lists mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl AlertQuery {
    /// Render as REST query parameters. Lists are comma-joined.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        push_list(&mut params, "category", &self.categories);
        push_list(&mut params, "severity", &self.severities);
        push_list(&mut params, "status", &self.statuses);
        push_list(&mut params, "source", &self.sources);
        if let Some(from) = self.from {
            params.push(("from", from.to_rfc3339()));
        }
        if let Some(to) = self.to {
            params.push(("to", to.to_rfc3339()));
        }
        if let Some(ref search) = self.search {
            if !search.is_empty() {
                params.push(("search", search.clone()));
            }
        }
        params
    }
}

fn push_list(params: &mut Vec<(&'static str, String)>, name: &'static str, values: &[String]) {
    if !values.is_empty() {
        params.push((name, values.join(",")));
    }
}

// ── Notifications ────────────────────────────────────────────────────

/// A notification record as returned by `/api/notifications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub status: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_priority() -> String {
    "normal".into()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<String>,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl NotificationQuery {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        push_list(&mut params, "status", &self.statuses);
        push_list(&mut params, "priority", &self.priorities);
        if self.unread_only {
            params.push(("unread", "true".into()));
        }
        if let Some(ref search) = self.search {
            if !search.is_empty() {
                params.push(("search", search.clone()));
            }
        }
        params
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}
