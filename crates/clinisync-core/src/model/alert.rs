// ── Alert domain types ──

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

// ── AlertId ─────────────────────────────────────────────────────────

/// Opaque, server-assigned alert identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AlertId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<String> for AlertId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AlertId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── Enumerations ────────────────────────────────────────────────────

/// Alert severity, ordered from least to most urgent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
    /// A status this client does not know. Never produced locally.
    #[strum(disabled)]
    Unknown,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::Suppressed => "suppressed",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Unknown` on either side is permitted; the server has the final say.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Unknown, _)
            | (_, Self::Unknown)
            | (Self::Active, Self::Acknowledged | Self::Resolved | Self::Suppressed)
            | (Self::Acknowledged, Self::Resolved | Self::Suppressed)
            | (Self::Suppressed, Self::Active | Self::Resolved) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertCategory {
    System,
    Security,
    Performance,
    Clinical,
    Billing,
    Inventory,
    Compliance,
    Telemedicine,
    Other,
}

// ── Revision ────────────────────────────────────────────────────────

/// Ordering key for writes to the same alert.
///
/// Compares the server version first, then the last-modified time. A
/// write whose revision is lower than the stored one is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    pub version: u64,
    pub modified: DateTime<Utc>,
}

// ── Alert ───────────────────────────────────────────────────────────

/// A system alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub category: AlertCategory,
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Option<u64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Alert {
    pub fn revision(&self) -> Revision {
        Revision {
            version: self.version.unwrap_or(0),
            modified: self.updated_at.unwrap_or(self.timestamp),
        }
    }
}
