// ── Runtime sync configuration ──
//
// These types describe *how* to reach the clinic back end and how to keep
// the local view fresh. They carry credential data and tuning, but never
// touch disk. The CLI constructs a `SyncConfig` and hands it in.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use clinisync_api::ReconnectConfig;

/// How to authenticate with the back end.
#[derive(Debug, Clone)]
pub enum AuthCredentials {
    /// Bearer token, used for REST and the realtime upgrade.
    Token(SecretString),
    /// No authentication (local development back ends).
    Anonymous,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed development certs).
    DangerAcceptInvalid,
}

// ── Scheduler settings ──────────────────────────────────────────────

/// Which background source keeps the alert list fresh.
///
/// Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Realtime channel pushes updates.
    Socket,
    /// Periodic REST refetch.
    Polling,
    /// Nothing runs in the background.
    Idle,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Socket => "realtime",
            Self::Polling => "polling",
            Self::Idle => "idle",
        })
    }
}

/// User-toggleable sync preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub realtime_enabled: bool,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
}

impl SyncSettings {
    /// Resolve the active mode. `socket_gave_up` demotes realtime to polling
    /// until the settings change again.
    pub fn mode(&self, socket_gave_up: bool) -> SyncMode {
        if self.realtime_enabled && !socket_gave_up {
            SyncMode::Socket
        } else if self.realtime_enabled || (self.auto_refresh && !self.refresh_interval.is_zero())
        {
            // A realtime channel that gave up still keeps the data moving.
            SyncMode::Polling
        } else {
            SyncMode::Idle
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            realtime_enabled: true,
            auto_refresh: true,
            refresh_interval: Duration::from_secs(30),
        }
    }
}

// ── SyncConfig ──────────────────────────────────────────────────────

/// Configuration for one back end.
///
/// Built by the CLI, passed to `AlertSync` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// REST base URL (e.g., `https://clinic.example.org`).
    pub api_url: Url,
    /// Realtime base URL (e.g., `wss://clinic.example.org/ws`). `None`
    /// disables the realtime channel regardless of settings.
    pub ws_url: Option<Url>,
    pub auth: AuthCredentials,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    pub settings: SyncSettings,
    /// How long a cached list is served without refetching.
    pub stale_time: Duration,
    pub reconnect: ReconnectConfig,
    /// Maximum number of alerts kept in the store.
    pub max_alerts: usize,
}

pub const DEFAULT_MAX_ALERTS: usize = 1000;

impl SyncConfig {
    pub fn new(api_url: Url, auth: AuthCredentials) -> Self {
        Self {
            api_url,
            ws_url: None,
            auth,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            settings: SyncSettings::default(),
            stale_time: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            max_alerts: DEFAULT_MAX_ALERTS,
        }
    }
}
