//! Shared configuration for the clinisync CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `clinisync_core::SyncConfig`. The CLI adds
//! flag-aware overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use clinisync_core::{
    AuthCredentials, ReconnectConfig, SyncConfig, SyncSettings, TlsVerification,
};

/// Keyring service name; entries are keyed `{profile}/token`.
pub const KEYRING_SERVICE: &str = "clinisync";

/// Overrides the config file location (used by tests and CI).
pub const CONFIG_PATH_ENV: &str = "CLINISYNC_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named back-end profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named back-end profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// REST base URL (e.g., "https://clinic.example.org").
    pub api_url: String,

    /// Realtime base URL (e.g., "wss://clinic.example.org/ws").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,

    /// Bearer token (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Connect without a token (local development back ends).
    #[serde(default, skip_serializing_if = "is_false")]
    pub anonymous: bool,

    /// Path to custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_refresh: Option<bool>,

    /// Poll interval, humantime syntax ("30s", "2m").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,

    /// How long a fetched list is served from cache ("10s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_alerts: Option<usize>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `CLINISYNC_CONFIG`, then XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("org", "clinisync", "clinisync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("clinisync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit path, merged as defaults -> file -> env.
///
/// Nested keys use a double underscore, e.g. `CLINISYNC_DEFAULTS__OUTPUT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CLINISYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve a bearer token from the credential chain (no CLI flag step).
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env -> env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring under `{profile}/token`.
pub fn store_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token.expose_secret())?;
    Ok(())
}

pub fn resolve_auth(profile: &Profile, profile_name: &str) -> Result<AuthCredentials, ConfigError> {
    if profile.anonymous {
        return Ok(AuthCredentials::Anonymous);
    }
    resolve_token(profile, profile_name).map(AuthCredentials::Token)
}

// ── Profile -> SyncConfig ───────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Parse a humantime duration such as "30s" or "2m".
pub fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{raw}': {e}"),
    })
}

/// Build a `SyncConfig` from a profile, with no CLI flag overrides.
pub fn profile_to_sync_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<SyncConfig, ConfigError> {
    let api_url = parse_url("api_url", &profile.api_url)?;
    let auth = resolve_auth(profile, profile_name)?;

    let mut config = SyncConfig::new(api_url, auth);
    config.ws_url = profile
        .ws_url
        .as_deref()
        .map(|raw| parse_url("ws_url", raw))
        .transpose()?;

    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    if let Some(secs) = profile.timeout {
        config.timeout = Duration::from_secs(secs);
    }

    let defaults = SyncSettings::default();
    config.settings = SyncSettings {
        realtime_enabled: profile.realtime.unwrap_or(defaults.realtime_enabled),
        auto_refresh: profile.auto_refresh.unwrap_or(defaults.auto_refresh),
        refresh_interval: match profile.refresh_interval {
            Some(ref raw) => parse_duration("refresh_interval", raw)?,
            None => defaults.refresh_interval,
        },
    };

    if let Some(ref raw) = profile.stale_time {
        config.stale_time = parse_duration("stale_time", raw)?;
    }
    if let Some(max) = profile.max_reconnect_attempts {
        config.reconnect = ReconnectConfig {
            max_attempts: Some(max),
            ..ReconnectConfig::default()
        };
    }
    if let Some(max) = profile.max_alerts {
        config.max_alerts = max;
    }

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "ward"

[defaults]
output = "json"
timeout = 15

[profiles.ward]
api_url = "https://clinic.example.org"
ws_url = "wss://clinic.example.org/ws"
token = "plain-token"
realtime = false
refresh_interval = "45s"
stale_time = "5s"
max_reconnect_attempts = 4
"#;

    fn write_sample() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_profiles_over_defaults() {
        let (_dir, path) = write_sample();
        let cfg = load_config_from(&path).unwrap();

        assert_eq!(cfg.default_profile.as_deref(), Some("ward"));
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.defaults.timeout, 15);
        assert_eq!(cfg.defaults.color, "auto");
        let ward = &cfg.profiles["ward"];
        assert_eq!(ward.ws_url.as_deref(), Some("wss://clinic.example.org/ws"));
        assert_eq!(ward.max_reconnect_attempts, Some(4));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let (dir, path) = write_sample();
        let cfg = load_config_from(&path).unwrap();
        let copy = dir.path().join("nested").join("copy.toml");
        save_config_to(&cfg, &copy).unwrap();
        assert_eq!(load_config_from(&copy).unwrap(), cfg);
    }

    #[test]
    fn profile_translates_to_sync_config() {
        let (_dir, path) = write_sample();
        let cfg = load_config_from(&path).unwrap();
        let sync = profile_to_sync_config(&cfg.profiles["ward"], "ward").unwrap();

        assert_eq!(sync.api_url.as_str(), "https://clinic.example.org/");
        assert_eq!(
            sync.ws_url.as_ref().map(url::Url::as_str),
            Some("wss://clinic.example.org/ws")
        );
        assert!(!sync.settings.realtime_enabled);
        assert!(sync.settings.auto_refresh);
        assert_eq!(sync.settings.refresh_interval, Duration::from_secs(45));
        assert_eq!(sync.stale_time, Duration::from_secs(5));
        assert_eq!(sync.reconnect.max_attempts, Some(4));
        assert_eq!(sync.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn anonymous_profile_needs_no_token() {
        let profile = Profile {
            api_url: "http://localhost:4000".into(),
            anonymous: true,
            insecure: Some(true),
            ..Profile::default()
        };
        let sync = profile_to_sync_config(&profile, "local").unwrap();
        assert!(matches!(sync.auth, AuthCredentials::Anonymous));
        assert_eq!(sync.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn bad_values_are_validation_errors() {
        let profile = Profile {
            api_url: "not a url".into(),
            anonymous: true,
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_sync_config(&profile, "x"),
            Err(ConfigError::Validation { ref field, .. }) if field == "api_url"
        ));

        let err = parse_duration("refresh_interval", "soon").unwrap_err();
        assert!(err.to_string().contains("refresh_interval"));
    }

    #[test]
    fn unset_token_env_falls_through_to_plaintext() {
        let profile = Profile {
            api_url: "https://clinic.example.org".into(),
            token_env: Some("CLINISYNC_TEST_TOKEN_THAT_IS_NEVER_SET".into()),
            token: Some("from-file".into()),
            ..Profile::default()
        };
        let token = resolve_token(&profile, "clinisync-test-no-keyring-entry").unwrap();
        assert_eq!(token.expose_secret(), "from-file");
    }
}
