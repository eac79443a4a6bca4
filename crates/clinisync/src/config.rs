//! CLI configuration: thin wrapper around `clinisync_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --token, --insecure, ...).

use std::time::Duration;

use secrecy::SecretString;

use clinisync_core::{AuthCredentials, SyncConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use clinisync_config::{
    Config, Profile, config_path, load_config_or_default, save_config,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `SyncConfig` from the config file, active profile, and flags.
///
/// Flags beat the profile; the profile beats built-in defaults.
pub fn build_sync_config(global: &GlobalOpts) -> Result<SyncConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut config = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile_with_flags(profile, &profile_name, global)?,
        None => {
            // An explicitly named profile must exist.
            if global.profile.is_some() {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: available_profiles(&cfg),
                });
            }
            flags_only(global, &profile_name)?
        }
    };

    if let Some(ref raw) = global.ws_url {
        config.ws_url = Some(parse_url("ws-url", raw)?);
    }
    if global.insecure || cfg.defaults.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    config.timeout = Duration::from_secs(
        global
            .timeout
            .or_else(|| {
                cfg.profiles
                    .get(&profile_name)
                    .and_then(|p| p.timeout)
            })
            .unwrap_or(cfg.defaults.timeout),
    );
    Ok(config)
}

fn profile_with_flags(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<SyncConfig, CliError> {
    // A flag token short-circuits the keyring lookup.
    let mut effective = profile.clone();
    if let Some(ref url) = global.api_url {
        effective.api_url.clone_from(url);
    }
    if global.token.is_some() {
        effective.anonymous = true;
    }
    let mut config = clinisync_config::profile_to_sync_config(&effective, profile_name)?;
    if let Some(ref token) = global.token {
        config.auth = AuthCredentials::Token(SecretString::from(token.clone()));
    }
    Ok(config)
}

fn flags_only(global: &GlobalOpts, profile_name: &str) -> Result<SyncConfig, CliError> {
    let raw = global.api_url.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let api_url = parse_url("api-url", raw)?;

    let auth = match global.token {
        Some(ref token) => AuthCredentials::Token(SecretString::from(token.clone())),
        None => {
            return Err(CliError::NoCredentials {
                profile: profile_name.into(),
            });
        }
    };

    Ok(SyncConfig::new(api_url, auth))
}
