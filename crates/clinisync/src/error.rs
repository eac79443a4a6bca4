//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use clinisync_config::ConfigError;
use clinisync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the back end at {url}")]
    #[diagnostic(
        code(clinisync::connection_failed),
        help(
            "Check that the back end is running and reachable.\n\
             Reason: {reason}\n\
             Self-signed certificate? Try --insecure (-k) or set ca_cert in your profile."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(clinisync::timeout),
        help("Increase the timeout with --timeout or check back-end responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(clinisync::auth_failed),
        help(
            "Verify the bearer token for this profile.\n\
             Run: clinisync config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(clinisync::no_credentials),
        help(
            "Store a token with: clinisync config set-token\n\
             Or set the CLINISYNC_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    #[error("Permission denied: {message}")]
    #[diagnostic(code(clinisync::permission_denied))]
    PermissionDenied { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(clinisync::not_found),
        help("Run: clinisync {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{message}")]
    #[diagnostic(code(clinisync::conflict))]
    Conflict { message: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(clinisync::api_error))]
    ApiError { code: String, message: String },

    #[error("Rate limited by the back end")]
    #[diagnostic(
        code(clinisync::rate_limited),
        help("Retry after {retry_after_secs}s.")
    )]
    RateLimited { retry_after_secs: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(clinisync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(clinisync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: clinisync config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No back end configured")]
    #[diagnostic(
        code(clinisync::no_config),
        help(
            "Create a profile with: clinisync config init\n\
             Expected at: {path}\n\
             Or pass --api-url and --token."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(clinisync::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(clinisync::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(clinisync::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(clinisync::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError ───────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

// ── CoreError → CliError ─────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::NotConnected => Self::ConnectionFailed {
                url: "(disconnected)".into(),
                reason: "the sync engine is not connected".into(),
            },
            CoreError::Timeout => Self::Timeout,
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::PermissionDenied { message } => Self::PermissionDenied { message },

            CoreError::AlertNotFound { id } => Self::NotFound {
                resource_type: "alert".into(),
                identifier: id,
                list_command: "alerts list".into(),
            },
            CoreError::NotFound { message } => Self::NotFound {
                resource_type: "record".into(),
                identifier: message,
                list_command: "alerts list".into(),
            },

            err @ CoreError::InvalidTransition { .. } => Self::Conflict {
                message: err.to_string(),
            },
            CoreError::Conflict { message } => Self::Conflict { message },

            CoreError::ValidationFailed { message, .. } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            CoreError::Server { status, message } => Self::ApiError {
                code: status.to_string(),
                message,
            },
            CoreError::Api { message, code, status } => Self::ApiError {
                code: code
                    .or_else(|| status.map(|s| s.to_string()))
                    .unwrap_or_default(),
                message,
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => Self::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinisync_core::{AlertId, AlertStatus};

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (CoreError::Timeout, exit_code::TIMEOUT),
            (
                CoreError::AuthenticationFailed {
                    message: "expired".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::PermissionDenied {
                    message: "nurse role".into(),
                },
                exit_code::PERMISSION,
            ),
            (CoreError::AlertNotFound { id: "a1".into() }, exit_code::NOT_FOUND),
            (
                CoreError::InvalidTransition {
                    id: AlertId::from("a1"),
                    from: AlertStatus::Resolved,
                    to: AlertStatus::Active,
                },
                exit_code::CONFLICT,
            ),
            (CoreError::NotConnected, exit_code::CONNECTION),
            (
                CoreError::Server {
                    status: 500,
                    message: "boom".into(),
                },
                exit_code::GENERAL,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn missing_credentials_exit_as_auth() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "ward".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
