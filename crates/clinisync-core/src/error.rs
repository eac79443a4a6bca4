// ── Core error types ──
//
// User-facing errors from clinisync-core. The `From<clinisync_api::Error>`
// impl maps transport failures into domain variants while keeping the
// status, server message, and retryability the caller needs to decide
// what to show.

use thiserror::Error;

pub use clinisync_api::ErrorKind;

use crate::model::{AlertId, AlertStatus};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Not connected to the back end")]
    NotConnected,

    #[error("Request timed out")]
    Timeout,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Alert not found: {id}")]
    AlertNotFound { id: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Alert {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
    },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed {
        message: String,
        code: Option<String>,
    },

    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        code: Option<String>,
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Coarse classification, shared with the API layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailed { .. } | Self::PermissionDenied { .. } => ErrorKind::Auth,
            Self::ConnectionFailed { .. } | Self::NotConnected | Self::Timeout => {
                ErrorKind::Transport
            }
            Self::AlertNotFound { .. } | Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } | Self::Conflict { .. } => ErrorKind::Conflict,
            Self::ValidationFailed { .. } | Self::Config { .. } => ErrorKind::Validation,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Server { .. } => ErrorKind::Server,
            Self::Api { .. } | Self::Internal(_) => ErrorKind::Protocol,
        }
    }

    /// Whether repeating the same action later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::Timeout
                | Self::RateLimited { .. }
                | Self::Server { .. }
        )
    }

    /// HTTP status behind this error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailed { .. } => Some(401),
            Self::PermissionDenied { .. } => Some(403),
            Self::AlertNotFound { .. } | Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::RateLimited { .. } => Some(429),
            Self::Server { status, .. } => Some(*status),
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<clinisync_api::Error> for CoreError {
    fn from(err: clinisync_api::Error) -> Self {
        use clinisync_api::Error as E;

        match err {
            E::Unauthorized { message } => CoreError::AuthenticationFailed { message },
            E::InvalidToken(reason) => CoreError::AuthenticationFailed {
                message: format!("invalid bearer token: {reason}"),
            },
            E::Forbidden { message } => CoreError::PermissionDenied { message },
            E::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() || e.is_request() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            E::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            E::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            E::NotFound { message } => CoreError::NotFound { message },
            E::Conflict { message } => CoreError::Conflict { message },
            E::Validation { message, code, .. } => CoreError::ValidationFailed { message, code },
            E::RateLimited { retry_after_secs } => CoreError::RateLimited { retry_after_secs },
            E::Server { status, message } => CoreError::Server { status, message },
            E::Api {
                status,
                message,
                code,
            } => CoreError::Api {
                message,
                code,
                status: Some(status),
            },
            E::WebSocketConnect(reason) | E::WebSocketSend(reason) => {
                CoreError::ConnectionFailed {
                    url: String::new(),
                    reason: format!("realtime channel: {reason}"),
                }
            }
            E::WebSocketRejected { status } => match status {
                401 => CoreError::AuthenticationFailed {
                    message: "realtime channel rejected the token".into(),
                },
                403 => CoreError::PermissionDenied {
                    message: "realtime channel access denied".into(),
                },
                s => CoreError::Api {
                    message: "realtime upgrade rejected".into(),
                    code: None,
                    status: Some(s),
                },
            },
            E::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            E::Serialization(e) => CoreError::Internal(format!("Serialization error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_keep_status_and_kind() {
        let err = CoreError::from(clinisync_api::Error::Server {
            status: 502,
            message: "bad gateway".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.status(), Some(502));
        assert!(err.is_retryable());

        let err = CoreError::from(clinisync_api::Error::Validation {
            status: 422,
            message: "title required".into(),
            code: Some("alert.title".into()),
        });
        assert!(matches!(err, CoreError::ValidationFailed { ref code, .. } if code.as_deref() == Some("alert.title")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn auth_rejections_are_auth_kind() {
        let err = CoreError::from(clinisync_api::Error::WebSocketRejected { status: 401 });
        assert_eq!(err.kind(), ErrorKind::Auth);
        let err = CoreError::from(clinisync_api::Error::Forbidden {
            message: "nurse role".into(),
        });
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn invalid_transition_message() {
        let err = CoreError::InvalidTransition {
            id: AlertId::from("a7"),
            from: AlertStatus::Resolved,
            to: AlertStatus::Acknowledged,
        };
        assert_eq!(
            err.to_string(),
            "Alert a7 cannot move from resolved to acknowledged"
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
