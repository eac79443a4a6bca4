use thiserror::Error;

/// Top-level error type for the `clinisync-api` crate.
///
/// Every variant keeps the detail the server or transport gave us (status
/// code, server message, error code, raw body). `clinisync-core` maps these
/// into domain errors without flattening them to a string.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Bearer token missing, expired, or rejected (HTTP 401).
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Token is valid but lacks permission for the resource (HTTP 403).
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Token could not be encoded as a header value.
    #[error("Invalid bearer token: {0}")]
    InvalidToken(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Server responses ────────────────────────────────────────────
    /// The resource does not exist (HTTP 404).
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The request conflicts with current server state (HTTP 409).
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The server rejected the payload (HTTP 400 / 422).
    #[error("Validation failed (HTTP {status}): {message}")]
    Validation {
        status: u16,
        message: String,
        code: Option<String>,
    },

    /// Rate limited. Includes retry-after in seconds when the server sent one.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Server-side failure (HTTP 5xx).
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success status.
    #[error("Unexpected response (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },

    // ── Realtime channel ────────────────────────────────────────────
    /// WebSocket connection or read failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket upgrade rejected by the server with an HTTP status.
    #[error("WebSocket upgrade rejected (HTTP {status})")]
    WebSocketRejected { status: u16 },

    /// Outbound frame could not be sent.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// JSON serialization of an outbound payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used by callers to decide between retrying and
/// surfacing a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    Transport,
    NotFound,
    Conflict,
    Validation,
    RateLimited,
    Server,
    Protocol,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } | Self::Forbidden { .. } | Self::InvalidToken(_) => {
                ErrorKind::Auth
            }
            Self::WebSocketRejected { status } if *status == 401 || *status == 403 => {
                ErrorKind::Auth
            }
            Self::Transport(e) => match e.status().map(|s| s.as_u16()) {
                Some(404) => ErrorKind::NotFound,
                Some(s) if s >= 500 => ErrorKind::Server,
                _ => ErrorKind::Transport,
            },
            Self::Tls(_) | Self::WebSocketConnect(_) | Self::WebSocketSend(_) => {
                ErrorKind::Transport
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation { .. } | Self::InvalidUrl(_) => ErrorKind::Validation,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Server { .. } => ErrorKind::Server,
            Self::WebSocketRejected { .. }
            | Self::Api { .. }
            | Self::Deserialization { .. }
            | Self::Serialization(_) => ErrorKind::Protocol,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::WebSocketConnect(_) | Self::WebSocketSend(_) => true,
            Self::RateLimited { .. } | Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if re-authentication might resolve this error.
    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::RateLimited { .. } => Some(429),
            Self::Validation { status, .. }
            | Self::Server { status, .. }
            | Self::Api { status, .. }
            | Self::WebSocketRejected { status } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Extract the server-side error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Validation { code, .. } | Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
