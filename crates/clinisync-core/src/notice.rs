// ── User-facing action notices ──
//
// Every command ends in exactly one notice. Front ends render them as a
// transient message; the CLI prints them in `watch` mode.

use std::fmt;

use crate::error::{CoreError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success {
        action: &'static str,
        message: String,
    },
    Error {
        action: &'static str,
        message: String,
        kind: ErrorKind,
        retryable: bool,
    },
}

impl Notice {
    pub(crate) fn success(action: &'static str, message: impl Into<String>) -> Self {
        Self::Success {
            action,
            message: message.into(),
        }
    }

    pub(crate) fn failure(action: &'static str, err: &CoreError) -> Self {
        Self::Error {
            action,
            message: err.to_string(),
            kind: err.kind(),
            retryable: err.is_retryable(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Success { action, .. } | Self::Error { action, .. } => action,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { message, .. } => f.write_str(message),
            Self::Error {
                action,
                message,
                retryable,
                ..
            } => {
                write!(f, "Failed to {action}: {message}")?;
                if *retryable {
                    f.write_str(" (retry later)")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_kind_and_retryability() {
        let notice = Notice::failure("resolve alert", &CoreError::Timeout);
        assert!(notice.is_error());
        assert_eq!(
            notice,
            Notice::Error {
                action: "resolve alert",
                message: "Request timed out".into(),
                kind: ErrorKind::Transport,
                retryable: true,
            }
        );
        assert_eq!(
            notice.to_string(),
            "Failed to resolve alert: Request timed out (retry later)"
        );
    }
}
