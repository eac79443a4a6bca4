use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Credentials for authenticating with the clinic back end.
///
/// Both the REST API and the realtime channel accept the same bearer
/// token; the channel sends it on the WebSocket upgrade request.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// `Authorization: Bearer <token>`.
    Bearer { token: SecretString },
    /// No authentication (local development back ends).
    Anonymous,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: SecretString::from(token.into()),
        }
    }

    /// Render the `Authorization` header value, marked sensitive so it
    /// never shows up in debug output.
    pub fn header_value(&self) -> Result<Option<HeaderValue>, Error> {
        match self {
            Self::Bearer { token } => {
                let mut value =
                    HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                        .map_err(|e| Error::InvalidToken(e.to_string()))?;
                value.set_sensitive(true);
                Ok(Some(value))
            }
            Self::Anonymous => Ok(None),
        }
    }
}
