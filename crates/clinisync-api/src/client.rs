// Async HTTP client for the clinic back end's REST API.
//
// Base path: {api_url}/api/
// Auth: Authorization: Bearer <token>
//
// Resource groups (alerts, notifications) are implemented as inherent
// methods in separate files to keep this module focused on transport
// mechanics: URL building, request dispatch, and response handling.

use bytes::Bytes;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::auth::Credentials;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Error body shape used by the back end: `{"message": "...", "code": "..."}`.
#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default, alias = "error")]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Async client for the REST API.
///
/// One call issues exactly one request. There is no retry layer here;
/// callers decide what to do with [`Error::is_retryable`].
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Build from credentials and transport config.
    ///
    /// Injects `Authorization` as a default header on every request.
    pub fn new(
        base_url: &str,
        credentials: &Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Some(value) = credentials.header_value()? {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let http = transport.build_client_with_headers(headers)?;
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Ensure the base URL ends with `/api/` so relative joins work.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();

        if path.ends_with("/api") {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/api/"));
        }

        Ok(url)
    }

    /// The normalized API base URL (always ends in `/api/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative path (e.g. `"monitoring/alerts"`) onto the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request_id = Uuid::new_v4();
        debug!(%request_id, "{method} {url}");
        self.http
            .request(method, url)
            .header("X-Request-Id", request_id.to_string())
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        handle_response(resp).await
    }

    pub(crate) async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        let resp = self
            .request(reqwest::Method::GET, url)
            .query(params)
            .send()
            .await?;
        handle_response(resp).await
    }

    pub(crate) async fn get_bytes(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Bytes, Error> {
        let url = self.url(path)?;
        let resp = self
            .request(reqwest::Method::GET, url)
            .query(params)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.bytes().await?)
        } else {
            Err(parse_error(status, resp).await)
        }
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await?;
        handle_response(resp).await
    }

    pub(crate) async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        let resp = self
            .request(reqwest::Method::PUT, url)
            .json(body)
            .send()
            .await?;
        handle_response(resp).await
    }

    pub(crate) async fn put_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        let resp = self.request(reqwest::Method::PUT, url).send().await?;
        handle_response(resp).await
    }

    pub(crate) async fn put_no_response(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path)?;
        let resp = self.request(reqwest::Method::PUT, url).send().await?;
        handle_empty(resp).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path)?;
        let resp = self.request(reqwest::Method::DELETE, url).send().await?;
        handle_empty(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    if status.is_success() {
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview = truncate(&body, 200);
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    } else {
        Err(parse_error(status, resp).await)
    }
}

async fn handle_empty(resp: reqwest::Response) -> Result<(), Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(parse_error(status, resp).await)
    }
}

/// Translate a non-success response into a typed [`Error`], keeping the
/// server's message and code.
async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
    let retry_after_secs = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let raw = resp.text().await.unwrap_or_default();
    let (message, code) = match serde_json::from_str::<ErrorResponse>(&raw) {
        Ok(err) => (
            err.message.unwrap_or_else(|| status.to_string()),
            err.code,
        ),
        Err(_) if raw.is_empty() => (status.to_string(), None),
        Err(_) => (truncate(&raw, 500).to_owned(), None),
    };

    let code_u16 = status.as_u16();
    match code_u16 {
        401 => Error::Unauthorized { message },
        403 => Error::Forbidden { message },
        404 => Error::NotFound { message },
        409 => Error::Conflict { message },
        400 | 422 => Error::Validation {
            status: code_u16,
            message,
            code,
        },
        429 => Error::RateLimited {
            retry_after_secs: retry_after_secs.unwrap_or(0),
        },
        s if s >= 500 => Error::Server { status: s, message },
        s => Error::Api {
            status: s,
            message,
            code,
        },
    }
}

/// Cut `s` to at most `max` bytes without splitting a UTF-8 sequence.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
