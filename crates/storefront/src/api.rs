//! Shop backend REST client.
//!
//! # Architecture
//!
//! - One shared `reqwest::Client` behind an `Arc`, cloned into every
//!   resource client (addresses, orders, catalog, users)
//! - Bearer token set after login and attached to every request
//! - Every request carries an `X-Request-Id` for correlating backend logs
//! - Non-success responses are decoded into [`ApiErrorBody`] and returned as
//!   [`ApiError::Status`]; nothing is retried
//!
//! # Example
//!
//! ```rust,ignore
//! let api = ApiClient::new(config.api_url.clone(), config.http_timeout)?;
//! let categories: Vec<Category> = api.get("/categories").await?;
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::validation::FieldErrors;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Maximum number of body characters kept in error messages and logs.
const BODY_PREVIEW_CHARS: usize = 300;

/// Errors returned by the backend client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure (connection refused, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("API returned {status}: {}", .body.summary())]
    Status { status: u16, body: ApiErrorBody },

    /// A success response did not match the expected shape.
    #[error("Unexpected response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured base URL cannot hold the request path.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// HTTP status for [`ApiError::Status`].
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Backend per-field validation errors, when the response carried any.
    #[must_use]
    pub fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            Self::Status { body, .. } if !body.validation_errors.is_empty() => {
                Some(FieldErrors::from(body.validation_errors.clone()))
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404))
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.status(), Some(409))
    }

    /// Whether this is a transport-level failure rather than a backend answer.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

/// Error body returned by the backend.
///
/// Matches the backend's error envelope: a message plus an optional map of
/// field name to validation message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub validation_errors: BTreeMap<String, String>,
}

impl ApiErrorBody {
    /// Decode an error body, falling back to the raw text as the message.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self {
            message: (!text.trim().is_empty()).then(|| preview(text)),
            ..Self::default()
        })
    }

    fn summary(&self) -> String {
        match (&self.message, self.validation_errors.is_empty()) {
            (Some(message), true) => message.clone(),
            (Some(message), false) => format!(
                "{message} ({})",
                FieldErrors::from(self.validation_errors.clone())
            ),
            (None, false) => FieldErrors::from(self.validation_errors.clone()).to_string(),
            (None, true) => "(no error details provided)".to_string(),
        }
    }
}

/// Client for the shop backend.
///
/// Cheaply cloneable; clones share the connection pool and the session token.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<SecretString>>,
}

impl ApiClient {
    /// Create a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kiln-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url,
                token: RwLock::new(None),
            }),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Replace the bearer token (`None` after logout).
    pub fn set_token(&self, token: Option<SecretString>) {
        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Whether a bearer token is currently attached.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// GET `path` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or a body
    /// that does not decode as `T`.
    #[instrument(skip(self), fields(method = "GET"))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(reqwest::Method::GET, path)?;
        let text = self.send(request, path).await?;
        decode(path, &text)
    }

    /// POST a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    #[instrument(skip(self, body), fields(method = "POST"))]
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(reqwest::Method::POST, path)?.json(body);
        let text = self.send(request, path).await?;
        decode(path, &text)
    }

    /// POST a JSON body, ignoring the response body on success.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    #[instrument(skip(self, body), fields(method = "POST"))]
    pub async fn post_discarding<B>(&self, path: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let request = self.request(reqwest::Method::POST, path)?.json(body);
        self.send(request, path).await.map(drop)
    }

    /// PUT a JSON body, ignoring the response body on success.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    #[instrument(skip(self, body), fields(method = "PUT"))]
    pub async fn put_discarding<B>(&self, path: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let request = self.request(reqwest::Method::PUT, path)?.json(body);
        self.send(request, path).await.map(drop)
    }

    /// DELETE `path`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    #[instrument(skip(self), fields(method = "DELETE"))]
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.request(reqwest::Method::DELETE, path)?;
        self.send(request, path).await.map(drop)
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = join_url(&self.inner.base_url, path)?;
        let mut builder = self
            .inner
            .client
            .request(method, url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());

        let token = self
            .inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = token.as_ref() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }

        Ok(builder)
    }

    /// Send a request and return the body text of a success response.
    async fn send(&self, request: reqwest::RequestBuilder, path: &str) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(
                path = %path,
                status = %status,
                body = %preview(&text),
                "Backend returned non-success status"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: ApiErrorBody::from_text(&text),
            });
        }

        debug!(path = %path, status = %status, bytes = text.len(), "Backend request succeeded");
        Ok(text)
    }
}

/// Resolve `path` (with optional query string) against a base URL that may
/// itself carry a path prefix such as `/api/v2`.
///
/// # Errors
///
/// Returns an error if the combined URL is invalid.
pub fn join_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined)
}

/// Decode a success body; an empty body decodes as JSON `null` so `()` and
/// `Option<T>` responses work for endpoints that return nothing.
fn decode<T: DeserializeOwned>(path: &str, text: &str) -> Result<T, ApiError> {
    let result = if text.trim().is_empty() {
        serde_json::from_value(serde_json::Value::Null)
    } else {
        serde_json::from_str(text)
    };
    result.map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

fn preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW_CHARS).collect()
}
