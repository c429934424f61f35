//! HTTP client wrapper for Assistants API requests.

use crate::api::error::Error;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::warn;

/// HTTP request timeout.
const TIMEOUT: Duration = Duration::from_secs(60);
/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const BETA_HEADER: HeaderName = HeaderName::from_static("openai-beta");
const BETA_VALUE: &str = "assistants=v2";
const ORGANIZATION_HEADER: HeaderName = HeaderName::from_static("openai-organization");

/// Credentials sent with every request.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub organization: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("organization", &self.organization)
            .finish()
    }
}

/// HTTP client for the Assistants API.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build headers including authentication and the assistants beta opt-in.
    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(BETA_HEADER, HeaderValue::from_static(BETA_VALUE));

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.credentials.api_key))
            .map_err(|_| Error::Api("API key contains invalid header characters".into()))?;
        headers.insert(AUTHORIZATION, bearer);

        if let Some(org) = &self.credentials.organization {
            let value = HeaderValue::from_str(org).map_err(|_| {
                Error::Api("Organization contains invalid header characters".into())
            })?;
            headers.insert(ORGANIZATION_HEADER, value);
        }

        Ok(headers)
    }

    /// Make a GET request and deserialize the response.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, Error> {
        let response = self.send(self.client.get(self.url(path))).await?;
        Self::read_json(response).await
    }

    /// Make a GET request, mapping `404 Not Found` to `None`.
    pub async fn get_json_optional<R: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<R>, Error> {
        let response = self.send(self.client.get(self.url(path))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read_json(response).await.map(Some)
    }

    /// Make a POST request with JSON body and deserialize the response.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, Error> {
        let response = self
            .send(self.client.post(self.url(path)).json(body))
            .await?;
        Self::read_json(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let headers = self.build_headers()?;
        let response = request.headers(headers).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&response);
            return Err(Error::RateLimited { retry_after });
        }
        Ok(response)
    }

    async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, Error> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Api(format!("HTTP {status}: {text}")));
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Unexpected response body");
            Error::Json(e)
        })
    }
}

/// Extract and parse `Retry-After` header from a response.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    let value = response.headers().get(RETRY_AFTER)?;
    parse_retry_after_value(value.to_str().ok()?)
}

/// Parse a `Retry-After` header value as seconds.
///
/// Fractional seconds round up. HTTP-date and non-finite values return None.
fn parse_retry_after_value(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        Some(secs.max(1))
    } else if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() && f > 0.0 {
            Some((f.ceil() as u64).max(1))
        } else {
            None
        }
    } else {
        None
    }
}
