//! Transport seam: performs the SUBSCRIBE / UNSUBSCRIBE call.
//!
//! The middleware only needs a response-like value back: a success flag, a
//! status, a status text, header lookup and an asynchronous body reader. The
//! wire protocol belongs to the [`Transport`] implementation.
//!
//! [`HttpTransport`] is a reqwest-backed default that sends the call verb as
//! an HTTP extension method.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::MiddlewareConfig;
use crate::core::Method;

/// A resolved call handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub endpoint: String,
    pub method: Method,
}

/// Response-like value returned by a [`Transport`].
#[async_trait]
pub trait Response: Send + Sync {
    /// Transport-level success indicator. Defaults to a 2xx status.
    fn ok(&self) -> bool {
        (200..300).contains(&self.status())
    }

    fn status(&self) -> u16;

    fn status_text(&self) -> String;

    /// Case-insensitive header lookup.
    fn header(&self, name: &str) -> Option<String>;

    /// Read and parse the body as JSON.
    async fn json(&self) -> Result<serde_json::Value>;
}

/// Performs the remote call for a validated RSAA.
///
/// Returning an error signals a request or connectivity failure; the
/// middleware turns it into a `ClientError` message. An unsuccessful
/// *response* should be returned as `Ok` with `ok() == false`.
///
/// # Example Implementation
///
/// ```ignore
/// struct SockJsTransport { conn: SockJsConnection }
///
/// #[async_trait]
/// impl Transport for SockJsTransport {
///     async fn call(&self, request: &Request) -> Result<Box<dyn Response>> {
///         let frame = self.conn.send(request.method.as_str(), &request.endpoint).await?;
///         Ok(Box::new(FrameResponse::from(frame)))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn call(&self, request: &Request) -> Result<Box<dyn Response>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn call(&self, request: &Request) -> Result<Box<dyn Response>> {
        (**self).call(request).await
    }
}

/// reqwest-backed transport.
///
/// Endpoints that are not absolute URLs are joined onto the base URL.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn from_config(config: &MiddlewareConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
        }
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            ),
            None => endpoint.to_string(),
        }
    }
}

fn http_method(method: Method) -> Result<reqwest::Method> {
    reqwest::Method::from_bytes(method.as_str().as_bytes())
        .with_context(|| format!("{} is not a valid request method", method))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: &Request) -> Result<Box<dyn Response>> {
        let url = self.url_for(&request.endpoint);
        debug!(%url, method = %request.method, "sending request");

        let resp = self
            .client
            .request(http_method(request.method)?, &url)
            .send()
            .await?;

        Ok(Box::new(HttpResponse::read(resp).await?))
    }
}

/// Response with its body buffered, so it can be parsed after `ok()` is checked.
struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpResponse {
    async fn read(resp: reqwest::Response) -> Result<Self> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.context("failed to read response body")?;

        Ok(Self {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl Response for HttpResponse {
    fn ok(&self) -> bool {
        self.status.is_success()
    }

    fn status(&self) -> u16 {
        self.status.as_u16()
    }

    fn status_text(&self) -> String {
        self.status.canonical_reason().unwrap_or_default().to_string()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    async fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.body).context("response body is not valid JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use serde_json::json;

    #[test]
    fn test_url_for_joins_base_url() {
        let transport = HttpTransport::new().with_base_url("https://feeds.example.com/");

        assert_eq!(
            transport.url_for("/rooms/7"),
            "https://feeds.example.com/rooms/7"
        );
        assert_eq!(
            transport.url_for("http://other.example.com/x"),
            "http://other.example.com/x"
        );
    }

    #[test]
    fn test_url_for_without_base_url() {
        assert_eq!(HttpTransport::new().url_for("/rooms/7"), "/rooms/7");
    }

    #[test]
    fn test_from_config_uses_base_url() {
        let config = MiddlewareConfig {
            base_url: Some("http://localhost:9999".into()),
            ..MiddlewareConfig::default()
        };
        let transport = HttpTransport::from_config(&config);

        assert_eq!(transport.url_for("feed"), "http://localhost:9999/feed");
    }

    #[test]
    fn test_call_verbs_are_valid_http_methods() {
        assert_eq!(http_method(Method::Subscribe).unwrap().as_str(), "SUBSCRIBE");
        assert_eq!(
            http_method(Method::Unsubscribe).unwrap().as_str(),
            "UNSUBSCRIBE"
        );
    }

    #[tokio::test]
    async fn test_http_response_reads_buffered_body() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let response = HttpResponse {
            status: StatusCode::NOT_FOUND,
            headers,
            body: br#"{"reason":"gone"}"#.to_vec(),
        };

        assert!(!response.ok());
        assert_eq!(response.status(), 404);
        assert_eq!(response.status_text(), "Not Found");
        assert_eq!(
            response.header("content-type").as_deref(),
            Some("application/json")
        );
        assert_eq!(response.json().await.unwrap(), json!({"reason": "gone"}));
    }

    #[tokio::test]
    async fn test_http_response_rejects_invalid_json() {
        let response = HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: b"not json".to_vec(),
        };

        assert!(response.json().await.is_err());
    }
}
