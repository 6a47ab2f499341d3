//! JSON-over-HTTP transport for ArcGIS REST endpoints.
//!
//! [`HttpClient`] wraps a pooled `reqwest::Client` with gzip decompression
//! enabled. The pool is shared by every probe and page fetch of an
//! aggregation run and is safe for concurrent use.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Capability to GET a URL and decode the body as JSON.
///
/// Decompression and structured-body decoding are the implementor's
/// responsibility; callers only ever see decoded JSON.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` with the given query parameters, bounded by `timeout`.
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value, TransportError>;
}

/// Default user agent sent to upstream services.
pub const DEFAULT_USER_AGENT: &str = concat!("nad-runtime/", env!("CARGO_PKG_VERSION"));

/// Reqwest-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    headers: HashMap<String, String>,
}

impl HttpClient {
    /// Build a client with the given user agent.
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            headers: HashMap::new(),
        })
    }

    /// Attach a header to every request (e.g. a pass-through credential).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let mut request = self.client.get(url).query(query).timeout(timeout);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| classify(url, timeout, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| classify(url, timeout, e))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn classify(url: &str, timeout: Duration, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if err.is_decode() || err.is_body() {
        TransportError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_json_decodes_body_and_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/FeatureServer/0"))
            .and(query_param("f", "json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"maxRecordCount": 2000})),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT).unwrap();
        let url = format!("{}/FeatureServer/0", server.uri());
        let body = client
            .get_json(&url, &[("f".into(), "json".into())], Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(body["maxRecordCount"], 2000);
    }

    #[tokio::test]
    async fn test_get_json_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT).unwrap();
        let url = format!("{}/FeatureServer/0", server.uri());
        let err = client
            .get_json(&url, &[], Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Status { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_json_rejects_non_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT).unwrap();
        let err = client
            .get_json(&server.uri(), &[], Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_get_json_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT).unwrap();
        let err = client
            .get_json(&server.uri(), &[], Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_extra_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Esri-Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT)
            .unwrap()
            .with_header("X-Esri-Authorization", "Bearer abc");
        let body = client
            .get_json(&server.uri(), &[], Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
    }
}
