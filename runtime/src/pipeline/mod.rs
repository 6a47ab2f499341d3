//! Fetch, normalize and merge.
//!
//! [`aggregator::Aggregator`] runs one [`source::SourcePipeline`] per source;
//! each pipeline asks the [`paginator::Paginator`] for page descriptors, fans
//! out [`fetcher::PageFetcher`] calls, and normalizes every fetched record.
//! Both fan-out levels join all of their tasks before merging.

pub mod aggregator;
pub mod fetcher;
pub mod paginator;
pub mod source;

use crate::acquisition::http_client::Transport;
use crate::acquisition::rate_limiter::RateLimiter;
use crate::config::FetchSettings;
use crate::error::TransportError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Shared request machinery for one aggregator.
#[derive(Clone)]
pub struct FetchContext {
    pub transport: Arc<dyn Transport>,
    pub limiter: Arc<RateLimiter>,
    pub settings: FetchSettings,
}

impl FetchContext {
    /// Context with a fresh limiter sized from `settings`.
    pub fn new(transport: Arc<dyn Transport>, settings: FetchSettings) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            settings.max_concurrent_requests,
            settings.min_delay_ms,
        ));
        Self {
            transport,
            limiter,
            settings,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.request_timeout_ms)
    }

    /// One paced, deadline-bounded GET.
    ///
    /// The deadline is handed to the transport and also enforced here.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Value, TransportError> {
        let _guard = self.limiter.acquire().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let timeout = self.request_timeout();
        match tokio::time::timeout(timeout, self.transport.get_json(url, query, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                url: url.to_string(),
                timeout_ms: self.settings.request_timeout_ms,
            }),
        }
    }
}

/// ArcGIS reports most failures as HTTP 200 with an `error` object.
///
/// Returns the service error code (if any) and a message.
pub(crate) fn service_error(body: &Value) -> Option<(Option<i64>, String)> {
    let err = body.get("error")?;
    let code = err.get("code").and_then(Value::as_i64);
    let mut message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown service error")
        .to_string();
    if let Some(details) = err.get("details").and_then(Value::as_array) {
        let details: Vec<&str> = details.iter().filter_map(Value::as_str).collect();
        if !details.is_empty() {
            message = format!("{message} ({})", details.join("; "));
        }
    }
    Some((code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_error_extraction() {
        let body = json!({"error": {"code": 400, "message": "Invalid query", "details": ["'where' parameter is invalid"]}});
        let (code, message) = service_error(&body).unwrap();
        assert_eq!(code, Some(400));
        assert_eq!(message, "Invalid query ('where' parameter is invalid)");

        assert!(service_error(&json!({"features": []})).is_none());
    }
}
