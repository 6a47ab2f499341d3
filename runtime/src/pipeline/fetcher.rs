//! Single-page retrieval with bounded retry.

use crate::error::{NadError, Result, TransportError};
use crate::normalize::feature::RawRecord;
use crate::normalize::geometry::spatial_reference_wkid;
use crate::pipeline::paginator::PageDescriptor;
use crate::pipeline::{service_error, FetchContext};
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Records of one successfully fetched page.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub index: usize,
    pub records: Vec<RawRecord>,
    /// Entries of `features` that were not Esri feature objects.
    pub malformed: usize,
}

/// Why one attempt failed, and whether another attempt may help.
struct AttemptError {
    reason: String,
    retryable: bool,
}

impl From<TransportError> for AttemptError {
    fn from(err: TransportError) -> Self {
        Self {
            retryable: err.is_retryable(),
            reason: err.to_string(),
        }
    }
}

/// Fetches and parses query pages.
pub struct PageFetcher {
    ctx: FetchContext,
}

impl PageFetcher {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    /// Fetch one page, retrying transient failures with exponential backoff.
    pub async fn fetch_page(&self, desc: &PageDescriptor) -> Result<FetchedPage> {
        let max_attempts = self.ctx.settings.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(desc).await {
                Ok(page) => return Ok(page),
                Err(err) if err.retryable && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    debug!(
                        source = desc.source.label(),
                        page = desc.index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying page: {}",
                        err.reason
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(NadError::page_fetch(&desc.source.url, desc.index, err.reason));
                }
            }
        }
    }

    async fn attempt(&self, desc: &PageDescriptor) -> std::result::Result<FetchedPage, AttemptError> {
        let body = self.ctx.get_json(&desc.request.url, &desc.request.query).await?;

        if let Some((code, message)) = service_error(&body) {
            return Err(AttemptError {
                reason: format!("service error: {message}"),
                retryable: code.is_some_and(|c| c == 429 || c >= 500),
            });
        }

        parse_page(desc.index, body).map_err(|reason| AttemptError {
            reason,
            retryable: false,
        })
    }

    /// `base * 2^(attempt-1)` plus up to half a base step of jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.ctx.settings.retry_base_delay_ms;
        let exp = base.saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter = if base > 1 {
            rand::thread_rng().gen_range(0..base / 2)
        } else {
            0
        };
        Duration::from_millis(exp.saturating_add(jitter))
    }
}

/// Split a query response into raw records.
fn parse_page(index: usize, body: Value) -> std::result::Result<FetchedPage, String> {
    let page_wkid = spatial_reference_wkid(body.get("spatialReference"));

    let Value::Object(mut obj) = body else {
        return Err("response is not a JSON object".to_string());
    };
    let Some(Value::Array(features)) = obj.remove("features") else {
        return Err("response has no features array".to_string());
    };

    let mut records = Vec::with_capacity(features.len());
    let mut malformed = 0;
    for feature in features {
        match serde_json::from_value::<RawRecord>(feature) {
            Ok(mut record) => {
                record.page_wkid = page_wkid;
                records.push(record);
            }
            Err(e) => {
                warn!(page = index, "dropping malformed record: {e}");
                malformed += 1;
            }
        }
    }

    Ok(FetchedPage {
        index,
        records,
        malformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_page_attaches_page_spatial_reference() {
        let body = json!({
            "spatialReference": {"wkid": 4326},
            "features": [
                {"attributes": {"A": 1}, "geometry": {"x": 1.0, "y": 2.0}},
                {"attributes": {"A": 2}, "geometry": {"x": 3.0, "y": 4.0}}
            ]
        });
        let page = parse_page(3, body).unwrap();
        assert_eq!(page.index, 3);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.malformed, 0);
        assert!(page.records.iter().all(|r| r.page_wkid == Some(4326)));
    }

    #[test]
    fn test_parse_page_counts_malformed_records() {
        let body = json!({"features": [
            {"attributes": {"A": 1}},
            {"attributes": "oops"},
            42
        ]});
        let page = parse_page(0, body).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.malformed, 2);
    }

    #[test]
    fn test_parse_page_requires_features() {
        assert!(parse_page(0, json!({"count": 3})).is_err());
        assert!(parse_page(0, json!([1, 2])).is_err());
        assert!(parse_page(0, json!({"features": []})).unwrap().records.is_empty());
    }
}
