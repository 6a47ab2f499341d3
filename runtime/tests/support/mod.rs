//! In-memory ArcGIS transport for deterministic pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use nad_runtime::acquisition::http_client::Transport;
use nad_runtime::config::{FetchSettings, SourceDescriptor};
use nad_runtime::error::TransportError;
use nad_runtime::normalize::CanonicalField;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Canned answer for one request key.
pub enum Reply {
    Json(Value),
    Status(u16),
    /// Never completes.
    Hang,
    /// Fails with HTTP 503 `n` times, then answers.
    FailTimes(usize, Value),
    /// Answers after a delay.
    Delayed(Duration, Value),
}

/// Transport that answers from a table keyed by [`request_key`].
///
/// Unknown keys answer HTTP 404.
#[derive(Default)]
pub struct FakeTransport {
    replies: HashMap<String, Reply>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// URL plus the query parameters that distinguish probes and pages.
pub fn request_key(url: &str, query: &[(String, String)]) -> String {
    let mut key = url.to_string();
    for (name, value) in query {
        match name.as_str() {
            "returnCountOnly" | "returnIdsOnly" | "resultOffset" => {
                key.push_str(&format!("?{name}={value}"));
            }
            "where" if value != "1=1" => key.push_str(&format!("?where={value}")),
            _ => {}
        }
    }
    key
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, key: impl Into<String>, reply: Reply) -> Self {
        self.replies.insert(key.into(), reply);
        self
    }

    /// Layer metadata and record count for an offset-paginated layer 0.
    pub fn paginated_layer(self, base: &str, count: u64, page_size: u32) -> Self {
        self.reply(
            format!("{base}/0"),
            Reply::Json(json!({
                "maxRecordCount": page_size,
                "advancedQueryCapabilities": {"supportsPagination": true}
            })),
        )
        .reply(
            format!("{base}/0/query?returnCountOnly=true"),
            Reply::Json(json!({"count": count})),
        )
    }

    /// A query page at `offset` holding `features`.
    pub fn page(self, base: &str, offset: u64, features: Value) -> Self {
        self.page_reply(base, offset, Reply::Json(json!({"features": features})))
    }

    pub fn page_reply(self, base: &str, offset: u64, reply: Reply) -> Self {
        self.reply(format!("{base}/0/query?resultOffset={offset}"), reply)
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        _timeout: Duration,
    ) -> Result<Value, TransportError> {
        let key = request_key(url, query);
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(key.clone()).or_default();
            *n += 1;
            *n
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let status = |status| TransportError::Status {
            url: url.to_string(),
            status,
        };
        match self.replies.get(&key) {
            None => Err(status(404)),
            Some(Reply::Json(body)) => Ok(body.clone()),
            Some(Reply::Status(code)) => Err(status(*code)),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::FailTimes(n, body)) if call <= *n => {
                let _ = body;
                Err(status(503))
            }
            Some(Reply::FailTimes(_, body)) => Ok(body.clone()),
            Some(Reply::Delayed(delay, body)) => {
                tokio::time::sleep(*delay).await;
                Ok(body.clone())
            }
        }
    }
}

/// Fast, retry-free settings for tests.
pub fn test_settings() -> FetchSettings {
    FetchSettings {
        request_timeout_ms: 2_000,
        max_concurrent_requests: 8,
        min_delay_ms: 0,
        max_retries: 0,
        retry_base_delay_ms: 1,
        ..FetchSettings::default()
    }
}

/// Source whose field map covers the attributes produced by [`address`].
pub fn source(url: &str) -> SourceDescriptor {
    let field_map: BTreeMap<CanonicalField, String> = [
        (CanonicalField::State, "STATE"),
        (CanonicalField::StreetName, "STREET"),
        (CanonicalField::AddressNumber, "HOUSENUM"),
    ]
    .into_iter()
    .map(|(f, n)| (f, n.to_string()))
    .collect();
    SourceDescriptor::new(url, field_map)
}

/// An Esri point feature with address attributes and one unmapped attribute.
pub fn address(oid: i64, street: &str, x: f64, y: f64) -> Value {
    json!({
        "attributes": {
            "OBJECTID": oid,
            "STATE": "NC",
            "STREET": street,
            "HOUSENUM": oid * 10,
            "GlobalID": format!("{{{oid:08}}}")
        },
        "geometry": {"x": x, "y": y}
    })
}
