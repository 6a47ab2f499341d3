//! Page discovery for ArcGIS FeatureServer layers.
//!
//! 1. `GET {layer}?f=json` for `maxRecordCount`, pagination support and the
//!    object id field.
//! 2. With pagination support: `returnCountOnly` gives the record count and
//!    pages become `resultOffset`/`resultRecordCount` windows.
//! 3. Without it: `returnIdsOnly` gives every object id and pages become
//!    id-range `where` clauses over the sorted ids.

use crate::config::SourceDescriptor;
use crate::error::{NadError, Result};
use crate::pipeline::{service_error, FetchContext};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Used when a layer does not advertise `maxRecordCount`.
pub const DEFAULT_MAX_RECORD_COUNT: u32 = 1000;

/// URL and query parameters for one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

/// Pages of one source plus the attribute names its layer declares.
#[derive(Debug, Clone, Default)]
pub struct PagePlan {
    pub pages: Vec<PageDescriptor>,
    /// Field names from the layer metadata, in layer order. Empty when the
    /// layer does not list its fields.
    pub fields: Vec<String>,
}

/// One page of one source's dataset.
#[derive(Debug, Clone)]
pub struct PageDescriptor {
    pub source: Arc<SourceDescriptor>,
    /// Position in the source's page order.
    pub index: usize,
    pub request: PageRequest,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayerInfo {
    max_record_count: Option<u32>,
    advanced_query_capabilities: Option<AdvancedQueryCapabilities>,
    object_id_field: Option<String>,
    #[serde(default)]
    fields: Vec<LayerField>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvancedQueryCapabilities {
    #[serde(default)]
    supports_pagination: bool,
}

#[derive(Debug, Deserialize)]
struct LayerField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

impl LayerInfo {
    fn supports_pagination(&self) -> bool {
        self.advanced_query_capabilities
            .as_ref()
            .is_some_and(|c| c.supports_pagination)
    }

    fn object_id_field(&self) -> String {
        self.object_id_field
            .clone()
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| f.field_type == "esriFieldTypeOID")
                    .map(|f| f.name.clone())
            })
            .unwrap_or_else(|| "OBJECTID".to_string())
    }
}

/// Discovers the page descriptors of a source.
pub struct Paginator {
    ctx: FetchContext,
}

impl Paginator {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    /// Probe the source and describe every page of its dataset.
    ///
    /// Any probe failure fails the whole source with `SourceUnreachable`.
    /// An empty layer yields no pages.
    pub async fn discover_pages(&self, source: &Arc<SourceDescriptor>) -> Result<PagePlan> {
        let info: LayerInfo = self
            .probe(source, &source.layer_url(), Vec::new())
            .await
            .and_then(|body| {
                serde_json::from_value(body)
                    .map_err(|e| NadError::source_unreachable(&source.url, format!("layer info: {e}")))
            })?;

        let page_size = effective_page_size(info.max_record_count, source.page_size);
        let oid_field = info.object_id_field();

        let requests = if info.supports_pagination() {
            let body = self
                .probe(source, &source.query_url(), vec![
                    ("where".into(), "1=1".into()),
                    ("returnCountOnly".into(), "true".into()),
                ])
                .await?;
            let count = body.get("count").and_then(Value::as_u64).ok_or_else(|| {
                NadError::source_unreachable(&source.url, "count probe returned no count")
            })?;
            debug!(source = source.label(), count, page_size, "paginating by offset");
            offset_windows(count, page_size)
                .into_iter()
                .map(|(offset, size)| offset_request(source, &oid_field, offset, size))
                .collect::<Vec<_>>()
        } else {
            let body = self
                .probe(source, &source.query_url(), vec![
                    ("where".into(), "1=1".into()),
                    ("returnIdsOnly".into(), "true".into()),
                ])
                .await?;
            let ids = parse_object_ids(&body).ok_or_else(|| {
                NadError::source_unreachable(&source.url, "id probe returned no objectIds")
            })?;
            debug!(source = source.label(), count = ids.len(), page_size, "paginating by object id");
            id_ranges(ids, page_size)
                .into_iter()
                .map(|(lo, hi)| id_range_request(source, &oid_field, lo, hi))
                .collect::<Vec<_>>()
        };

        let pages = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| PageDescriptor {
                source: Arc::clone(source),
                index,
                request,
            })
            .collect();
        Ok(PagePlan {
            pages,
            fields: info.fields.into_iter().map(|f| f.name).collect(),
        })
    }

    async fn probe(
        &self,
        source: &SourceDescriptor,
        url: &str,
        mut query: Vec<(String, String)>,
    ) -> Result<Value> {
        query.push(("f".into(), "json".into()));
        if let Some(token) = &source.token {
            query.push(("token".into(), token.clone()));
        }

        let body = self
            .ctx
            .get_json(url, &query)
            .await
            .map_err(|e| NadError::source_unreachable(&source.url, e))?;

        if let Some((code, message)) = service_error(&body) {
            let code = code.map(|c| format!(" {c}")).unwrap_or_default();
            return Err(NadError::source_unreachable(
                &source.url,
                format!("service error{code}: {message}"),
            ));
        }
        Ok(body)
    }
}

/// The layer's cap, lowered by an optional per-source override. Never 0.
fn effective_page_size(max_record_count: Option<u32>, override_size: Option<u32>) -> u32 {
    let cap = max_record_count
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MAX_RECORD_COUNT);
    override_size.map_or(cap, |o| o.min(cap)).max(1)
}

/// `(offset, size)` windows covering `count` records.
fn offset_windows(count: u64, page_size: u32) -> Vec<(u64, u32)> {
    let step = u64::from(page_size);
    (0..count.div_ceil(step))
        .map(|i| (i * step, page_size))
        .collect()
}

/// Inclusive `(lo, hi)` id ranges of at most `page_size` ids each.
fn id_ranges(mut ids: Vec<i64>, page_size: u32) -> Vec<(i64, i64)> {
    ids.sort_unstable();
    ids.dedup();
    ids.chunks(page_size as usize)
        .filter_map(|chunk| Some((*chunk.first()?, *chunk.last()?)))
        .collect()
}

/// `objectIds` may be `null` for an empty layer.
fn parse_object_ids(body: &Value) -> Option<Vec<i64>> {
    match body.get("objectIds")? {
        Value::Null => Some(Vec::new()),
        Value::Array(ids) => Some(ids.iter().filter_map(Value::as_i64).collect()),
        _ => None,
    }
}

fn base_page_query(source: &SourceDescriptor, where_clause: String) -> Vec<(String, String)> {
    let mut query = vec![
        ("where".to_string(), where_clause),
        ("outFields".to_string(), "*".to_string()),
        ("outSR".to_string(), "4326".to_string()),
        ("returnGeometry".to_string(), "true".to_string()),
        ("f".to_string(), "json".to_string()),
    ];
    if let Some(token) = &source.token {
        query.push(("token".to_string(), token.clone()));
    }
    query
}

/// Offset windows are only stable under an explicit sort.
fn offset_request(source: &SourceDescriptor, oid_field: &str, offset: u64, size: u32) -> PageRequest {
    let mut query = base_page_query(source, "1=1".to_string());
    query.push(("orderByFields".to_string(), format!("{oid_field} ASC")));
    query.push(("resultOffset".to_string(), offset.to_string()));
    query.push(("resultRecordCount".to_string(), size.to_string()));
    PageRequest {
        url: source.query_url(),
        query,
    }
}

fn id_range_request(source: &SourceDescriptor, oid_field: &str, lo: i64, hi: i64) -> PageRequest {
    PageRequest {
        url: source.query_url(),
        query: base_page_query(source, format!("{oid_field} >= {lo} AND {oid_field} <= {hi}")),
    }
}
