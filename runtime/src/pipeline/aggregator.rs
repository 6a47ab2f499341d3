//! Top-level aggregation across sources.

use crate::acquisition::http_client::Transport;
use crate::config::{FetchSettings, NadConfig, SourceDescriptor};
use crate::error::{NadError, Result};
use crate::normalize::feature::CanonicalFeature;
use crate::normalize::field_map::is_unmapped;
use crate::pipeline::source::{SourcePipeline, SourceReport};
use crate::pipeline::FetchContext;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

/// Static descriptive metadata attached to every result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionMetadata {
    pub name: String,
    pub description: String,
}

impl Default for CollectionMetadata {
    fn default() -> Self {
        Self {
            name: "Nationwide Address Dataset".to_string(),
            description: "Addresses proxied by http://koopjs.github.io/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionType {
    FeatureCollection,
}

/// How a run went, source by source. Not part of the serialized result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub sources: Vec<SourceReport>,
    /// Features removed by the `dropUnmapped` filter.
    pub unmapped_dropped: usize,
}

impl AggregateReport {
    pub fn sources_failed(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn pages_failed(&self) -> usize {
        self.sources.iter().map(|s| s.pages_failed).sum()
    }

    pub fn records_dropped(&self) -> usize {
        self.sources.iter().map(|s| s.records_dropped).sum()
    }
}

/// The merged GeoJSON `FeatureCollection` returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    #[serde(rename = "type")]
    pub kind: CollectionType,
    pub features: Vec<CanonicalFeature>,
    pub metadata: CollectionMetadata,
    /// Seconds a cache may serve this result.
    pub ttl: u64,
    #[serde(skip)]
    pub report: AggregateReport,
}

/// Output settings for an [`Aggregator`].
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSettings {
    pub ttl: u64,
    pub metadata: CollectionMetadata,
    pub drop_unmapped: bool,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            ttl: 60,
            metadata: CollectionMetadata::default(),
            drop_unmapped: false,
        }
    }
}

/// Runs every source concurrently and merges their features.
pub struct Aggregator {
    pipeline: SourcePipeline,
    settings: AggregateSettings,
}

impl Aggregator {
    /// Aggregator whose requests share one limiter built from `fetch`.
    pub fn new(transport: Arc<dyn Transport>, fetch: FetchSettings, settings: AggregateSettings) -> Self {
        Self {
            pipeline: SourcePipeline::new(FetchContext::new(transport, fetch)),
            settings,
        }
    }

    pub fn from_config(config: &NadConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            transport,
            config.fetch.clone(),
            AggregateSettings {
                ttl: config.ttl,
                metadata: config.metadata.clone(),
                drop_unmapped: config.drop_unmapped,
            },
        )
    }

    pub fn settings(&self) -> &AggregateSettings {
        &self.settings
    }

    /// Aggregate all sources. Never fails; a source that fails contributes
    /// no features and is recorded in `report`.
    ///
    /// Features are ordered by source, then page, then record.
    pub async fn aggregate(&self, sources: &[SourceDescriptor]) -> AggregateResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("aggregate", run_id = %run_id, sources = sources.len());
        self.run(run_id, sources).instrument(span).await
    }

    /// [`Self::aggregate`], abandoned as soon as `cancel` fires.
    ///
    /// Cancellation drops every outstanding probe and page request.
    pub async fn aggregate_until(
        &self,
        sources: &[SourceDescriptor],
        cancel: &CancellationToken,
    ) -> Result<AggregateResult> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("aggregation cancelled by caller");
                Err(NadError::Cancelled)
            }
            result = self.aggregate(sources) => Ok(result),
        }
    }

    async fn run(&self, run_id: String, sources: &[SourceDescriptor]) -> AggregateResult {
        let started_at = Utc::now();
        let start = Instant::now();

        let outcomes = join_all(
            sources
                .iter()
                .map(|source| self.pipeline.run(Arc::new(source.clone()))),
        )
        .await;

        let mut features = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        let mut unmapped_dropped = 0;
        for outcome in outcomes {
            if self.settings.drop_unmapped {
                let before = outcome.features.len();
                let kept: Vec<_> = outcome
                    .features
                    .into_iter()
                    .filter(|f| !is_unmapped(f))
                    .collect();
                unmapped_dropped += before - kept.len();
                features.extend(kept);
            } else {
                features.extend(outcome.features);
            }
            reports.push(outcome.report);
        }

        let report = AggregateReport {
            run_id,
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
            sources: reports,
            unmapped_dropped,
        };

        info!(
            features = features.len(),
            sources_failed = report.sources_failed(),
            pages_failed = report.pages_failed(),
            records_dropped = report.records_dropped(),
            elapsed_ms = report.elapsed_ms,
            "aggregation complete"
        );

        AggregateResult {
            kind: CollectionType::FeatureCollection,
            features,
            metadata: self.settings.metadata.clone(),
            ttl: self.settings.ttl,
            report,
        }
    }
}
