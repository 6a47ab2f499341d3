//! End-to-end run of one source: discover, fetch, normalize.

use crate::config::SourceDescriptor;
use crate::normalize::feature::CanonicalFeature;
use crate::normalize::field_map::CompiledFieldMap;
use crate::normalize::geometry::translate;
use crate::pipeline::fetcher::PageFetcher;
use crate::pipeline::paginator::Paginator;
use crate::pipeline::FetchContext;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-source counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub url: String,
    pub pages: usize,
    pub pages_failed: usize,
    pub records_fetched: usize,
    /// Records lost to malformed entries or geometry translation errors.
    pub records_dropped: usize,
    pub features: usize,
    /// Set when the source as a whole failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub page_errors: Vec<String>,
}

/// Features and counters produced by one source.
#[derive(Debug, Clone, Default)]
pub struct SourceOutcome {
    pub features: Vec<CanonicalFeature>,
    pub report: SourceReport,
}

/// Runs one source's data end to end.
pub struct SourcePipeline {
    paginator: Paginator,
    fetcher: PageFetcher,
}

impl SourcePipeline {
    pub fn new(ctx: FetchContext) -> Self {
        Self {
            paginator: Paginator::new(ctx.clone()),
            fetcher: PageFetcher::new(ctx),
        }
    }

    /// Discover pages, fetch them all concurrently, normalize every record.
    ///
    /// Never fails: a failed probe yields no features and sets
    /// `report.error`; failed pages and untranslatable records are skipped.
    /// Features keep page order, then record order within a page.
    pub async fn run(&self, source: Arc<SourceDescriptor>) -> SourceOutcome {
        let mut report = SourceReport {
            url: source.url.clone(),
            ..SourceReport::default()
        };

        let plan = match self.paginator.discover_pages(&source).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(source = source.label(), "source skipped: {e}");
                report.error = Some(e.to_string());
                return SourceOutcome {
                    features: Vec::new(),
                    report,
                };
            }
        };
        let pages = plan.pages;
        report.pages = pages.len();
        debug!(source = source.label(), pages = pages.len(), "pages discovered");

        // Native keys are resolved once: from the layer's field list, or
        // from the first record when the layer does not declare its fields.
        let mut field_map = CompiledFieldMap::compile(&source.field_map);
        let mut resolved = !plan.fields.is_empty();
        if resolved {
            field_map = field_map.resolve(plan.fields.iter().map(String::as_str));
        }
        let results = join_all(pages.iter().map(|page| self.fetcher.fetch_page(page))).await;

        let mut features = Vec::new();
        for result in results {
            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    warn!(source = source.label(), "page skipped: {e}");
                    report.pages_failed += 1;
                    report.page_errors.push(e.to_string());
                    continue;
                }
            };

            report.records_fetched += page.records.len() + page.malformed;
            report.records_dropped += page.malformed;

            for record in &page.records {
                if !resolved {
                    field_map = field_map.resolve(record.attributes.keys().map(String::as_str));
                    resolved = true;
                }
                match translate(record) {
                    Ok(feature) => features.push(field_map.swizzle(feature, &source.url)),
                    Err(e) => {
                        warn!(source = source.label(), page = page.index, "record dropped: {e}");
                        report.records_dropped += 1;
                    }
                }
            }
        }

        report.features = features.len();
        info!(
            source = source.label(),
            pages = report.pages,
            pages_failed = report.pages_failed,
            features = report.features,
            dropped = report.records_dropped,
            "source complete"
        );

        SourceOutcome { features, report }
    }
}
