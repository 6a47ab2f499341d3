//! The `get_data` entry point invoked once per inbound data request.

use crate::acquisition::http_client::Transport;
use crate::config::{NadConfig, SourceDescriptor};
use crate::error::Result;
use crate::pipeline::aggregator::{AggregateResult, Aggregator};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Parameters forwarded by the routing layer.
///
/// Accepted for forward compatibility; aggregation does not use them yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRequest {
    pub query: HashMap<String, String>,
}

impl DataRequest {
    pub fn new(query: HashMap<String, String>) -> Self {
        Self { query }
    }
}

/// Where the provider gets its source list.
#[derive(Debug, Clone)]
pub enum SourceCatalog {
    /// Fixed list, supplied at construction.
    Static(Vec<SourceDescriptor>),
    /// Re-read from a configuration file on every request.
    File(PathBuf),
}

/// Loads the source catalog and runs the aggregator for each request.
pub struct Provider {
    aggregator: Aggregator,
    catalog: SourceCatalog,
}

impl Provider {
    /// Provider that reads its sources from `catalog`.
    pub fn new(aggregator: Aggregator, catalog: SourceCatalog) -> Self {
        Self {
            aggregator,
            catalog,
        }
    }

    /// Provider over the sources of an already loaded configuration.
    pub fn from_config(config: &NadConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            Aggregator::from_config(config, transport),
            SourceCatalog::Static(config.sources.clone()),
        )
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Current source list.
    pub fn sources(&self) -> Result<Vec<SourceDescriptor>> {
        match &self.catalog {
            SourceCatalog::Static(sources) => Ok(sources.clone()),
            SourceCatalog::File(path) => Ok(NadConfig::from_file(path)?.sources),
        }
    }

    /// Aggregate every configured source.
    ///
    /// Fails only when the source list cannot be loaded; source, page and
    /// record failures degrade the result instead.
    pub async fn get_data(&self, request: &DataRequest) -> Result<AggregateResult> {
        let sources = self.sources()?;
        debug!(params = request.query.len(), sources = sources.len(), "get_data");
        Ok(self.aggregator.aggregate(&sources).await)
    }

    /// [`Self::get_data`] that gives up when `cancel` fires.
    pub async fn get_data_until(
        &self,
        request: &DataRequest,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult> {
        let sources = self.sources()?;
        debug!(params = request.query.len(), sources = sources.len(), "get_data");
        self.aggregator.aggregate_until(&sources, cancel).await
    }
}
