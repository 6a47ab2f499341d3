//! NAD runtime: aggregate paginated ArcGIS feature services into one
//! normalized GeoJSON address collection.
//!
//! The pipeline discovers pages for each configured source, fetches them
//! concurrently, translates Esri JSON geometry into GeoJSON, projects each
//! record's attributes onto the canonical address schema and merges every
//! surviving feature into a single `FeatureCollection` with a `ttl` hint.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod provider;
pub mod server;

pub use config::{NadConfig, SourceDescriptor};
pub use error::{NadError, Result};
pub use pipeline::aggregator::{AggregateResult, Aggregator};
pub use provider::{DataRequest, Provider};
