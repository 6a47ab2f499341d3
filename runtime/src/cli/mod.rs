//! CLI subcommand implementations for the `nad` binary.

pub mod fetch_cmd;
pub mod output;
pub mod serve_cmd;
pub mod sources_cmd;

use crate::acquisition::http_client::{HttpClient, Transport};
use crate::config::NadConfig;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Build the reqwest transport described by the configuration.
pub fn http_transport(config: &NadConfig) -> Result<Arc<dyn Transport>> {
    let mut client =
        HttpClient::new(&config.fetch.user_agent).context("failed to build HTTP client")?;
    for (name, value) in &config.fetch.headers {
        client = client.with_header(name, value);
    }
    Ok(Arc::new(client))
}
