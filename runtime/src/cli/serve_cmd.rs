//! `nad serve`: expose `get_data` over HTTP.

use crate::cli::output::{self, Styled};
use crate::config::NadConfig;
use crate::pipeline::aggregator::Aggregator;
use crate::provider::{Provider, SourceCatalog};
use crate::server;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve until interrupted.
///
/// The source list is re-read from `config_path` on every request. Fetch and
/// output settings are fixed at startup.
pub async fn run(config: &NadConfig, config_path: PathBuf, bind: Option<&str>) -> Result<()> {
    let s = Styled::new();
    let bind = bind.unwrap_or(&config.bind);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    let provider = Provider::new(
        Aggregator::from_config(config, super::http_transport(config)?),
        SourceCatalog::File(config_path),
    );

    info!("starting NAD v{}", env!("CARGO_PKG_VERSION"));
    if !output::is_quiet() {
        eprintln!(
            "  {} NAD v{} serving {} source(s)",
            s.ok_sym(),
            env!("CARGO_PKG_VERSION"),
            config.sources.len()
        );
        eprintln!("  Listening on {}", s.green(&format!("http://{bind}/nad/")));
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        signal.cancel();
    });

    server::serve(listener, Arc::new(provider), shutdown)
        .await
        .context("server error")?;

    if !output::is_quiet() {
        eprintln!("  {} NAD stopped.", s.ok_sym());
    }
    Ok(())
}
