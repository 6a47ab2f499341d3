//! `nad fetch`: run one aggregation and emit the collection.

use crate::cli::output::{self, Styled};
use crate::config::NadConfig;
use crate::pipeline::aggregator::AggregateReport;
use crate::provider::{DataRequest, Provider};
use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aggregate every configured source once.
///
/// The collection goes to `output_path` or stdout; the per-source summary
/// goes to stderr (or stdout as JSON when writing to a file in `--json` mode).
pub async fn run(config: &NadConfig, output_path: Option<&Path>) -> Result<()> {
    let provider = Provider::from_config(config, super::http_transport(config)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received interrupt, cancelling aggregation");
        on_signal.cancel();
    });

    let result = provider
        .get_data_until(&DataRequest::default(), &cancel)
        .await
        .context("aggregation failed")?;

    let body = serde_json::to_string_pretty(&result).context("failed to encode collection")?;
    match output_path {
        Some(path) => {
            std::fs::write(path, body)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if output::is_json() {
                output::print_json(&serde_json::to_value(&result.report)?);
                return Ok(());
            }
        }
        None => println!("{body}"),
    }

    if !output::is_quiet() {
        print_summary(&Styled::new(), &result.report, result.features.len(), output_path);
    }
    Ok(())
}

fn print_summary(s: &Styled, report: &AggregateReport, features: usize, output_path: Option<&Path>) {
    eprintln!();
    output::print_header(s);
    for source in &report.sources {
        let (symbol, value) = match &source.error {
            Some(_) => (s.fail_sym(), s.red("unreachable")),
            None if source.pages_failed > 0 || source.records_dropped > 0 => (
                s.warn_sym(),
                s.yellow(&format!(
                    "{} features, {}/{} pages failed, {} records dropped",
                    source.features, source.pages_failed, source.pages, source.records_dropped
                )),
            ),
            None => (
                s.ok_sym(),
                format!("{} features from {} pages", source.features, source.pages),
            ),
        };
        output::print_check(symbol, "Source:", &source.url);
        output::print_detail(&value);
        if let Some(err) = &source.error {
            output::print_detail(&s.dim(err));
        }
    }

    eprintln!();
    let target = output_path
        .map(|p| format!(" -> {}", p.display()))
        .unwrap_or_default();
    eprintln!(
        "  {} {} features in {}{target}",
        s.bold("Total:"),
        s.green(&features.to_string()),
        output::format_elapsed(report.elapsed_ms)
    );
}
