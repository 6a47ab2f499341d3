//! `nad`: Nationwide Address Dataset aggregator.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nad_runtime::cli::{fetch_cmd, serve_cmd, sources_cmd};
use nad_runtime::NadConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nad", version, about = "Aggregate ArcGIS address services into one GeoJSON collection")]
struct Cli {
    /// Configuration file (default: $NAD_CONFIG, ./nad.json, ~/.nad/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Suppress human-oriented output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve GET /nad/ over HTTP
    Serve {
        /// Listen address (overrides the config file and NAD_BIND)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Aggregate once and print the FeatureCollection
    Fetch {
        /// Write the collection to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List configured sources and their field coverage
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var("NAD_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("NAD_QUIET", "1");
    }
    init_tracing(cli.log_json);

    let config_path = NadConfig::locate(cli.config.as_deref()).context("failed to locate configuration")?;
    let config = NadConfig::load(Some(&config_path))
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command {
        Commands::Serve { bind } => serve_cmd::run(&config, config_path, bind.as_deref()).await,
        Commands::Fetch { output } => fetch_cmd::run(&config, output.as_deref()).await,
        Commands::Sources => sources_cmd::run(&config),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nad_runtime=info,nad=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
