//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the polling daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nanogrid_api::{RestApiBuilder, StoreReadingsProvider};
use nanogrid_common::config::{AppConfig, FetchMode};
use nanogrid_common::logging::init_tracing;
use nanogrid_core::{
    project, Catalog, HttpDocumentSource, PollCycle, PollScheduler, Poller, ReadingStore,
};
use nanogrid_metrics::{new_registry, register_build_info, spawn_http_server, PollMetrics};
use tokio::signal;
use tracing::{info, warn};

const SERVICE_NAME: &str = "nanogridd";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "CTEK Nanogrid Air polling daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the device host")]
    host: Option<String>,

    #[arg(long, help = "Override the device port")]
    port: Option<u16>,

    #[arg(
        long,
        env = "NANOGRID_PASSWORD",
        hide_env_values = true,
        help = "Override the device password"
    )]
    password: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "Override the poll interval")]
    interval: Option<u64>,

    #[arg(long, value_name = "MODE", help = "per-reading or per-endpoint")]
    fetch_mode: Option<FetchMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Commands {
    #[command(about = "Poll on an interval and serve readings until interrupted")]
    Run,
    #[command(about = "Run a single poll cycle and print the readings as JSON")]
    Once,
    #[command(about = "Print the reading catalog")]
    Catalog,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/nanogrid.toml"));

    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::Catalog = command {
        let extras = AppConfig::load(&candidates)
            .map(|config| config.readings)
            .unwrap_or_default();
        print_catalog(&Catalog::with_extras(&extras)?);
        return Ok(());
    }

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    apply_overrides(&mut config, &cli);
    config.validate().context("invalid configuration after CLI overrides")?;

    init_tracing(SERVICE_NAME, &config.logging)?;
    info!(
        config_path = %loaded.source.display(),
        device = %config.device.base_url(),
        fetch_mode = ?config.polling.fetch_mode,
        "configuration loaded"
    );

    let catalog = Arc::new(Catalog::with_extras(&config.readings)?);
    let store = Arc::new(ReadingStore::for_catalog(&catalog));
    let source = HttpDocumentSource::new(config.device.clone(), config.polling.timeout)
        .context("failed to build http client")?;

    let registry = new_registry();
    register_build_info(&registry, env!("CARGO_PKG_VERSION"), SERVICE_NAME)?;
    let metrics = PollMetrics::new(registry.clone())?;

    let cycle = PollCycle::new(
        catalog.clone(),
        Poller::new(Arc::new(source)),
        store.clone(),
        config.polling.fetch_mode,
    )
    .with_metrics(metrics);

    match command {
        Commands::Once => {
            let report = cycle.run().await;
            let output = serde_json::json!({
                "readings": project(&catalog, &store),
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        _ => run_daemon(config, catalog, store, cycle, registry).await,
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.device.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.device.port = port;
    }
    if let Some(password) = &cli.password {
        config.device.password = password.clone();
    }
    if let Some(interval) = cli.interval {
        config.polling.interval = Duration::from_secs(interval);
    }
    if let Some(mode) = cli.fetch_mode {
        config.polling.fetch_mode = mode;
    }
}

async fn run_daemon(
    config: AppConfig,
    catalog: Arc<Catalog>,
    store: Arc<ReadingStore>,
    cycle: PollCycle,
    registry: nanogrid_metrics::SharedRegistry,
) -> Result<()> {
    let scheduler = PollScheduler::spawn(Arc::new(cycle), config.polling.interval);

    let api = if config.api.enabled {
        let provider = StoreReadingsProvider::new(catalog.clone(), store.clone())
            .with_reports(scheduler.reports());
        Some(
            RestApiBuilder::new(config.api.listen, Arc::new(provider))
                .spawn()
                .await
                .context("failed to start rest api")?,
        )
    } else {
        None
    };

    let metrics_server = if config.metrics.enabled {
        Some(spawn_http_server(registry, config.metrics.listen).await?)
    } else {
        None
    };

    info!(readings = catalog.len(), "daemon running; press Ctrl+C to stop");
    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    scheduler.shutdown().await?;
    if let Some(api) = api {
        if let Err(err) = api.shutdown().await {
            warn!(error = %err, "rest api shutdown failed");
        }
    }
    if let Some(server) = metrics_server {
        if let Err(err) = server.shutdown().await {
            warn!(error = %err, "metrics server shutdown failed");
        }
    }
    info!(known = store.known_count(), "daemon stopped");
    Ok(())
}

fn print_catalog(catalog: &Catalog) {
    println!(
        "{:<28} {:<10} {:<26} {:<5} {}",
        "ID", "ENDPOINT", "PATH", "UNIT", "NAME"
    );
    for descriptor in catalog.iter() {
        println!(
            "{:<28} {:<10} {:<26} {:<5} {}",
            descriptor.id,
            descriptor.endpoint.as_str(),
            descriptor.path.as_str(),
            descriptor.unit.as_deref().unwrap_or("-"),
            descriptor.name
        );
    }
}
