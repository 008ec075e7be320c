//! METAR weather publisher service.
//!
//! Publishes airport flight conditions as Lattice entities with:
//! - Rate-limited, batched weather fetches with retry and backoff
//! - Per-airport failure isolation
//! - Prometheus metrics and an HTTP status API

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metar_common::{AirportCatalog, EntityBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use metar_publisher::config::PublisherConfig;
use metar_publisher::error::ConfigError;
use metar_publisher::publisher::{EntityPublisher, LatticePublisher};
use metar_publisher::rate_limit::RateLimiter;
use metar_publisher::scheduler::{PublishScheduler, SchedulerConfig};
use metar_publisher::server::{self, ServerState};
use metar_publisher::weather::{AviationWeatherClient, WeatherFetcher};

#[derive(Parser, Debug)]
#[command(name = "metar-publisher")]
#[command(about = "Publishes METAR flight conditions as Lattice entities")]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long, env = "METAR_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Skip the startup reachability and credential check
    #[arg(long)]
    skip_preflight: bool,

    /// Log level (overrides LOG_LEVEL and the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Port for status HTTP server
    #[arg(long, env = "STATUS_PORT", default_value = "8082")]
    status_port: u16,

    /// Disable status HTTP server
    #[arg(long)]
    no_status_server: bool,

    /// Port for the Prometheus metrics exporter
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = PublisherConfig::load(args.config.as_deref()).context("Invalid configuration")?;

    let level_name = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let level = match level_name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting METAR publisher");

    // Airport selection
    let filter = config.airports.filter();
    let full_catalog = AirportCatalog::new_england();
    for code in full_catalog.unknown_codes(&filter) {
        warn!(code = %code, "Unknown airport code in include/exclude list, ignoring");
    }
    let catalog = full_catalog.filtered(&filter);
    if catalog.is_empty() {
        return Err(ConfigError::Invalid("airport selection matches no airports".to_string()).into());
    }
    info!(count = catalog.len(), airports = %catalog.ids().join(","), "Monitoring airports");

    // Entity platform
    let credentials = config.credentials()?;
    let publisher = Arc::new(LatticePublisher::new(
        credentials,
        Duration::from_secs(config.lattice.request_timeout_secs),
    )?);

    if args.skip_preflight {
        warn!("Skipping entity platform preflight check");
    } else {
        publisher.preflight().await.context("Entity platform preflight failed")?;
    }

    // Weather source
    let source = Arc::new(AviationWeatherClient::new(&config.weather)?);
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
        config.weather.min_request_interval_ms,
    )));
    let fetcher = WeatherFetcher::new(source, limiter, config.retry_policy())
        .with_batch_size(config.weather.batch_size)
        .with_max_concurrent_batches(config.weather.max_concurrent_batches);

    let builder = EntityBuilder::new(config.entity_ttl()).with_integration_name(config.integration.name.clone());

    let scheduler = Arc::new(PublishScheduler::new(
        catalog,
        fetcher,
        publisher,
        builder,
        SchedulerConfig {
            interval: config.update_interval(),
            include_forecast: config.integration.include_forecast,
            publish_concurrency: config.integration.publish_concurrency,
            publish_retry: config.retry_policy(),
        },
    ));

    if let Some(port) = args.metrics_port {
        metar_publisher::metrics::install_exporter(port)?;
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    if !args.no_status_server && !args.once {
        let state = Arc::new(ServerState {
            scheduler: scheduler.clone(),
        });
        let status_port = args.status_port;
        let server_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_server(state, status_port, server_cancel).await {
                error!(error = %e, "Status server failed");
            }
        });
    }

    if args.once {
        info!("Running single publish cycle");
        let report = scheduler.run_cycle(&cancel).await;
        info!(
            published = report.published(),
            total = report.total(),
            failed = ?report.failed_airports(),
            "Single cycle finished"
        );
    } else {
        scheduler.run_forever(cancel.clone()).await;
    }

    cancel.cancel();
    info!("METAR publisher stopped");
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    tokio::signal::ctrl_c().await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        tokio::signal::ctrl_c().await.ok();

        info!("Received shutdown signal");
        token.cancel();
    });
}
