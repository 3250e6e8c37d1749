//! Caching Forward Proxy
//!
//! ```text
//!     Browser ──▶ net::listener ──▶ http::relay ──▶ origin server
//!                                    │    │
//!                   security::access ┘    └ cache (lookup / store)
//!                                    │
//!                                    └──▶ observability (stats, access log, CSV)
//!
//!     stdin ──▶ admin::console (block, unblock, list, stats)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use forward_proxy::admin::Console;
use forward_proxy::cache::CacheSweeper;
use forward_proxy::config::{load_config, ProxyConfig};
use forward_proxy::lifecycle::{wait_for_signal, Shutdown};
use forward_proxy::net::Listener;
use forward_proxy::observability::logging::init_logging;
use forward_proxy::observability::metrics::init_metrics;
use forward_proxy::observability::{
    AccessLogSink, CsvTimingSink, ProxyStats, Telemetry, TelemetrySink,
};
use forward_proxy::{ProxyServer, ProxyState};

#[derive(Parser, Debug)]
#[command(name = "forward-proxy", version, about = "Caching forward HTTP/1.1 proxy")]
struct Cli {
    /// Port to listen on; overrides the port of `listener.bind_address`.
    port: Option<u16>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not read admin commands from stdin.
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.set_port(port);
    }

    init_logging(&config.observability)?;

    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        cache_enabled = config.cache.enabled,
        default_ttl_secs = config.cache.default_ttl_secs,
        blocked_hosts = config.access.blocked_hosts.len(),
        "Configuration loaded"
    );

    let stats = Arc::new(ProxyStats::new());
    let telemetry = Telemetry::new(stats.clone(), build_sinks(&config));
    let state = ProxyState::from_config(&config, telemetry);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let shutdown = Shutdown::new();

    let sweeper = CacheSweeper::new(
        state.cache.clone(),
        Duration::from_secs(config.cache.sweep_interval_secs),
    );
    tokio::spawn(sweeper.run(shutdown.subscribe()));

    if config.admin.console_enabled && !cli.no_console {
        let console = Console::new(state.access.clone(), state.cache.clone(), stats.clone());
        tokio::spawn(console.run(shutdown.subscribe()));
    }

    let server = ProxyServer::new(state, Duration::from_secs(config.timeouts.drain_secs));
    let serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    serving.await?;

    let snap = stats.snapshot();
    tracing::info!(
        total = snap.total_requests,
        hits = snap.cache_hits,
        misses = snap.cache_misses,
        blocked = snap.blocked,
        "Shutdown complete"
    );
    Ok(())
}

fn build_sinks(config: &ProxyConfig) -> Vec<Box<dyn TelemetrySink>> {
    let mut sinks: Vec<Box<dyn TelemetrySink>> = vec![Box::new(AccessLogSink)];
    let path = &config.observability.timing_csv_path;
    if !path.is_empty() {
        match CsvTimingSink::open(Path::new(path)) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => tracing::warn!(path = %path, error = %e, "Timing log disabled"),
        }
    }
    sinks
}
