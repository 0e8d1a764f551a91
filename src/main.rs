//! Hue to InfluxDB Bridge - pushes Hue sensor readings to InfluxDB
//!
//! The service discovers Hue bridges once at startup, then polls their
//! temperature and light level sensors every interval and writes one line
//! protocol record per sensor to InfluxDB.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `HUE_API_KEY`: Hue bridge API key
//! - `INFLUX_DB_ADDRESS`: InfluxDB write URL, e.g. http://influx:8086/write?db=hue
//! - `HUE_DISCOVERY_URL`: Discovery endpoint (default: https://discovery.meethue.com/)
//! - `HUE_POLL_INTERVAL_SECS`: Seconds between polls (default: 300)
//! - `HUE_RESOURCE_SCOPE`: `all` or `sensors` (default: all)
//! - `HUE_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
//! - `HUE_MAX_RETRIES`: Retry cap (default: unset, retries until the elapsed ceiling)
//! - `HUE_MAX_RETRY_ELAPSED_SECS`: Retry time ceiling (default: 900)
//! - `INFLUX_CHECK_STATUS`: Treat non-2xx writes as failures (default: false)
//! - `HUE_REDISCOVERY_CYCLES`: Re-discover bridges every N cycles (default: 0, never)
//! - `RUST_LOG`: Logging level filter (default: info)

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hue_influx_bridge::client::build_client;
use hue_influx_bridge::config::Config;
use hue_influx_bridge::discovery::BridgeDiscovery;
use hue_influx_bridge::forwarder::MetricForwarder;
use hue_influx_bridge::reader::SensorReader;
use hue_influx_bridge::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with environment filter
    init_tracing();

    info!("Starting Hue to InfluxDB bridge...");

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                discovery_url = %config.discovery_url,
                influx_address = %config.influx_address,
                poll_interval_secs = config.poll_interval.as_secs(),
                resource_scope = ?config.resource_scope,
                max_retries = ?config.max_retries,
                status_check = ?config.status_check,
                rediscovery_cycles = ?config.rediscovery_cycles,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if config.api_key.is_empty() {
        warn!("HUE_API_KEY is not set, bridges will reject sensor reads");
    }
    if config.influx_address.is_empty() {
        warn!("INFLUX_DB_ADDRESS is not set, metric delivery will fail");
    }

    // Create HTTP client with connection pooling
    let client = match build_client(&config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to create HTTP client");
            std::process::exit(1);
        }
    };

    let discovery = BridgeDiscovery::new(
        client.clone(),
        config.discovery_url.clone(),
        config.retry_policy(),
    );
    let reader = SensorReader::new(client.clone(), config.api_key.clone(), config.resource_scope);
    let forwarder = MetricForwarder::new(
        client,
        config.influx_address.clone(),
        config.retry_policy(),
        config.status_check,
    );

    let mut scheduler = Scheduler::new(discovery, reader, forwarder, config.poll_interval)
        .with_rediscovery(config.rediscovery_cycles);

    // Cancel the scheduler on Ctrl+C
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping...");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let result = scheduler.run(cancel).await;

    let totals = scheduler.sink().stats();
    info!(
        cycles = scheduler.cycles(),
        metrics_sent = totals.metrics_sent,
        retries = totals.retries,
        failures = totals.failures,
        "Forwarder totals"
    );

    match result {
        Ok(()) => info!("Hue to InfluxDB bridge stopped"),
        Err(e) => {
            error!(error = %e, "Fatal error, exiting");
            std::process::exit(1);
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
