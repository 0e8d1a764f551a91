//! Hue to InfluxDB Bridge Library
//!
//! This library discovers Hue bridges, reads their sensors on a fixed schedule
//! and forwards the readings to InfluxDB as line protocol:
//!
//! - **config**: Environment-based configuration
//! - **client**: Shared HTTP client and transport error type
//! - **retry**: Bounded exponential backoff for outbound calls
//! - **discovery**: Bridge discovery through the public discovery endpoint
//! - **sensor**: Typed sensor records decoded from bridge descriptors
//! - **reader**: Per-bridge sensor reads with tolerant decoding
//! - **metric**: Sensor to metric conversion and line protocol encoding
//! - **forwarder**: Metric delivery to the InfluxDB write endpoint
//! - **scheduler**: Startup discovery and the periodic poll loop
//!
//! # Example
//!
//! ```no_run
//! use hue_influx_bridge::client::build_client;
//! use hue_influx_bridge::config::Config;
//! use hue_influx_bridge::discovery::BridgeDiscovery;
//! use hue_influx_bridge::forwarder::MetricForwarder;
//! use hue_influx_bridge::reader::SensorReader;
//! use hue_influx_bridge::scheduler::Scheduler;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let client = build_client(&config).expect("Failed to create client");
//!
//!     let discovery =
//!         BridgeDiscovery::new(client.clone(), &config.discovery_url, config.retry_policy());
//!     let reader = SensorReader::new(client.clone(), &config.api_key, config.resource_scope);
//!     let forwarder = MetricForwarder::new(
//!         client,
//!         &config.influx_address,
//!         config.retry_policy(),
//!         config.status_check,
//!     );
//!
//!     let mut scheduler = Scheduler::new(discovery, reader, forwarder, config.poll_interval);
//!     scheduler.run(CancellationToken::new()).await.ok();
//! }
//! ```

// Module declarations
pub mod client;
pub mod config;
pub mod discovery;
pub mod forwarder;
pub mod metric;
pub mod reader;
pub mod retry;
pub mod scheduler;
pub mod sensor;

// Re-export commonly used types at crate root for convenience
pub use client::ClientError;
pub use config::{Config, ConfigError};
pub use discovery::{Bridge, BridgeDiscovery, DiscoveryError};
pub use forwarder::{Delivery, ForwardError, ForwardStats, MetricForwarder, StatusCheck};
pub use metric::MetricRecord;
pub use reader::{ReaderError, ResourceScope, SensorBatch, SensorReader};
pub use retry::RetryPolicy;
pub use scheduler::{CycleReport, Scheduler, SchedulerError, SchedulerState};
pub use sensor::{SensorKind, SensorRecord};
