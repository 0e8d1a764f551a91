//! Poll scheduler driving discovery, reading, transformation and delivery.
//!
//! The scheduler has two states. `Starting` runs discovery and the first poll
//! cycle; `Polling` repeats the poll cycle on a fixed interval until the
//! cancellation token fires or a fatal error occurs. Cycles are strictly
//! sequential: one bridge, one sensor, one metric at a time.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery::{Bridge, BridgeDiscovery, DiscoveryError};
use crate::forwarder::{Delivery, ForwardError, MetricForwarder};
use crate::metric::MetricRecord;
use crate::reader::{ReaderError, SensorBatch, SensorReader};

/// Source of the bridge list.
#[allow(async_fn_in_trait)]
pub trait BridgeSource {
    async fn discover(&self) -> Result<Vec<Bridge>, DiscoveryError>;
}

/// Source of sensor readings for one bridge.
#[allow(async_fn_in_trait)]
pub trait SensorSource {
    async fn read_sensors(&self, bridge: &Bridge) -> Result<SensorBatch, ReaderError>;
}

/// Destination for encoded metrics.
#[allow(async_fn_in_trait)]
pub trait MetricSink {
    async fn forward(&self, line: &str) -> Result<Delivery, ForwardError>;
}

impl BridgeSource for BridgeDiscovery {
    async fn discover(&self) -> Result<Vec<Bridge>, DiscoveryError> {
        BridgeDiscovery::discover(self).await
    }
}

impl SensorSource for SensorReader {
    async fn read_sensors(&self, bridge: &Bridge) -> Result<SensorBatch, ReaderError> {
        SensorReader::read_sensors(self, bridge).await
    }
}

impl MetricSink for MetricForwarder {
    async fn forward(&self, line: &str) -> Result<Delivery, ForwardError> {
        MetricForwarder::forward(self, line).await
    }
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Discovery and the first poll have not completed yet
    Starting,

    /// Steady state: one poll cycle per interval
    Polling,
}

/// Conditions that stop the scheduler.
#[derive(Debug)]
pub enum SchedulerError {
    Discovery(DiscoveryError),
    Forward(ForwardError),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Discovery(e) => write!(f, "{}", e),
            SchedulerError::Forward(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Discovery(e) => Some(e),
            SchedulerError::Forward(e) => Some(e),
        }
    }
}

impl From<DiscoveryError> for SchedulerError {
    fn from(err: DiscoveryError) -> Self {
        SchedulerError::Discovery(err)
    }
}

impl From<ForwardError> for SchedulerError {
    fn from(err: ForwardError) -> Self {
        SchedulerError::Forward(err)
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Bridges whose sensors were read successfully
    pub bridges_polled: usize,

    /// Bridges skipped this cycle because the read failed
    pub bridges_failed: usize,

    /// Descriptors decoded, recognized or not
    pub sensors_read: usize,

    /// Descriptors that failed to decode
    pub entries_skipped: usize,

    /// Decoded descriptors with an unrecognized type
    pub unrecognized: usize,

    /// Metrics acknowledged by the sink
    pub metrics_forwarded: usize,
}

/// Periodic poll scheduler.
pub struct Scheduler<D, R, F> {
    discovery: D,
    reader: R,
    sink: F,
    interval: Duration,
    rediscovery_cycles: Option<u32>,
    state: SchedulerState,
    bridges: Vec<Bridge>,
    cycles: u64,
}

impl<D, R, F> Scheduler<D, R, F>
where
    D: BridgeSource,
    R: SensorSource,
    F: MetricSink,
{
    pub fn new(discovery: D, reader: R, sink: F, interval: Duration) -> Self {
        Self {
            discovery,
            reader,
            sink,
            interval,
            rediscovery_cycles: None,
            state: SchedulerState::Starting,
            bridges: Vec::new(),
            cycles: 0,
        }
    }

    /// Re-run discovery every `cycles` poll cycles. `None` or `Some(0)`
    /// keeps the bridge list from startup.
    pub fn with_rediscovery(mut self, cycles: Option<u32>) -> Self {
        self.rediscovery_cycles = cycles.filter(|n| *n > 0);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Bridges currently being polled.
    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    /// Number of completed poll cycles, including the first one.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The metric sink, e.g. to read delivery totals once the loop stops.
    pub fn sink(&self) -> &F {
        &self.sink
    }

    /// Advance by one step: `start` while starting, `poll_cycle` afterwards.
    pub async fn step(&mut self) -> Result<CycleReport, SchedulerError> {
        match self.state {
            SchedulerState::Starting => self.start().await,
            SchedulerState::Polling => self.poll_cycle().await,
        }
    }

    /// Discover bridges, run the first poll cycle and enter `Polling`.
    ///
    /// The transition happens whatever the number of sensors read. Discovery
    /// and delivery failures are returned and leave the state unchanged.
    pub async fn start(&mut self) -> Result<CycleReport, SchedulerError> {
        info!("Discovering bridges");
        self.bridges = self.discovery.discover().await?;
        info!(bridges = self.bridges.len(), "Running first poll cycle");

        let report = self.poll_bridges().await?;
        self.state = SchedulerState::Polling;
        info!(interval_secs = self.interval.as_secs(), "Entering steady-state polling");
        Ok(report)
    }

    /// Run one steady-state poll cycle over the known bridges.
    pub async fn poll_cycle(&mut self) -> Result<CycleReport, SchedulerError> {
        if self.rediscovery_due() {
            self.rediscover().await;
        }
        self.poll_bridges().await
    }

    /// Run until cancelled or until a fatal error occurs.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        if self.state == SchedulerState::Starting {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Scheduler cancelled before start");
                    return Ok(());
                }
                result = self.start() => {
                    result?;
                }
            }
        }

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(cycles = self.cycles, "Scheduler stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_cycle().await {
                        error!(error = %e, "Poll cycle failed fatally");
                        return Err(e);
                    }
                }
            }
        }
    }

    fn rediscovery_due(&self) -> bool {
        match self.rediscovery_cycles {
            Some(n) => self.cycles > 0 && self.cycles % u64::from(n) == 0,
            None => false,
        }
    }

    /// Refresh the bridge list, keeping the old one if discovery fails.
    async fn rediscover(&mut self) {
        match self.discovery.discover().await {
            Ok(bridges) => {
                if bridges != self.bridges {
                    info!(
                        previous = self.bridges.len(),
                        current = bridges.len(),
                        "Bridge list changed"
                    );
                }
                self.bridges = bridges;
            }
            Err(e) => {
                warn!(error = %e, bridges = self.bridges.len(), "Re-discovery failed, keeping known bridges");
            }
        }
    }

    async fn poll_bridges(&mut self) -> Result<CycleReport, SchedulerError> {
        let mut report = CycleReport::default();

        for bridge in &self.bridges {
            let batch = match self.reader.read_sensors(bridge).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(bridge = %bridge.id, address = %bridge.address, error = %e, "Skipping bridge this cycle");
                    report.bridges_failed += 1;
                    continue;
                }
            };

            report.bridges_polled += 1;
            report.sensors_read += batch.len();
            report.entries_skipped += batch.skipped.len();
            report.unrecognized += batch.unrecognized_count();

            for sensor in batch.recognized() {
                let Some(metric) = MetricRecord::from_sensor(sensor) else {
                    continue;
                };
                let line = metric.to_line_protocol();
                let delivery = self.sink.forward(&line).await?;
                debug!(line = %line, attempts = delivery.attempts, "Metric forwarded");
                report.metrics_forwarded += 1;
            }
        }

        self.cycles += 1;
        info!(
            cycle = self.cycles,
            bridges_polled = report.bridges_polled,
            bridges_failed = report.bridges_failed,
            sensors_read = report.sensors_read,
            entries_skipped = report.entries_skipped,
            unrecognized = report.unrecognized,
            metrics_forwarded = report.metrics_forwarded,
            "Poll cycle complete"
        );
        Ok(report)
    }
}
