//! Delivers encoded metrics to the InfluxDB write endpoint.
//!
//! Every metric is one POST with an opaque line protocol body. Transient
//! failures are retried with backoff; exhausting the retries is fatal for the
//! whole service, so the caller is expected to stop on `Err`.

use std::sync::RwLock;

use reqwest::{Client, StatusCode};
use tracing::{debug, error};

use crate::client::ClientError;
use crate::retry::RetryPolicy;

/// Content type of the write request body.
pub const CONTENT_TYPE: &str = "application/octet-stream";

/// How the backend's HTTP status code is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCheck {
    /// Any response counts as delivered; the status code is only logged
    #[default]
    Ignore,

    /// 2xx is delivered, 5xx/429 are retried, anything else is fatal
    Enforce,
}

/// Errors from metric delivery. All of them are fatal for the service.
#[derive(Debug)]
pub enum ForwardError {
    /// Retries exhausted, transport failure, or a rejected write
    Transport(ClientError),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Transport(e) => write!(f, "Metric delivery failed: {}", e),
        }
    }
}

impl std::error::Error for ForwardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForwardError::Transport(e) => Some(e),
        }
    }
}

impl From<ClientError> for ForwardError {
    fn from(err: ClientError) -> Self {
        ForwardError::Transport(err)
    }
}

/// Outcome of one successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Status code of the final response
    pub status: StatusCode,

    /// Attempts used, 1 when no retry was needed
    pub attempts: u32,
}

impl Delivery {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Running totals across the forwarder's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Metrics acknowledged by the backend
    pub metrics_sent: u64,

    /// Retries performed across all deliveries
    pub retries: u64,

    /// Deliveries that failed permanently
    pub failures: u64,
}

/// HTTP forwarder for line protocol metrics.
pub struct MetricForwarder {
    client: Client,
    url: String,
    policy: RetryPolicy,
    status_check: StatusCheck,
    stats: RwLock<ForwardStats>,
}

impl MetricForwarder {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        policy: RetryPolicy,
        status_check: StatusCheck,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            policy,
            status_check,
            stats: RwLock::new(ForwardStats::default()),
        }
    }

    /// Get the configured write URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status_check(&self) -> StatusCheck {
        self.status_check
    }

    /// Deliver one encoded metric.
    pub async fn forward(&self, line: &str) -> Result<Delivery, ForwardError> {
        debug!(url = %self.url, line = line, "Forwarding metric");

        let result = self
            .policy
            .run("metric delivery", || self.send_request(line))
            .await;

        match result {
            Ok(attempted) => {
                let delivery = Delivery {
                    status: attempted.value,
                    attempts: attempted.attempts,
                };
                if let Ok(mut stats) = self.stats.write() {
                    stats.metrics_sent += 1;
                    stats.retries += u64::from(delivery.retries());
                }
                Ok(delivery)
            }
            Err(e) => {
                if let Ok(mut stats) = self.stats.write() {
                    stats.failures += 1;
                    if let ClientError::RetriesExhausted { attempts, .. } = &e {
                        stats.retries += u64::from(attempts.saturating_sub(1));
                    }
                }
                error!(error = %e, "Metric delivery failed");
                Err(e.into())
            }
        }
    }

    /// Send a single HTTP request without retry logic.
    async fn send_request(&self, line: &str) -> Result<StatusCode, ClientError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(line.to_owned())
            .send()
            .await?;

        let status = response.status();
        match self.status_check {
            StatusCheck::Ignore => {
                if !status.is_success() {
                    debug!(status = %status, "Backend returned non-success status, ignored");
                }
                Ok(status)
            }
            StatusCheck::Enforce if status.is_success() => Ok(status),
            StatusCheck::Enforce => Err(ClientError::from_response(response).await),
        }
    }

    /// Get current forwarder statistics.
    pub fn stats(&self) -> ForwardStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }
}
