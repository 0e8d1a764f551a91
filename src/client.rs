//! Shared HTTP client plumbing.
//!
//! A single pooled `reqwest::Client` is built at startup and shared by the
//! discovery, reader and forwarder components. `ClientError` is the common
//! transport-level error type; each component wraps it in its own error enum.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::config::Config;

/// Failure of one HTTP exchange with the discovery endpoint, a bridge or the
/// metrics backend.
#[derive(Debug)]
pub enum ClientError {
    /// No usable response: connection refused, reset, DNS, TLS
    Transport(reqwest::Error),

    /// The peer answered with a status the caller does not accept
    Status { code: StatusCode, message: String },

    /// The retry loop gave up; `attempts` includes the first one
    RetriesExhausted { attempts: u32, last_error: String },

    /// The per-request timeout elapsed
    Timeout,

    /// The shared client could not be built
    Config(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "Upstream unreachable: {}", e),
            ClientError::Status { code, message } if message.is_empty() => {
                write!(f, "Upstream answered {}", code)
            }
            ClientError::Status { code, message } => {
                write!(f, "Upstream answered {}: {}", code, message)
            }
            ClientError::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "Gave up after {} attempts ({})", attempts, last_error),
            ClientError::Timeout => write!(f, "Upstream request timed out"),
            ClientError::Config(e) => write!(f, "Cannot build HTTP client: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Transport(err)
        }
    }
}

impl ClientError {
    /// Whether another attempt might succeed: lost connections, timeouts and
    /// statuses accepted by [`is_retryable_status`].
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_connect() || e.is_request(),
            ClientError::Timeout => true,
            ClientError::Status { code, .. } => is_retryable_status(*code),
            ClientError::RetriesExhausted { .. } | ClientError::Config(_) => false,
        }
    }

    /// Build a `Status` error from a rejected response, consuming its body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let code = response.status();
        let message = response.text().await.unwrap_or_default();
        ClientError::Status {
            code,
            message: message.trim().to_string(),
        }
    }
}

/// Whether a status code signals a transient server-side condition.
pub fn is_retryable_status(code: StatusCode) -> bool {
    code.is_server_error() || code == StatusCode::TOO_MANY_REQUESTS
}

/// Build the shared HTTP client (reused for connection pooling).
///
/// # Errors
///
/// Returns `ClientError::Config` if the HTTP client cannot be built.
pub fn build_client(config: &Config) -> Result<Client, ClientError> {
    build_client_with_timeout(config.request_timeout)
}

/// Build an HTTP client with an explicit request timeout.
pub fn build_client_with_timeout(timeout: Duration) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| ClientError::Config(e.to_string()))
}
