//! Bridge discovery via the public Hue discovery endpoint.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::client::ClientError;
use crate::retry::RetryPolicy;

/// A Hue bridge on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Bridge {
    /// Bridge identifier (opaque)
    pub id: String,

    /// Local address, optionally with a port
    #[serde(rename = "internalipaddress")]
    pub address: String,
}

impl Bridge {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

/// Errors from bridge discovery. Both variants are fatal for the service.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Endpoint unreachable after retries, or answered with a non-retryable status
    Transport(ClientError),

    /// Response body is not a list of bridge descriptors
    Malformed(serde_json::Error),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::Transport(e) => write!(f, "Bridge discovery failed: {}", e),
            DiscoveryError::Malformed(e) => {
                write!(f, "Malformed bridge discovery response: {}", e)
            }
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::Transport(e) => Some(e),
            DiscoveryError::Malformed(e) => Some(e),
        }
    }
}

impl From<ClientError> for DiscoveryError {
    fn from(err: ClientError) -> Self {
        DiscoveryError::Transport(err)
    }
}

/// Resolves the bridges published by the discovery endpoint.
pub struct BridgeDiscovery {
    client: Client,
    url: String,
    policy: RetryPolicy,
}

impl BridgeDiscovery {
    pub fn new(client: Client, url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            client,
            url: url.into(),
            policy,
        }
    }

    /// Get the configured discovery URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the current bridge list.
    ///
    /// The GET is retried with backoff on transient failures. A body that
    /// does not decode is returned as `DiscoveryError::Malformed` without
    /// retrying.
    pub async fn discover(&self) -> Result<Vec<Bridge>, DiscoveryError> {
        debug!(url = %self.url, "Discovering bridges");

        let body = self
            .policy
            .run("bridge discovery", || self.fetch())
            .await?;

        let bridges = parse_bridges(&body.value)?;

        info!(
            count = bridges.len(),
            attempts = body.attempts,
            "Bridge discovery complete"
        );
        for bridge in &bridges {
            debug!(id = %bridge.id, address = %bridge.address, "Discovered bridge");
        }

        Ok(bridges)
    }

    async fn fetch(&self) -> Result<String, ClientError> {
        let response = self.client.get(&self.url).send().await?;

        if crate::client::is_retryable_status(response.status()) {
            return Err(ClientError::from_response(response).await);
        }

        Ok(response.text().await?)
    }
}

/// Decode a discovery response body.
pub fn parse_bridges(body: &str) -> Result<Vec<Bridge>, DiscoveryError> {
    serde_json::from_str(body).map_err(DiscoveryError::Malformed)
}
