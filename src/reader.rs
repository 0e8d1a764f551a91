//! Reads sensors from a bridge's local REST API.
//!
//! One GET per bridge per cycle, never retried. Each map entry is decoded on
//! its own so a single odd device cannot hide the rest of the fleet.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::discovery::Bridge;
use crate::sensor::{DecodeError, SensorRecord};

/// Which bridge endpoint the sensor map is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceScope {
    /// `/api/<key>/`: the full datastore, sensors taken from its `sensors` object
    #[default]
    All,

    /// `/api/<key>/sensors/`: the sensor map only
    Sensors,
}

impl std::str::FromStr for ResourceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(ResourceScope::All),
            "sensors" => Ok(ResourceScope::Sensors),
            other => Err(format!(
                "unknown resource scope '{}', expected 'all' or 'sensors'",
                other
            )),
        }
    }
}

impl ResourceScope {
    /// Build the resource URL for a bridge.
    pub fn url(&self, bridge: &Bridge, api_key: &str) -> String {
        match self {
            ResourceScope::All => format!("http://{}/api/{}/", bridge.address, api_key),
            ResourceScope::Sensors => {
                format!("http://{}/api/{}/sensors/", bridge.address, api_key)
            }
        }
    }
}

/// Errors that prevent reading any sensor from one bridge.
#[derive(Debug)]
pub enum ReaderError {
    /// Request failed or the bridge answered with an error status
    Transport(ClientError),

    /// Bridge answered with its error envelope (e.g. unauthorized user)
    Api { kind: u32, description: String },

    /// Body is neither a resource map nor an error envelope
    Malformed(serde_json::Error),
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::Transport(e) => write!(f, "Bridge request failed: {}", e),
            ReaderError::Api { kind, description } => {
                write!(f, "Bridge API error {}: {}", kind, description)
            }
            ReaderError::Malformed(e) => write!(f, "Malformed bridge response: {}", e),
        }
    }
}

impl std::error::Error for ReaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReaderError::Transport(e) => Some(e),
            ReaderError::Malformed(e) => Some(e),
            ReaderError::Api { .. } => None,
        }
    }
}

impl From<ClientError> for ReaderError {
    fn from(err: ClientError) -> Self {
        ReaderError::Transport(err)
    }
}

impl From<reqwest::Error> for ReaderError {
    fn from(err: reqwest::Error) -> Self {
        ReaderError::Transport(err.into())
    }
}

/// The bridge reports failures as `[{"error": {...}}]` with HTTP 200.
#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    kind: u32,

    #[serde(default)]
    description: String,
}

/// A descriptor that failed to decode, kept for reporting.
#[derive(Debug)]
pub struct SkippedEntry {
    /// Bridge-local resource id
    pub id: String,
    pub error: DecodeError,
}

/// Decoded sensors of one bridge for one cycle.
#[derive(Debug, Default)]
pub struct SensorBatch {
    /// Successfully decoded records, recognized or not, keyed by sensor id
    pub sensors: Vec<(String, SensorRecord)>,

    /// Entries that could not be decoded
    pub skipped: Vec<SkippedEntry>,
}

impl SensorBatch {
    /// Records with a recognized type, in sensor id order.
    pub fn recognized(&self) -> impl Iterator<Item = &SensorRecord> {
        self.sensors
            .iter()
            .map(|(_, record)| record)
            .filter(|record| record.is_recognized())
    }

    /// Number of decoded records with an unrecognized type.
    pub fn unrecognized_count(&self) -> usize {
        self.sensors
            .iter()
            .filter(|(_, record)| !record.is_recognized())
            .count()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

/// Fetches and decodes sensor descriptors from bridges.
pub struct SensorReader {
    client: Client,
    api_key: String,
    scope: ResourceScope,
}

impl SensorReader {
    pub fn new(client: Client, api_key: impl Into<String>, scope: ResourceScope) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            scope,
        }
    }

    pub fn scope(&self) -> ResourceScope {
        self.scope
    }

    /// Read the sensors a bridge currently exposes.
    ///
    /// Not retried: the caller logs the error and moves on to the next
    /// bridge, and the next cycle tries again.
    pub async fn read_sensors(&self, bridge: &Bridge) -> Result<SensorBatch, ReaderError> {
        let url = self.scope.url(bridge, &self.api_key);
        debug!(bridge = %bridge.id, address = %bridge.address, "Reading sensors");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await.into());
        }

        let body = response.text().await?;
        let batch = decode_resources(&body, self.scope)?;

        debug!(
            bridge = %bridge.id,
            decoded = batch.len(),
            skipped = batch.skipped.len(),
            "Sensor read complete"
        );
        Ok(batch)
    }
}

/// Decode a bridge resource response into a sensor batch.
///
/// # Errors
///
/// Fails only when the body as a whole is unusable. Individual descriptors
/// that do not decode are logged and collected in `SensorBatch::skipped`.
pub fn decode_resources(body: &str, scope: ResourceScope) -> Result<SensorBatch, ReaderError> {
    let value: Value = serde_json::from_str(body).map_err(ReaderError::Malformed)?;

    let mut resources = match value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(api_error(value)),
        other => return Err(malformed(format!("expected a JSON object, got {}", other))),
    };

    let sensors = match scope {
        ResourceScope::All if resources.get("sensors").is_some_and(Value::is_object) => {
            match resources.remove("sensors") {
                Some(Value::Object(sensors)) => sensors,
                _ => Map::new(),
            }
        }
        _ => resources,
    };

    Ok(decode_sensor_map(&sensors))
}

/// Decode every entry of a sensor map, skipping the ones that do not fit.
pub fn decode_sensor_map(sensors: &Map<String, Value>) -> SensorBatch {
    let mut batch = SensorBatch::default();

    for (id, descriptor) in sensors {
        match SensorRecord::decode(descriptor) {
            Ok(record) => {
                if !record.is_recognized() {
                    debug!(
                        id = %id,
                        sensor_type = record.type_tag(),
                        "Ignoring unrecognized sensor type"
                    );
                } else if let Some(updated) = record.last_updated() {
                    debug!(id = %id, last_updated = %updated, "Decoded sensor");
                }
                batch.sensors.push((id.clone(), record));
            }
            Err(error) => {
                warn!(id = %id, error = %error, "Skipping malformed sensor entry");
                batch.skipped.push(SkippedEntry {
                    id: id.clone(),
                    error,
                });
            }
        }
    }

    batch
}

fn api_error(value: Value) -> ReaderError {
    match serde_json::from_value::<Vec<ApiErrorItem>>(value) {
        Ok(items) => match items.into_iter().next() {
            Some(item) => ReaderError::Api {
                kind: item.error.kind,
                description: item.error.description,
            },
            None => malformed("empty array instead of a resource map"),
        },
        Err(e) => ReaderError::Malformed(e),
    }
}

fn malformed(message: impl std::fmt::Display) -> ReaderError {
    ReaderError::Malformed(<serde_json::Error as serde::de::Error>::custom(message))
}
