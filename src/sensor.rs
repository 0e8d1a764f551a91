//! Typed sensor records decoded from Hue bridge resource descriptors.
//!
//! Decoding is two-step: the `type` tag is read first, then the descriptor is
//! decoded into the shape that tag implies. Tags outside the known set become
//! [`SensorRecord::Unrecognized`], which is kept for logging only.

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

/// Hue type tag of the temperature sensor in a motion sensor unit
pub const TEMPERATURE_TYPE: &str = "ZLLTemperature";

/// Hue type tag of the ambient light sensor in a motion sensor unit
pub const LIGHT_LEVEL_TYPE: &str = "ZLLLightLevel";

/// Format of `state.lastupdated` (bridge local time, no zone).
const LAST_UPDATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Recognized sensor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    LightLevel,
}

impl SensorKind {
    /// Get all recognized sensor kinds.
    pub fn all() -> &'static [SensorKind] {
        &[SensorKind::Temperature, SensorKind::LightLevel]
    }

    /// Map a Hue type tag to a recognized kind.
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        match tag {
            TEMPERATURE_TYPE => Some(SensorKind::Temperature),
            LIGHT_LEVEL_TYPE => Some(SensorKind::LightLevel),
            _ => None,
        }
    }

    /// The Hue type tag for this kind.
    pub fn type_tag(&self) -> &'static str {
        match self {
            SensorKind::Temperature => TEMPERATURE_TYPE,
            SensorKind::LightLevel => LIGHT_LEVEL_TYPE,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_tag())
    }
}

/// `config` block shared by battery powered sensors.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorConfig {
    /// Battery level in percent, forwarded as-is
    pub battery: f64,
}

/// `state` block of a temperature sensor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemperatureState {
    /// Temperature in hundredths of a degree Celsius
    pub temperature: f64,

    #[serde(default)]
    pub lastupdated: Option<String>,
}

/// `state` block of a light level sensor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LightLevelState {
    /// Light level as `10000 * log10(lux) + 1`
    pub lightlevel: f64,

    #[serde(default)]
    pub lastupdated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemperatureSensor {
    pub name: String,
    pub config: SensorConfig,
    pub state: TemperatureState,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LightLevelSensor {
    pub name: String,
    pub config: SensorConfig,
    pub state: LightLevelState,
}

/// A sensor whose type tag is outside the recognized set.
#[derive(Debug, Clone, PartialEq)]
pub struct UnrecognizedSensor {
    pub name: Option<String>,
    pub type_tag: String,
}

/// One sensor as reported by a bridge during a poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorRecord {
    Temperature(TemperatureSensor),
    LightLevel(LightLevelSensor),
    Unrecognized(UnrecognizedSensor),
}

/// Minimal view of a descriptor used to pick the concrete shape.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    type_tag: String,

    #[serde(default)]
    name: Option<String>,
}

/// Why a single descriptor could not be decoded.
#[derive(Debug)]
pub struct DecodeError {
    /// Type tag, if it could be read
    pub type_tag: Option<String>,
    pub source: serde_json::Error,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.type_tag {
            Some(tag) => write!(f, "malformed {} descriptor: {}", tag, self.source),
            None => write!(f, "descriptor without a type tag: {}", self.source),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl SensorRecord {
    /// Decode one resource descriptor.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the descriptor has no string `type`, or if a
    /// recognized type is missing a field its shape requires.
    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let envelope = Envelope::deserialize(value).map_err(|source| DecodeError {
            type_tag: None,
            source,
        })?;

        let malformed = |source: serde_json::Error| DecodeError {
            type_tag: Some(envelope.type_tag.clone()),
            source,
        };

        match SensorKind::from_type_tag(&envelope.type_tag) {
            Some(SensorKind::Temperature) => TemperatureSensor::deserialize(value)
                .map(SensorRecord::Temperature)
                .map_err(malformed),
            Some(SensorKind::LightLevel) => LightLevelSensor::deserialize(value)
                .map(SensorRecord::LightLevel)
                .map_err(malformed),
            None => Ok(SensorRecord::Unrecognized(UnrecognizedSensor {
                name: envelope.name,
                type_tag: envelope.type_tag,
            })),
        }
    }

    /// Recognized kind, `None` for unrecognized sensors.
    pub fn kind(&self) -> Option<SensorKind> {
        match self {
            SensorRecord::Temperature(_) => Some(SensorKind::Temperature),
            SensorRecord::LightLevel(_) => Some(SensorKind::LightLevel),
            SensorRecord::Unrecognized(_) => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.kind().is_some()
    }

    /// Human readable device name, if known.
    pub fn name(&self) -> Option<&str> {
        match self {
            SensorRecord::Temperature(s) => Some(&s.name),
            SensorRecord::LightLevel(s) => Some(&s.name),
            SensorRecord::Unrecognized(s) => s.name.as_deref(),
        }
    }

    /// Hue type tag as reported by the bridge.
    pub fn type_tag(&self) -> &str {
        match self {
            SensorRecord::Temperature(_) => TEMPERATURE_TYPE,
            SensorRecord::LightLevel(_) => LIGHT_LEVEL_TYPE,
            SensorRecord::Unrecognized(s) => &s.type_tag,
        }
    }

    /// Time of the last reading, when the bridge reported a parseable one.
    ///
    /// Sensors that never reported carry the literal `"none"`.
    pub fn last_updated(&self) -> Option<NaiveDateTime> {
        let raw = match self {
            SensorRecord::Temperature(s) => s.state.lastupdated.as_deref(),
            SensorRecord::LightLevel(s) => s.state.lastupdated.as_deref(),
            SensorRecord::Unrecognized(_) => None,
        }?;
        NaiveDateTime::parse_from_str(raw, LAST_UPDATED_FORMAT).ok()
    }
}
