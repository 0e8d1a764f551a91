//! Metric records and their InfluxDB line protocol encoding.
//!
//! A recognized [`SensorRecord`] becomes exactly one [`MetricRecord`] in the
//! `hue` measurement, tagged with the sanitized device name.

use crate::sensor::{LightLevelSensor, SensorRecord, TemperatureSensor};

/// Measurement name used for every Hue sensor metric
pub const MEASUREMENT: &str = "hue";

/// One line of line protocol before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, f64)>,
}

impl MetricRecord {
    /// Create an empty record for a measurement.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Look up a field value by key.
    pub fn field(&self, key: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    /// Look up a tag value by key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Convert a sensor into a metric. Unrecognized sensors yield `None`.
    pub fn from_sensor(sensor: &SensorRecord) -> Option<Self> {
        match sensor {
            SensorRecord::Temperature(s) => Some(Self::from_temperature(s)),
            SensorRecord::LightLevel(s) => Some(Self::from_light_level(s)),
            SensorRecord::Unrecognized(_) => None,
        }
    }

    fn from_temperature(sensor: &TemperatureSensor) -> Self {
        Self::new(MEASUREMENT)
            .with_tag("name", sanitize_name(&sensor.name))
            .with_field("temperature", centi_to_unit(sensor.state.temperature))
            .with_field("battery", sensor.config.battery)
    }

    fn from_light_level(sensor: &LightLevelSensor) -> Self {
        Self::new(MEASUREMENT)
            .with_tag("name", sanitize_name(&sensor.name))
            .with_field("lux", light_level_to_lux(sensor.state.lightlevel))
            .with_field("battery", sensor.config.battery)
    }

    /// Encode as a line protocol line (no trailing newline, no timestamp).
    ///
    /// Values are written with Rust's default `f64` formatting and are not
    /// escaped.
    pub fn to_line_protocol(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.measurement)?;
        for (key, value) in &self.tags {
            write!(f, ",{}={}", key, value)?;
        }
        for (i, (key, value)) in self.fields.iter().enumerate() {
            let separator = if i == 0 { ' ' } else { ',' };
            write!(f, "{}{}={}", separator, key, value)?;
        }
        Ok(())
    }
}

/// Replace spaces so a device name can be used as a tag value.
pub fn sanitize_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Hue temperatures are reported in hundredths of a degree.
pub fn centi_to_unit(raw: f64) -> f64 {
    raw / 100.0
}

/// Invert the Hue light level encoding `10000 * log10(lux) + 1`.
pub fn light_level_to_lux(raw: f64) -> f64 {
    10f64.powf((raw - 1.0) / 10000.0)
}
