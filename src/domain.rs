//! ==============================================================================
//! domain.rs - shared telemetry types
//! ==============================================================================
//!
//! purpose:
//!     the vocabulary every other module speaks: which metrics a cold-chain
//!     sensor reports, what a validated reading looks like, and the device
//!     record the directory attaches to a sensor.
//!
//! relationships:
//!     - produced by: parser.rs (RawReading), enrichment.rs (DeviceMetadata)
//!     - consumed by: thresholds.rs, history.rs, registry.rs
//!
//! ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// a tracked sensor metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// ds18b20 probe sitting inside the fridge / cold box
    #[serde(rename = "probeTemperature")]
    ProbeTemperature,
    /// dht ambient temperature
    #[serde(rename = "temperature")]
    Temperature,
    /// dht ambient relative humidity
    #[serde(rename = "humidity")]
    Humidity,
}

impl Metric {
    /// every metric, in the order histories and alerts are reported
    pub const ALL: [Metric; 3] = [Metric::ProbeTemperature, Metric::Temperature, Metric::Humidity];

    /// name used in config files and json output
    pub fn name(self) -> &'static str {
        match self {
            Metric::ProbeTemperature => "probeTemperature",
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
        }
    }

    /// name of the field carrying this metric on the inbound stream
    pub fn wire_field(self) -> &'static str {
        match self {
            Metric::ProbeTemperature => "dsTemperature",
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::ProbeTemperature => "Probe temperature",
            Metric::Temperature => "Temperature",
            Metric::Humidity => "Humidity",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::ProbeTemperature | Metric::Temperature => "°C",
            Metric::Humidity => "%",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// a validated reading from one sensor
///
/// not retained as-is: the registry copies its values into `latest` and
/// the history rings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    /// sensor identity (the `username` field on the wire)
    pub key: String,
    /// probe temperature in celsius
    pub probe_temperature: f64,
    /// ambient temperature in celsius
    pub temperature: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
    /// timestamp reported by the sensor, not arrival time
    pub timestamp: DateTime<Utc>,
}

impl RawReading {
    /// value of one tracked metric
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ProbeTemperature => self.probe_temperature,
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
        }
    }
}

/// device record returned by the directory for a sensor identity
///
/// field names follow the directory's json (`serie` included).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serie: String,
}

impl DeviceMetadata {
    /// true when the directory answered with a record carrying no data
    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
            && self.brand.trim().is_empty()
            && self.model.trim().is_empty()
            && self.serie.trim().is_empty()
    }
}

/// current wall-clock time in milliseconds (unix epoch)
pub fn unix_time_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
