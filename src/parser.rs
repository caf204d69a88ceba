//! ==============================================================================
//! parser.rs - inbound message validation
//! ==============================================================================
//!
//! purpose:
//!     turns one raw payload from the sensor stream into a typed reading.
//!     keep-alive control frames are recognized and reported as such so the
//!     ingest worker can skip them without counting an error.
//!
//! wire format:
//! ```text
//!     { "username": "doctor03", "temperature": 22.1, "humidity": 45,
//!       "dsTemperature": 4.2, "datetime": "2025-03-29T06:20:51.000Z" }
//!
//!     metrics may arrive as json numbers or numeric strings; stored
//!     readings replayed from the backend carry strings.
//!
//!     datetime may be iso-8601 (with a T or a space) or epoch millis.
//!     without a usable one the reading is stamped with its arrival time.
//! ```
//!
//! relationships:
//!     - used by: ingest.rs (worker loop), server.rs (push endpoint validation)
//!     - produces: domain::RawReading
//!
//! ==============================================================================

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{Metric, RawReading};
use crate::error::ParseError;

/// `type` values that mark a control frame
const CONTROL_TYPES: [&str; 4] = ["ping", "pong", "keepalive", "heartbeat"];

/// offset-less layouts seen from sensor firmware
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// what one inbound payload turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reading(RawReading),
    /// keep-alive or other control frame, carries no data
    Control,
}

/// parse and validate one inbound payload
pub fn parse_message(payload: &str) -> Result<Inbound, ParseError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let obj = value.as_object().ok_or(ParseError::NotAnObject)?;

    if is_control(obj) {
        return Ok(Inbound::Control);
    }

    let key = obj
        .get("username")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingIdentity)?
        .to_string();

    let probe_temperature = metric(obj, Metric::ProbeTemperature)?;
    let temperature = metric(obj, Metric::Temperature)?;
    let humidity = metric(obj, Metric::Humidity)?;
    let timestamp = timestamp(obj);

    Ok(Inbound::Reading(RawReading {
        key,
        probe_temperature,
        temperature,
        humidity,
        timestamp,
    }))
}

fn is_control(obj: &Map<String, Value>) -> bool {
    obj.get("type")
        .and_then(Value::as_str)
        .map(|t| CONTROL_TYPES.iter().any(|c| t.eq_ignore_ascii_case(c)))
        .unwrap_or(false)
}

fn metric(obj: &Map<String, Value>, metric: Metric) -> Result<f64, ParseError> {
    let field = metric.wire_field();
    let value = match obj.get(field) {
        None | Some(Value::Null) => return Err(ParseError::MissingMetric(field)),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or(ParseError::NonFiniteMetric(field))
}

/// reading time as reported by the node, or arrival time when the node
/// sent nothing usable
fn timestamp(obj: &Map<String, Value>) -> DateTime<Utc> {
    let reported = match obj.get("datetime") {
        Some(Value::String(raw)) => parse_datetime(raw.trim()),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|ms| ms as i64))
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    reported.unwrap_or_else(|| {
        debug!(datetime = ?obj.get("datetime"), "no usable datetime, stamping arrival time");
        Utc::now()
    })
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    // no offset: the sensors report utc
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
