//! Tracker telemetry as delivered by the webhook, and the alert decision on top of it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use time::OffsetDateTime;

/// One telemetry message from the tracker.
///
/// Field names on the wire are the tracker's dotted parameter names. Every field is
/// read leniently: a value of the wrong type, or a number outside the `f64` range, counts
/// as absent instead of failing the whole payload. When a key repeats, the last value wins.
/// Only a body that is not a JSON object is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(rename = "alarm.event")]
    pub alarm_triggered: bool,
    #[serde(rename = "engine.ignition.status")]
    pub engine_on: bool,
    #[serde(rename = "battery.level")]
    pub battery_level_percent: Option<f64>,
    #[serde(rename = "external.powersource.voltage")]
    pub external_voltage: Option<f64>,
    #[serde(rename = "device.name")]
    pub device_name: Option<String>,
    #[serde(rename = "position.latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "position.longitude")]
    pub longitude: Option<f64>,
    /// Time the tracker produced the message.
    #[serde(serialize_with = "time::serde::rfc3339::option::serialize")]
    pub timestamp: Option<OffsetDateTime>,
    /// Number to ring, taken from a request header rather than the body.
    #[serde(skip)]
    pub destination_phone_number: Option<String>,
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl TelemetryRecord {
    /// Decode a webhook body. Fails only when the body is not a JSON object.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        // values stay raw until a field asks for them, so unknown keys are never range-checked
        let fields: HashMap<String, Box<RawValue>> = serde_json::from_slice(body)?;
        let field = |name: &str| {
            fields
                .get(name)
                .and_then(|raw| serde_json::from_str::<Value>(raw.get()).ok())
                .unwrap_or(Value::Null)
        };

        Ok(Self {
            alarm_triggered: lenient_bool(field("alarm.event")),
            engine_on: lenient_bool(field("engine.ignition.status")),
            battery_level_percent: lenient_number(field("battery.level")),
            external_voltage: lenient_number(field("external.powersource.voltage")),
            device_name: lenient_string(field("device.name")),
            latitude: lenient_number(field("position.latitude")),
            longitude: lenient_number(field("position.longitude")),
            timestamp: lenient_number(field("timestamp")).and_then(unix_timestamp),
            destination_phone_number: None,
        })
    }

    pub fn with_destination(mut self, destination: Option<&str>) -> Self {
        self.destination_phone_number = destination
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        self
    }

    /// Both coordinates, if the tracker reported a position.
    pub fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.latitude?, self.longitude?))
    }
}

/// True iff the alarm fired while the engine is off.
pub fn should_call(record: &TelemetryRecord) -> bool {
    record.alarm_triggered && !record.engine_on
}

fn lenient_bool(value: Value) -> bool {
    match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    }
}

fn lenient_number(value: Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|f| f.is_finite())
}

fn lenient_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn unix_timestamp(seconds: f64) -> Option<OffsetDateTime> {
    let nanos = (seconds * 1_000_000_000.0) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}
