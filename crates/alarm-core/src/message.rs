//! Spoken message composition.

use serde::Serialize;

use crate::telemetry::TelemetryRecord;

pub const CLOSING_LINE: &str = "Goodbye!";

const UNKNOWN: &str = "unknown";

/// What the call reads aloud, one segment per spoken block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceScript {
    segments: Vec<String>,
}

impl VoiceScript {
    /// A message followed by the closing line.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            segments: vec![message.into(), CLOSING_LINE.to_string()],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The alarm message without the closing line.
    pub fn message(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or_default()
    }

    /// Every segment on a single line.
    pub fn text(&self) -> String {
        self.segments.join(" ")
    }
}

/// Build the script read to the owner when the alarm fires.
pub fn compose_message(record: &TelemetryRecord, address: &str) -> VoiceScript {
    let device = record.device_name.as_deref().unwrap_or(UNKNOWN);
    let battery = record
        .battery_level_percent
        .map(|b| (b + 0.0).to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let voltage = record
        .external_voltage
        .map(|v| format!("{:.1}", floor_to_tenth(v)))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let message = format!(
        "Motorbike alarm activated.
        Current Location: {address}.
        Device: {device}.
        Tracker Battery Level: {battery}%.
        External Power Source Voltage: {voltage} volts."
    );

    VoiceScript::new(normalize_whitespace(&message))
}

/// Round down to one decimal place, toward negative infinity.
pub fn floor_to_tenth(value: f64) -> f64 {
    // adding 0.0 turns -0.0 into 0.0
    (value * 10.0).floor() / 10.0 + 0.0
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bike() -> TelemetryRecord {
        TelemetryRecord {
            alarm_triggered: true,
            battery_level_percent: Some(55.0),
            external_voltage: Some(12.34),
            device_name: Some("Bike1".into()),
            latitude: Some(40.0),
            longitude: Some(-73.0),
            ..Default::default()
        }
    }

    fn voltage_text(v: f64) -> String {
        format!("{:.1}", floor_to_tenth(v))
    }

    #[test]
    fn voltage_floors_to_one_decimal() {
        assert_eq!(voltage_text(12.37), "12.3");
        assert_eq!(voltage_text(12.0), "12.0");
        assert_eq!(voltage_text(12.99), "12.9");
        assert_eq!(voltage_text(-0.05), "-0.1");
        assert_eq!(voltage_text(-1.21), "-1.3");
    }

    #[test]
    fn negative_zero_voltage_reads_as_zero() {
        assert_eq!(voltage_text(-0.0), "0.0");
        assert!(floor_to_tenth(-0.0).is_sign_positive());

        let mut record = bike();
        record.external_voltage = Some(-0.0);
        assert!(compose_message(&record, "x").message().contains("Voltage: 0.0 volts."));
    }

    #[test]
    fn composes_single_line_script() {
        let script = compose_message(&bike(), "1 Main St, Springfield");
        assert_eq!(
            script.message(),
            "Motorbike alarm activated. Current Location: 1 Main St, Springfield. \
             Device: Bike1. Tracker Battery Level: 55%. \
             External Power Source Voltage: 12.3 volts."
        );
        assert_eq!(script.segments().len(), 2);
        assert_eq!(script.segments()[1], CLOSING_LINE);

        let text = script.text();
        assert!(!text.contains('\n'));
        assert!(!text.contains("  "));
        assert!(text.ends_with("volts. Goodbye!"));
    }

    #[test]
    fn fractional_battery_keeps_its_decimals() {
        let mut record = bike();
        record.battery_level_percent = Some(55.5);
        assert!(compose_message(&record, "x").message().contains("Level: 55.5%."));
    }

    #[test]
    fn missing_values_render_as_unknown() {
        let script = compose_message(&TelemetryRecord::default(), "Location not found");
        let text = script.text();
        assert!(text.contains("Current Location: Location not found."));
        assert!(text.contains("Device: unknown."));
        assert!(text.contains("Battery Level: unknown%."));
        assert!(text.contains("Voltage: unknown volts."));
        assert!(!text.contains("null"));
        assert!(!text.contains("NaN"));
    }
}
