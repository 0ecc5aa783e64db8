//! Telemetry ingress types: TelemetryBatch, TelemetryReading
//!
//! Field names on the wire follow the stream-analytics output that feeds the
//! `/validate` endpoint, so every field carries an explicit `serde(rename)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single sensor reading from one device.
///
/// All fields are required. A reading with a missing or mistyped field makes
/// the whole batch undecodable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Measured temperature (°C)
    #[serde(rename = "temperature")]
    pub temperature: f64,

    /// Ambient temperature around the device (°C)
    #[serde(rename = "ambienttemperature")]
    pub ambient_temperature: f64,

    /// Time the reading was produced on the device. A value without an
    /// offset is taken as UTC.
    #[serde(rename = "timeCreated", deserialize_with = "super::timestamp::deserialize")]
    pub time_created: DateTime<Utc>,

    #[serde(rename = "ConnectionDeviceId")]
    pub device_id: String,

    #[serde(rename = "ConnectionDeviceGenerationId")]
    pub device_generation_id: String,
}

/// One ingress payload: an ordered sequence of readings.
///
/// The batch is the input of exactly one workflow instance and is never
/// modified after it has been received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    #[serde(rename = "allevents")]
    pub readings: Vec<TelemetryReading>,
}

impl TelemetryBatch {
    pub fn new(readings: Vec<TelemetryReading>) -> Self {
        Self { readings }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Device id of the first reading, used as a log field.
    pub fn primary_device(&self) -> Option<&str> {
        self.readings.first().map(|r| r.device_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "allevents": [
            {
                "temperature": 4.5,
                "ambienttemperature": 21.0,
                "timeCreated": "2024-03-01T10:15:00Z",
                "ConnectionDeviceId": "freezer-01",
                "ConnectionDeviceGenerationId": "637512345678901234"
            }
        ]
    }"#;

    #[test]
    fn test_decodes_stream_analytics_payload() {
        let batch: TelemetryBatch = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(batch.len(), 1);
        let reading = &batch.readings[0];
        assert_eq!(reading.device_id, "freezer-01");
        assert!((reading.ambient_temperature - 21.0).abs() < f64::EPSILON);
        assert_eq!(batch.primary_device(), Some("freezer-01"));
    }

    #[test]
    fn test_time_created_accepts_both_iso_forms() {
        let with_offset: TelemetryBatch = serde_json::from_str(SAMPLE).unwrap();
        let naive: TelemetryBatch =
            serde_json::from_str(&SAMPLE.replace("10:15:00Z", "10:15:00")).unwrap();
        assert_eq!(
            naive.readings[0].time_created,
            with_offset.readings[0].time_created
        );

        let bad = SAMPLE.replace("2024-03-01T10:15:00Z", "01/03/2024 10:15");
        assert!(serde_json::from_str::<TelemetryBatch>(&bad).is_err());
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{ "allevents": [ { "temperature": 4.5 } ] }"#;
        assert!(serde_json::from_str::<TelemetryBatch>(json).is_err());
    }

    #[test]
    fn test_missing_allevents_is_rejected() {
        assert!(serde_json::from_str::<TelemetryBatch>("{}").is_err());
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let batch: TelemetryBatch = serde_json::from_str(SAMPLE).unwrap();
        let value = serde_json::to_value(&batch).unwrap();
        let first = &value["allevents"][0];
        assert_eq!(first["ConnectionDeviceId"], "freezer-01");
        assert!(first.get("ambienttemperature").is_some());
        assert!(first.get("timeCreated").is_some());
    }
}
