//! HamAlert spot records and the notifications built from them.
//!
//! Once the server is in JSON mode every spot arrives as one JSON object per
//! line. The field names are not entirely stable across spot sources (RBN,
//! SOTAwatch, PSK Reporter, ...), so each semantic field is looked up through
//! an ordered list of accepted aliases and the first present, non-blank value
//! wins.

use std::fmt;

use chrono::DateTime;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::band::{UNKNOWN_BAND, band_from_mhz, parse_mhz};

/// Accepted names for the spotted station's callsign.
pub const CALLSIGN_KEYS: &[&str] = &["fullCallsign", "callsign", "call"];

/// Accepted names for the reporting station.
pub const SPOTTER_KEYS: &[&str] = &["spotter", "reporter", "deCallsign", "de"];

/// Accepted names for the operating mode.
pub const MODE_KEYS: &[&str] = &["mode", "opMode", "modulation"];

/// Accepted names for the frequency, in kHz or MHz.
pub const FREQUENCY_KEYS: &[&str] = &["frequency", "freq", "frequencyMHz", "frequencyKhz"];

/// Accepted names for an explicit band label.
pub const BAND_KEYS: &[&str] = &["band", "bandName"];

/// Accepted names for the spot time, ISO string or epoch seconds.
pub const TIME_KEYS: &[&str] = &["time", "timeISO", "timestamp"];

/// SOTA fields; all must be present for the summit enrichment.
pub const SOTA_KEYS: &[&str] = &["summitName", "summitRef", "summitPoints", "summitHeight"];

/// Rendered in place of any field the spot did not carry.
const PLACEHOLDER: &str = "?";

/// Errors turning a raw JSON-mode line into a [`SpotRecord`].
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// One spot as received from HamAlert: a loosely typed JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotRecord {
    fields: Map<String, Value>,
}

/// Summit details attached to SOTA spots.
#[derive(Debug, Clone, PartialEq)]
pub struct SotaSummit {
    pub name: String,
    pub reference: String,
    pub points: String,
    pub height: String,
}

/// A ready-to-send message plus the identity used for de-duplication.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Human-readable message body.
    pub message: String,

    /// Spotted callsign as received.
    pub callsign: String,

    /// Explicit or derived band label.
    pub band: String,

    /// Operating mode, `?` when absent.
    pub mode: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Whether a value counts as present: not null and not blank once stringified.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Render a scalar the way it should appear in a message.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Format epoch seconds as a UTC calendar timestamp.
fn format_epoch(value: &Value) -> Option<String> {
    let secs = match value.as_i64() {
        Some(secs) => secs,
        None => value.as_f64()?.floor() as i64,
    };
    DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

impl SpotRecord {
    /// Wrap an already-decoded JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(RecordError::NotAnObject(json_kind(&other))),
        }
    }

    /// Parse one JSON-mode line.
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_value(value)
    }

    /// Field names carried by this record.
    pub fn keys(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Return the first present, non-blank value among `keys`, in order.
    pub fn first_present(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.fields.get(*key))
            .find(|value| is_present(value))
    }

    fn text_or_placeholder(&self, keys: &[&str]) -> String {
        self.first_present(keys)
            .map(|v| value_text(v).trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| PLACEHOLDER.to_string())
    }

    /// Band label: the explicit field when present, otherwise derived from
    /// the frequency, otherwise `unknown`.
    pub fn band(&self) -> String {
        if let Some(band) = self.first_present(BAND_KEYS) {
            let band = value_text(band);
            let band = band.trim();
            if !band.is_empty() {
                return band.to_string();
            }
        }

        self.first_present(FREQUENCY_KEYS)
            .and_then(parse_mhz)
            .map(band_from_mhz)
            .unwrap_or(UNKNOWN_BAND)
            .to_string()
    }

    /// Frequency as `14.062 MHz`, or the raw text when no number is in it.
    pub fn frequency_text(&self) -> String {
        match self.first_present(FREQUENCY_KEYS) {
            Some(value) => match parse_mhz(value) {
                Some(mhz) => format!("{:.3} MHz", mhz),
                None => value_text(value),
            },
            None => PLACEHOLDER.to_string(),
        }
    }

    /// Spot time: strings pass through, epoch numbers become `YYYY-MM-DD HH:MM:SS`.
    pub fn time_text(&self) -> String {
        match self.first_present(TIME_KEYS) {
            Some(value) if value.is_number() => {
                format_epoch(value).unwrap_or_else(|| value_text(value))
            }
            Some(value) => value_text(value),
            None => PLACEHOLDER.to_string(),
        }
    }

    /// The summit bundle, only when every SOTA field is present.
    ///
    /// A key whose value is `null` counts as missing, so a summit line never
    /// renders the text "null".
    pub fn sota(&self) -> Option<SotaSummit> {
        let mut values = SOTA_KEYS
            .iter()
            .map(|key| self.fields.get(*key).filter(|v| !v.is_null()).map(value_text));

        Some(SotaSummit {
            name: values.next()??,
            reference: values.next()??,
            points: values.next()??,
            height: values.next()??,
        })
    }

    /// Build the notification for this spot.
    ///
    /// Returns `None` when no callsign alias is present; every other field
    /// falls back to a placeholder.
    pub fn extract(&self) -> Option<Notification> {
        let callsign = value_text(self.first_present(CALLSIGN_KEYS)?);
        let spotter = self.text_or_placeholder(SPOTTER_KEYS);
        let mode = self.text_or_placeholder(MODE_KEYS);
        let band = self.band();

        let mut message = format!(
            "SPOT: {} seen by {} on {} ({}, {}) at {} UTC",
            callsign,
            spotter,
            self.frequency_text(),
            mode,
            band,
            self.time_text()
        );

        if let Some(summit) = self.sota() {
            message = format!(
                "SOTA {}\nSummit: {} — {} — a {}-point summit at {} m!",
                message, summit.name, summit.reference, summit.points, summit.height
            );
        }

        Some(Notification {
            message,
            callsign,
            band,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SpotRecord {
        SpotRecord::from_value(value).unwrap()
    }

    fn sota_spot() -> Value {
        json!({
            "fullCallsign": "W7ABC/P",
            "spotter": "K7XYZ",
            "frequency": "14.062",
            "mode": "cw",
            "time": "17:42",
            "summitName": "Mount Si",
            "summitRef": "W7W/KG-063",
            "summitPoints": 4,
            "summitHeight": 1270
        })
    }

    #[test]
    fn test_basic_message() {
        let n = record(json!({
            "fullCallsign": "W1AW",
            "spotter": "K1TTT",
            "frequency": 14025,
            "mode": "cw",
            "time": "2024-05-01T12:00:00Z"
        }))
        .extract()
        .unwrap();

        assert_eq!(
            n.message,
            "SPOT: W1AW seen by K1TTT on 14.025 MHz (cw, 20m) at 2024-05-01T12:00:00Z UTC"
        );
        assert_eq!(n.callsign, "W1AW");
        assert_eq!(n.band, "20m");
        assert_eq!(n.mode, "cw");
    }

    #[test]
    fn test_missing_callsign_is_rejected() {
        let r = record(json!({
            "spotter": "K1TTT",
            "frequency": 14025,
            "mode": "CW",
            "band": "20m",
            "time": 1700000000
        }));
        assert_eq!(r.extract(), None);
    }

    #[test]
    fn test_blank_callsign_is_rejected() {
        assert_eq!(record(json!({"callsign": "   ", "call": null})).extract(), None);
    }

    #[test]
    fn test_alias_order() {
        let r = record(json!({"call": "K2B", "callsign": "K2A"}));
        assert_eq!(r.extract().unwrap().callsign, "K2A");

        // Blank earlier alias falls through to a later one
        let r = record(json!({"fullCallsign": "", "call": "K2C"}));
        assert_eq!(r.extract().unwrap().callsign, "K2C");
    }

    #[test]
    fn test_alternate_field_names() {
        let n = record(json!({
            "call": "DL1ABC",
            "de": "OK1XYZ",
            "modulation": "SSB",
            "freq": "7.150",
            "timestamp": 0
        }))
        .extract()
        .unwrap();

        assert_eq!(
            n.message,
            "SPOT: DL1ABC seen by OK1XYZ on 7.150 MHz (SSB, 40m) at 1970-01-01 00:00:00 UTC"
        );
    }

    #[test]
    fn test_placeholders() {
        let n = record(json!({"callsign": "W1AW"})).extract().unwrap();
        assert_eq!(n.message, "SPOT: W1AW seen by ? on ? (?, unknown) at ? UTC");
        assert_eq!(n.mode, "?");
        assert_eq!(n.band, "unknown");
    }

    #[test]
    fn test_explicit_band_wins() {
        let r = record(json!({"callsign": "W1AW", "band": "17m", "frequency": 14025}));
        assert_eq!(r.band(), "17m");

        let r = record(json!({"callsign": "W1AW", "bandName": " 30m ", "frequency": 14025}));
        assert_eq!(r.band(), "30m");
    }

    #[test]
    fn test_band_derived_from_frequency() {
        let r = record(json!({"callsign": "W1AW", "frequencyKhz": "7040"}));
        assert_eq!(r.band(), "40m");

        let r = record(json!({"callsign": "W1AW", "frequency": 7400}));
        assert_eq!(r.band(), UNKNOWN_BAND);
    }

    #[test]
    fn test_non_numeric_frequency_passes_through() {
        let r = record(json!({"callsign": "W1AW", "frequency": "unknown qrg"}));
        assert_eq!(r.frequency_text(), "unknown qrg");
    }

    #[test]
    fn test_epoch_time() {
        let r = record(json!({"callsign": "W1AW", "time": 1700000000}));
        assert_eq!(r.time_text(), "2023-11-14 22:13:20");

        let r = record(json!({"callsign": "W1AW", "time": 1700000000.75}));
        assert_eq!(r.time_text(), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_sota_enrichment() {
        let n = record(sota_spot()).extract().unwrap();
        assert_eq!(
            n.message,
            "SOTA SPOT: W7ABC/P seen by K7XYZ on 14.062 MHz (cw, 20m) at 17:42 UTC\n\
             Summit: Mount Si — W7W/KG-063 — a 4-point summit at 1270 m!"
        );
    }

    #[test]
    fn test_sota_requires_every_field() {
        for key in SOTA_KEYS {
            let mut spot = sota_spot();
            spot.as_object_mut().unwrap().remove(*key);
            let n = record(spot).extract().unwrap();
            assert!(!n.message.starts_with("SOTA "), "removed {}", key);
            assert!(!n.message.contains("Summit:"), "removed {}", key);
        }
    }

    #[test]
    fn test_sota_null_value_counts_as_missing() {
        let mut spot = sota_spot();
        spot["summitHeight"] = Value::Null;

        let r = record(spot);
        assert_eq!(r.sota(), None);
        assert!(!r.extract().unwrap().message.contains("null"));
    }

    #[test]
    fn test_parse_line() {
        assert!(SpotRecord::parse(r#"{"callsign":"W1AW"}"#).is_ok());
        assert!(matches!(
            SpotRecord::parse("not json"),
            Err(RecordError::InvalidJson(_))
        ));
        assert!(matches!(
            SpotRecord::parse("[1, 2, 3]"),
            Err(RecordError::NotAnObject("an array"))
        ));
        assert!(matches!(
            SpotRecord::parse("42"),
            Err(RecordError::NotAnObject("a number"))
        ));
    }

    #[test]
    fn test_display_is_message() {
        let n = record(json!({"callsign": "W1AW"})).extract().unwrap();
        assert_eq!(n.to_string(), n.message);
    }
}
