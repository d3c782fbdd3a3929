//! InfluxDB line protocol output formatter.

use crate::device_id::DeviceId;
use crate::output::SnapshotFormatter;
use crate::store::DeviceState;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<&'static str, String>,
    pub field_set: BTreeMap<&'static str, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

/// Escape commas, equals signs and spaces in tag values.
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement)?;
        for (key, value) in &self.tag_set {
            write!(fmt, ",{}={}", key, escape_tag(value))?;
        }

        let mut separator = " ";
        for (key, value) in &self.field_set {
            write!(fmt, "{separator}{key}={value}")?;
            separator = ",";
        }

        if let Some(nanos) = self
            .timestamp
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
        {
            write!(fmt, " {nanos}")?;
        }
        Ok(())
    }
}

/// InfluxDB line protocol formatter.
///
/// One point per device: tags `mac` and `name` (the roster label), fields
/// `voltage`, `temperature` and `interval_ms`, stamped with the time the
/// advertisement was observed.
pub struct InfluxDbFormatter {
    /// The measurement name in InfluxDB
    measurement_name: String,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    pub fn to_data_point(&self, device: &DeviceId, state: &DeviceState) -> DataPoint {
        let tag_set = BTreeMap::from([("mac", device.to_string()), ("name", state.label.clone())]);
        let field_set = BTreeMap::from([
            ("voltage", FieldValue::Float(state.raw_voltage)),
            ("temperature", FieldValue::Float(state.raw_temperature_c)),
            ("interval_ms", FieldValue::Integer(state.inter_arrival_ms)),
        ]);

        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set,
            field_set,
            timestamp: state.last_seen_at,
        }
    }
}

impl SnapshotFormatter for InfluxDbFormatter {
    fn format(&self, device: &DeviceId, state: &DeviceState) -> Option<String> {
        state
            .has_reading()
            .then(|| self.to_data_point(device, state).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::test_utils::{TEST_DEVICE, VALID_PAYLOAD};
    use std::time::Duration;

    fn seen_state(label: &str) -> DeviceState {
        let reading = decode(&VALID_PAYLOAD).unwrap();
        let seen = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        DeviceState::placeholder(label).with_reading(&reading, 512, seen)
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Float(3.25).to_string(), "3.25");
        assert_eq!(FieldValue::Integer(500).to_string(), "500i");
    }

    #[test]
    fn test_data_point_format() {
        let data_point = DataPoint {
            measurement: "test".to_string(),
            tag_set: BTreeMap::from([("name", "cell".to_string()), ("test", "true".to_string())]),
            field_set: BTreeMap::from([
                ("voltage", FieldValue::Float(3.5)),
                ("interval_ms", FieldValue::Integer(20)),
            ]),
            timestamp: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000)),
        };

        assert_eq!(
            data_point.to_string(),
            "test,name=cell,test=true interval_ms=20i,voltage=3.5 1000000000000000000"
        );
    }

    #[test]
    fn test_data_point_without_timestamp_escapes_tags() {
        let data_point = DataPoint {
            measurement: "test".to_string(),
            tag_set: BTreeMap::from([("name", "Cell 1,a=b".to_string())]),
            field_set: BTreeMap::from([("voltage", FieldValue::Float(1.0))]),
            timestamp: None,
        };
        assert_eq!(data_point.to_string(), "test,name=Cell\\ 1\\,a\\=b voltage=1");
    }

    #[test]
    fn test_formatter_seen_device() {
        let formatter = InfluxDbFormatter::new("beacon".to_string());
        let line = formatter.format(&TEST_DEVICE, &seen_state("3")).unwrap();

        assert!(line.starts_with("beacon,mac=AA:BB:CC:DD:EE:FF,name=3 "));
        assert!(line.contains("interval_ms=512i"));
        assert!(line.contains("temperature=25.62"));
        assert!(line.contains("voltage=3.81"));
        assert!(line.ends_with(" 1000000000000000000"));
    }

    #[test]
    fn test_formatter_skips_placeholder() {
        let formatter = InfluxDbFormatter::new("beacon".to_string());
        assert_eq!(
            formatter.format(&TEST_DEVICE, &DeviceState::placeholder("1")),
            None
        );
    }
}
