//! InfluxDB line protocol output formatter.

use crate::decoder::DecodedPayload;
use crate::device::ADDRESS_FIELD;
use crate::field::FieldValue;
use crate::output::OutputFormatter;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Payload keys that become tags rather than fields.
const TAG_KEYS: [&str; 2] = [ADDRESS_FIELD, "name"];

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum LineValue {
    Float(String),
    Integer(i64),
    String(String),
}

impl fmt::Display for LineValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LineValue::Float(num) => write!(f, "{num}"),
            LineValue::Integer(num) => write!(f, "{num}i"),
            LineValue::String(s) => {
                let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\"")
            }
        }
    }
}

impl From<&FieldValue> for LineValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Decimal(d) => LineValue::Float(d.to_string()),
            FieldValue::Integer(i) => LineValue::Integer(*i),
            other => LineValue::String(other.to_string()),
        }
    }
}

/// Escape commas, spaces and equals signs in tag keys and values.
fn escape_tag(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, ',' | ' ' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, LineValue>,
    pub timestamp: Option<SystemTime>,
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",{}={}", escape_tag(key), escape_tag(value))?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    for (key, value) in data_point.field_set.iter() {
        if first {
            first = false;
        } else {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}={}", escape_tag(key), value)?;
    }
    Ok(())
}

fn fmt_timestamp(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    // timestamps before the epoch are omitted
    if let Some(since_epoch) = data_point
        .timestamp
        .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
    {
        write!(fmt, " {}", since_epoch.as_nanos())?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement)?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        fmt_timestamp(self, fmt)
    }
}

/// InfluxDB line protocol formatter.
///
/// The device address and resolved name become tags, every other payload
/// entry becomes a field.
pub struct InfluxDbFormatter {
    /// The measurement name in InfluxDB
    measurement_name: String,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    fn tag_set(&self, payload: &DecodedPayload, name: &str) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        if let Some(mac) = payload.mac_address() {
            tags.insert("mac".to_string(), mac.to_string());
        }
        tags.insert("name".to_string(), name.to_string());
        tags
    }

    fn field_set(&self, payload: &DecodedPayload) -> BTreeMap<String, LineValue> {
        payload
            .fields
            .iter()
            .filter(|(key, _)| !TAG_KEYS.contains(*key))
            .map(|(key, value)| (key.to_string(), LineValue::from(value)))
            .collect()
    }

    fn to_data_point(&self, payload: &DecodedPayload, name: &str) -> DataPoint {
        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set: self.tag_set(payload, name),
            field_set: self.field_set(payload),
            timestamp: Some(payload.timestamp),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, payload: &DecodedPayload, name: &str) -> String {
        format!("{}", self.to_data_point(payload, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_MAC;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn payload() -> DecodedPayload {
        let mut payload = DecodedPayload::new(TEST_MAC);
        payload.insert("temperature", FieldValue::Decimal(Decimal::new(213, 1)));
        payload.insert("humidity", FieldValue::Decimal(Decimal::new(55, 0)));
        payload.insert("battery_level", FieldValue::Integer(100));
        payload.insert("name", FieldValue::from("Tempo"));
        payload.timestamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1000000000);
        payload
    }

    #[test]
    fn test_line_value_display() {
        assert_eq!(format!("{}", LineValue::Float("3.14".to_string())), "3.14");
        assert_eq!(format!("{}", LineValue::Integer(-7)), "-7i");
        assert_eq!(
            format!("{}", LineValue::String("say \"hi\"".to_string())),
            "\"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn test_data_point_format() {
        let mut tags = BTreeMap::new();
        tags.insert("name".to_string(), "test".to_string());
        tags.insert("test".to_string(), "true".to_string());

        let mut fields = BTreeMap::new();
        fields.insert("temperature".to_string(), LineValue::Float("32.0".to_string()));
        fields.insert("humidity".to_string(), LineValue::Float("0.2".to_string()));

        let data_point = DataPoint {
            measurement: "test".to_string(),
            tag_set: tags,
            field_set: fields,
            timestamp: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1000000000)),
        };

        assert_eq!(
            data_point.to_string(),
            "test,name=test,test=true humidity=0.2,temperature=32.0 1000000000000000000"
        );
    }

    #[test]
    fn test_data_point_without_timestamp() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "value".to_string(),
            LineValue::String("string,value".to_string()),
        );

        let data_point = DataPoint {
            measurement: "test".to_string(),
            tag_set: BTreeMap::new(),
            field_set: fields,
            timestamp: None,
        };
        assert_eq!(data_point.to_string(), "test value=\"string,value\"");
    }

    #[test]
    fn test_formatter_payload() {
        let formatter = InfluxDbFormatter::new("ble_sensor".to_string());
        let line = formatter.format(&payload(), "Tempo");

        assert_eq!(
            line,
            "ble_sensor,mac=AA:BB:CC:DD:EE:FF,name=Tempo \
             battery_level=100i,humidity=55,temperature=21.3 1000000000000000000"
        );
    }

    #[test]
    fn test_formatter_escapes_tag_values() {
        let formatter = InfluxDbFormatter::new("ble_sensor".to_string());
        let line = formatter.format(&payload(), "Living Room");
        assert!(line.contains(",name=Living\\ Room "));
    }

    #[test]
    fn test_formatter_text_fields_are_quoted() {
        let formatter = InfluxDbFormatter::new("ble_sensor".to_string());
        let mut payload = payload();
        payload.insert("firmware", FieldValue::from("1.2"));
        let line = formatter.format(&payload, "Tempo");
        assert!(line.contains("firmware=\"1.2\""));
    }
}
