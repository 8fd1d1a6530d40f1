//! BlueMaestro Tempo environmental tags.
//!
//! The tag broadcasts its whole state in manufacturer specific data under
//! company identifier 0x0133. Every valid packet is reported; there is no
//! change suppression for this format.

use super::{AdvertisementDecoder, DecodeError, DecodedPayload};
use crate::advertisement::Advertisement;
use crate::field::{FieldSpec, FieldValue, ReadingSpec};
use tracing::trace;

/// Company identifier 0x0133 (little-endian) followed by the format version.
pub const BLUEMAESTRO_SIGNATURE: [u8; 3] = [0x33, 0x01, 0x17];

/// Signature plus a 13 byte body.
pub const BLUEMAESTRO_PAYLOAD_LEN: usize = 16;

const TENTHS: ReadingSpec = ReadingSpec::new(2, 1, true, -1).big_endian();
const TEMPERATURE: FieldSpec = FieldSpec::reading("temperature", TENTHS);
const HUMIDITY: FieldSpec = FieldSpec::reading("humidity", TENTHS);
const DEW_POINT: FieldSpec = FieldSpec::reading("dew_point", TENTHS);

/// Stateless decoder for BlueMaestro packets.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlueMaestro;

impl BlueMaestro {
    pub fn new() -> Self {
        Self
    }
}

fn read_u16_be(data: &[u8], offset: usize) -> i64 {
    i64::from(u16::from_be_bytes([data[offset], data[offset + 1]]))
}

/// Decode a device name, dropping invalid UTF-8 sequences.
fn device_name(raw: &[u8]) -> String {
    raw.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

impl AdvertisementDecoder for BlueMaestro {
    fn name(&self) -> &'static str {
        "bluemaestro"
    }

    fn decode(
        &mut self,
        advertisement: &Advertisement,
    ) -> Result<Option<DecodedPayload>, DecodeError> {
        let Some(data) = advertisement
            .manufacturer_data()
            .find(|data| data.starts_with(&BLUEMAESTRO_SIGNATURE))
        else {
            return Ok(None);
        };
        if data.len() < BLUEMAESTRO_PAYLOAD_LEN {
            trace!(
                peer = %advertisement.peer(),
                len = data.len(),
                "bluemaestro payload too short"
            );
            return Ok(None);
        }

        let reading = |spec: &FieldSpec, offset: usize| {
            spec.convert(&data[offset..offset + 2])
                .map_err(|source| DecodeError::Field {
                    decoder: self.name(),
                    source,
                })
        };

        let mut payload = DecodedPayload::new(advertisement.peer());
        payload.insert("battery_level", FieldValue::Integer(i64::from(data[3])));
        payload.insert("logging_interval", FieldValue::Integer(read_u16_be(data, 4)));
        payload.insert("log_count", FieldValue::Integer(read_u16_be(data, 6)));
        payload.insert(TEMPERATURE.name, reading(&TEMPERATURE, 8)?);
        payload.insert(HUMIDITY.name, reading(&HUMIDITY, 10)?);
        payload.insert(DEW_POINT.name, reading(&DEW_POINT, 12)?);
        payload.insert("mode", FieldValue::Integer(i64::from(data[14])));
        payload.insert("breach_count", FieldValue::Integer(i64::from(data[15])));
        if let Some(name) = advertisement.complete_name() {
            payload.insert("name", FieldValue::Text(device_name(name)));
        }

        Ok(Some(payload.with_rssi(advertisement.rssi())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::AdElement;
    use crate::decoder::RSSI_FIELD;
    use crate::test_utils::{TEST_MAC, bluemaestro_advertisement, bluemaestro_payload};
    use rust_decimal::Decimal;

    #[test]
    fn test_decode_full_payload() {
        let payload = BlueMaestro::new()
            .decode(&bluemaestro_advertisement(TEST_MAC))
            .unwrap()
            .unwrap();

        assert_eq!(payload.mac_address(), Some(TEST_MAC));
        assert_eq!(payload.get("battery_level"), Some(&FieldValue::Integer(100)));
        assert_eq!(
            payload.get("temperature"),
            Some(&FieldValue::Decimal(Decimal::new(250, 1)))
        );
        assert_eq!(payload.get("temperature").unwrap().to_string(), "25.0");
        assert_eq!(
            payload.get("humidity"),
            Some(&FieldValue::Decimal(Decimal::new(553, 1)))
        );
        assert_eq!(
            payload.get("dew_point"),
            Some(&FieldValue::Decimal(Decimal::new(-15, 1)))
        );
        assert_eq!(payload.get("logging_interval"), Some(&FieldValue::Integer(600)));
        assert_eq!(payload.get("log_count"), Some(&FieldValue::Integer(258)));
        assert_eq!(payload.get("mode"), Some(&FieldValue::Integer(1)));
        assert_eq!(payload.get("breach_count"), Some(&FieldValue::Integer(2)));
        assert_eq!(payload.get("name"), Some(&FieldValue::from("Tempo")));
        assert_eq!(payload.get(RSSI_FIELD), Some(&FieldValue::Integer(-65)));
        assert!(payload.changed);
    }

    #[test]
    fn test_every_packet_is_reported() {
        let mut decoder = BlueMaestro::new();
        let adv = bluemaestro_advertisement(TEST_MAC);
        assert!(decoder.decode(&adv).unwrap().is_some());
        assert!(decoder.decode(&adv).unwrap().is_some());
    }

    #[test]
    fn test_wrong_signature_is_ignored() {
        let mut data = bluemaestro_payload();
        data[2] = 0x18;
        let adv = Advertisement::new(TEST_MAC, None).with_element(AdElement::ManufacturerData(data));
        assert_eq!(BlueMaestro::new().decode(&adv), Ok(None));
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let mut data = bluemaestro_payload();
        data.truncate(BLUEMAESTRO_PAYLOAD_LEN - 1);
        let adv = Advertisement::new(TEST_MAC, None).with_element(AdElement::ManufacturerData(data));
        assert_eq!(BlueMaestro::new().decode(&adv), Ok(None));
    }

    #[test]
    fn test_no_manufacturer_data() {
        let adv = Advertisement::new(TEST_MAC, Some(-40));
        assert_eq!(BlueMaestro::new().decode(&adv), Ok(None));
    }

    #[test]
    fn test_optional_name_and_rssi() {
        let adv = Advertisement::new(TEST_MAC, None)
            .with_element(AdElement::ManufacturerData(bluemaestro_payload()));
        let payload = BlueMaestro::new().decode(&adv).unwrap().unwrap();
        assert_eq!(payload.get("name"), None);
        assert_eq!(payload.get(RSSI_FIELD), None);
    }

    #[test]
    fn test_device_name_drops_invalid_utf8() {
        assert_eq!(device_name(b"Tem\xFFpo"), "Tempo");
        assert_eq!(device_name(b"\xC3\xA9t\xC3"), "\u{e9}t");
    }
}
