//! Xiaomi MiBeacon temperature and humidity sensors.
//!
//! Frames arrive as service data for UUID 0xFE95. Each frame carries a single
//! measurement subtype, so a device's full state is assembled across packets
//! in a [`DeviceRegistry`] and only reported when a reading changed.
//!
//! Frame layout:
//!
//! | offset | size | content                                  |
//! |--------|------|------------------------------------------|
//! | 0      | 4    | header `50 20 AA 01`                     |
//! | 4      | 1    | frame counter                            |
//! | 5      | 6    | device address, little-endian            |
//! | 11     | 1    | measurement subtype                      |
//! | 12     | 1    | reserved                                 |
//! | 13     | 1    | measurement length                       |
//! | 14     | n    | measurement, little-endian               |

use super::{AdvertisementDecoder, DecodeError, DecodedPayload};
use crate::advertisement::Advertisement;
use crate::device::ADDRESS_FIELD;
use crate::field::{FieldSpec, ReadingSpec, Schema};
use crate::mac_address::MacAddress;
use crate::registry::DeviceRegistry;
use std::time::{Duration, Instant};
use tracing::trace;

pub const XIAOMI_SERVICE_UUID: u16 = 0xFE95;

const HEADER: [u8; 4] = [0x50, 0x20, 0xAA, 0x01];
const ADDRESS_OFFSET: usize = 5;
const SUBTYPE_OFFSET: usize = 11;
const LENGTH_OFFSET: usize = 13;
const MEASUREMENT_OFFSET: usize = 14;

pub const SUBTYPE_TEMPERATURE: u8 = 0x04;
pub const SUBTYPE_HUMIDITY: u8 = 0x06;
pub const SUBTYPE_BATTERY: u8 = 0x0A;
pub const SUBTYPE_TEMPERATURE_HUMIDITY: u8 = 0x0D;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::attribute(ADDRESS_FIELD),
    FieldSpec::attribute("name"),
    FieldSpec::reading(
        "temperature",
        ReadingSpec::new(2, 1, true, -1).with_ttl(Duration::from_secs(3)),
    ),
    FieldSpec::reading("humidity", ReadingSpec::new(2, 0, false, -1)),
    FieldSpec::reading("battery_level", ReadingSpec::new(1, 0, false, 0)),
];

pub const XIAOMI_SCHEMA: Schema = Schema::new(FIELDS);

/// Field name and byte range within the measurement, per accepted subtype.
type Layout = &'static [(&'static str, usize, usize)];

const TEMPERATURE_HUMIDITY: Layout = &[("temperature", 0, 2), ("humidity", 2, 4)];
const BATTERY: Layout = &[("battery_level", 0, 1)];
const HUMIDITY: Layout = &[("humidity", 0, 2)];
const TEMPERATURE: Layout = &[("temperature", 0, 2)];

fn layout(subtype: u8, len: usize) -> Option<Layout> {
    match (subtype, len) {
        (SUBTYPE_TEMPERATURE_HUMIDITY, 4) => Some(TEMPERATURE_HUMIDITY),
        (SUBTYPE_BATTERY, 1) => Some(BATTERY),
        (SUBTYPE_HUMIDITY, 2) => Some(HUMIDITY),
        (SUBTYPE_TEMPERATURE, 2) => Some(TEMPERATURE),
        _ => None,
    }
}

/// Stateful decoder for MiBeacon frames.
#[derive(Debug, Clone)]
pub struct Xiaomi {
    devices: DeviceRegistry,
}

impl Default for Xiaomi {
    fn default() -> Self {
        Self::new()
    }
}

impl Xiaomi {
    pub fn new() -> Self {
        Self {
            devices: DeviceRegistry::new(XIAOMI_SCHEMA),
        }
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    fn field_error(source: crate::field::FieldError) -> DecodeError {
        DecodeError::Field {
            decoder: "xiaomi",
            source,
        }
    }

    /// Decode with an explicit current time for the change test.
    pub fn decode_at(
        &mut self,
        advertisement: &Advertisement,
        now: Instant,
    ) -> Result<Option<DecodedPayload>, DecodeError> {
        let Some(frame) = advertisement.service_data(XIAOMI_SERVICE_UUID).next() else {
            return Ok(None);
        };
        let peer = advertisement.peer();

        if frame.len() <= LENGTH_OFFSET || !frame.starts_with(&HEADER) {
            trace!(%peer, len = frame.len(), "not a MiBeacon measurement frame");
            return Ok(None);
        }

        let declared = usize::from(frame[LENGTH_OFFSET]);
        let measurement = &frame[MEASUREMENT_OFFSET..];
        if declared != measurement.len() {
            trace!(%peer, declared, actual = measurement.len(), "length mismatch");
            return Ok(None);
        }

        let embedded = MacAddress::from_le_bytes(&frame[ADDRESS_OFFSET..SUBTYPE_OFFSET]);
        let Some(address) = embedded.filter(|mac| *mac == peer) else {
            trace!(%peer, ?embedded, "embedded address does not match peer");
            return Ok(None);
        };

        let subtype = frame[SUBTYPE_OFFSET];
        let Some(layout) = layout(subtype, declared) else {
            trace!(%peer, subtype, declared, "unsupported subtype");
            return Ok(None);
        };

        let state = self
            .devices
            .get_or_create(address)
            .map_err(Self::field_error)?;
        for &(name, start, end) in layout {
            state
                .write_at(name, &measurement[start..end], now)
                .map_err(Self::field_error)?;
        }
        if state.get("name").is_none()
            && let Some(name) = advertisement.complete_name()
        {
            state.write_at("name", name, now).map_err(Self::field_error)?;
        }

        if !state.take_changed() {
            trace!(%peer, "no change");
            return Ok(None);
        }

        let payload = DecodedPayload::from_fields(state.snapshot().clone());
        Ok(Some(payload.with_rssi(advertisement.rssi())))
    }
}

impl AdvertisementDecoder for Xiaomi {
    fn name(&self) -> &'static str {
        "xiaomi"
    }

    fn decode(
        &mut self,
        advertisement: &Advertisement,
    ) -> Result<Option<DecodedPayload>, DecodeError> {
        self.decode_at(advertisement, Instant::now())
    }
}
