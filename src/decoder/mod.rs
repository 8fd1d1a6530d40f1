//! Vendor advertisement decoders.
//!
//! Each decoder recognises one vendor format. Packets of other formats, foreign
//! devices and malformed frames are routine and yield `Ok(None)`; only internal
//! inconsistencies in the device cache are returned as errors.

pub mod bluemaestro;
pub mod xiaomi;

use crate::advertisement::Advertisement;
use crate::device::ADDRESS_FIELD;
use crate::field::{FieldError, FieldValue};
use crate::mac_address::MacAddress;
use std::collections::BTreeMap;
use std::time::SystemTime;
use thiserror::Error;

pub use bluemaestro::BlueMaestro;
pub use xiaomi::Xiaomi;

/// Payload key for the received signal strength.
pub const RSSI_FIELD: &str = "rssi";

/// Errors that abort a decode call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{decoder}: {source}")]
    Field {
        decoder: &'static str,
        #[source]
        source: FieldError,
    },
}

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    /// Field name to value; always contains `mac_address`.
    pub fields: BTreeMap<&'static str, FieldValue>,
    /// Whether the payload reports a change. Consumed by the caller, not published.
    pub changed: bool,
    /// When the payload was produced.
    pub timestamp: SystemTime,
}

impl DecodedPayload {
    pub fn new(mac: MacAddress) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(ADDRESS_FIELD, FieldValue::Address(mac));
        Self::from_fields(fields)
    }

    pub fn from_fields(fields: BTreeMap<&'static str, FieldValue>) -> Self {
        Self {
            fields,
            changed: true,
            timestamp: SystemTime::now(),
        }
    }

    pub fn insert(&mut self, name: &'static str, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn mac_address(&self) -> Option<MacAddress> {
        match self.fields.get(ADDRESS_FIELD) {
            Some(FieldValue::Address(mac)) => Some(*mac),
            _ => None,
        }
    }

    fn with_rssi(mut self, rssi: Option<i8>) -> Self {
        if let Some(rssi) = rssi {
            self.insert(RSSI_FIELD, FieldValue::Integer(i64::from(rssi)));
        }
        self
    }
}

/// A decoder for one advertisement format.
pub trait AdvertisementDecoder: Send {
    fn name(&self) -> &'static str;

    /// Decode `advertisement`, or return `Ok(None)` when the format does not
    /// apply, the frame is malformed, or nothing changed.
    fn decode(
        &mut self,
        advertisement: &Advertisement,
    ) -> Result<Option<DecodedPayload>, DecodeError>;
}

/// Supported formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// BlueMaestro Tempo environmental tags
    Bluemaestro,
    /// Xiaomi MiBeacon temperature and humidity sensors
    Xiaomi,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Bluemaestro, Format::Xiaomi];

    pub fn decoder(self) -> Box<dyn AdvertisementDecoder> {
        match self {
            Format::Bluemaestro => Box::new(BlueMaestro::new()),
            Format::Xiaomi => Box::new(Xiaomi::new()),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Bluemaestro => write!(f, "bluemaestro"),
            Format::Xiaomi => write!(f, "xiaomi"),
        }
    }
}

/// Decoders tried in order; the first one producing a payload wins.
pub struct DecoderChain {
    decoders: Vec<Box<dyn AdvertisementDecoder>>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Box<dyn AdvertisementDecoder>>) -> Self {
        Self { decoders }
    }

    /// A chain of the given formats; all formats when `formats` is empty.
    pub fn from_formats(formats: &[Format]) -> Self {
        let formats = if formats.is_empty() {
            &Format::ALL[..]
        } else {
            formats
        };
        Self::new(formats.iter().map(|f| f.decoder()).collect())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn decode(
        &mut self,
        advertisement: &Advertisement,
    ) -> Result<Option<DecodedPayload>, DecodeError> {
        for decoder in &mut self.decoders {
            if let Some(payload) = decoder.decode(advertisement)? {
                return Ok(Some(payload));
            }
        }
        Ok(None)
    }
}
