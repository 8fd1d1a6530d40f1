//! Advertisement records handed to the decoders.
//!
//! A record is the structural decomposition of one BLE advertising report:
//! the peer address, the signal strength when known, and the AD structures of
//! the advertising data.

use crate::mac_address::MacAddress;
use thiserror::Error;

// AD types
const AD_TYPE_SHORT_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// One AD structure of the advertising data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdElement {
    /// Manufacturer specific data, including the leading company identifier.
    ManufacturerData(Vec<u8>),
    /// Service data for a 16-bit service UUID, without the UUID bytes.
    ServiceData { uuid: u16, data: Vec<u8> },
    CompleteName(Vec<u8>),
    ShortName(Vec<u8>),
    Other { ad_type: u8, data: Vec<u8> },
}

/// Errors returned when splitting advertising data into AD structures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdParseError {
    #[error("AD structure at offset {offset} overruns the data")]
    Truncated { offset: usize },
    #[error("service data at offset {offset} is too short for a UUID")]
    MissingUuid { offset: usize },
}

/// A decomposed advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    peer: MacAddress,
    rssi: Option<i8>,
    elements: Vec<AdElement>,
}

impl Advertisement {
    pub fn new(peer: MacAddress, rssi: Option<i8>) -> Self {
        Self {
            peer,
            rssi,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: AdElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Build a record from raw advertising data (length, type, value triples).
    ///
    /// A zero length byte ends the data; controllers pad reports with zeros.
    pub fn from_ad_bytes(
        peer: MacAddress,
        rssi: Option<i8>,
        data: &[u8],
    ) -> Result<Self, AdParseError> {
        let mut advertisement = Self::new(peer, rssi);
        let mut offset = 0;
        while offset < data.len() {
            let len = usize::from(data[offset]);
            if len == 0 {
                break;
            }
            if offset + 1 + len > data.len() {
                return Err(AdParseError::Truncated { offset });
            }

            let ad_type = data[offset + 1];
            let value = &data[offset + 2..offset + 1 + len];
            let element = match ad_type {
                AD_TYPE_MANUFACTURER_DATA => AdElement::ManufacturerData(value.to_vec()),
                AD_TYPE_COMPLETE_NAME => AdElement::CompleteName(value.to_vec()),
                AD_TYPE_SHORT_NAME => AdElement::ShortName(value.to_vec()),
                AD_TYPE_SERVICE_DATA_16 => {
                    if value.len() < 2 {
                        return Err(AdParseError::MissingUuid { offset });
                    }
                    AdElement::ServiceData {
                        uuid: u16::from_le_bytes([value[0], value[1]]),
                        data: value[2..].to_vec(),
                    }
                }
                _ => AdElement::Other {
                    ad_type,
                    data: value.to_vec(),
                },
            };
            advertisement.elements.push(element);
            offset += 1 + len;
        }
        Ok(advertisement)
    }

    pub fn peer(&self) -> MacAddress {
        self.peer
    }

    pub fn rssi(&self) -> Option<i8> {
        self.rssi
    }

    pub fn elements(&self) -> &[AdElement] {
        &self.elements
    }

    pub fn manufacturer_data(&self) -> impl Iterator<Item = &[u8]> {
        self.elements.iter().filter_map(|e| match e {
            AdElement::ManufacturerData(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Service data payloads advertised for `uuid`.
    pub fn service_data(&self, uuid: u16) -> impl Iterator<Item = &[u8]> {
        self.elements.iter().filter_map(move |e| match e {
            AdElement::ServiceData { uuid: u, data } if *u == uuid => Some(data.as_slice()),
            _ => None,
        })
    }

    pub fn complete_name(&self) -> Option<&[u8]> {
        self.elements.iter().find_map(|e| match e {
            AdElement::CompleteName(name) => Some(name.as_slice()),
            _ => None,
        })
    }
}
