use crate::advertisement::{AdElement, Advertisement};
use crate::mac_address::MacAddress;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// A second device, distinct from [`TEST_MAC`].
pub const OTHER_MAC: MacAddress = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

/// BlueMaestro manufacturer data: battery 100 %, 25.0 C, 55.3 %, dew point -1.5 C.
pub fn bluemaestro_payload() -> Vec<u8> {
    vec![
        0x33, 0x01, 0x17, // company 0x0133, version 0x17
        0x64, // battery level: 100
        0x02, 0x58, // logging interval: 600
        0x01, 0x02, // log count: 258
        0x00, 0xFA, // temperature: 250 -> 25.0
        0x02, 0x29, // humidity: 553 -> 55.3
        0xFF, 0xF1, // dew point: -15 -> -1.5
        0x01, // mode
        0x02, // breach count
    ]
}

pub fn bluemaestro_advertisement(peer: MacAddress) -> Advertisement {
    Advertisement::new(peer, Some(-65))
        .with_element(AdElement::ManufacturerData(bluemaestro_payload()))
        .with_element(AdElement::CompleteName(b"Tempo".to_vec()))
}

/// A MiBeacon frame claiming to come from `embedded`.
pub fn xiaomi_frame(embedded: MacAddress, subtype: u8, measurement: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x50, 0x20, 0xAA, 0x01, 0x42];
    frame.extend(embedded.0.iter().rev());
    frame.extend([subtype, 0x10, measurement.len() as u8]);
    frame.extend_from_slice(measurement);
    frame
}

/// A MiBeacon advertisement received from `peer` with an RSSI of -70.
pub fn xiaomi_advertisement(
    peer: MacAddress,
    embedded: MacAddress,
    subtype: u8,
    measurement: &[u8],
) -> Advertisement {
    Advertisement::new(peer, Some(-70)).with_element(AdElement::ServiceData {
        uuid: 0xFE95,
        data: xiaomi_frame(embedded, subtype, measurement),
    })
}
