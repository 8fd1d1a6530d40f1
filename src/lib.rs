//! `ble-sensor-decoder` library.
//!
//! Decodes vendor BLE advertisements (BlueMaestro, Xiaomi MiBeacon) into
//! sensor readings and suppresses readings that have not meaningfully changed.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The run loop lives in [`crate::app`] where it can be tested
//! deterministically with an injected record source and injected output streams.

pub mod advertisement;
pub mod alias;
pub mod app;
pub mod decoder;
pub mod device;
pub mod field;
pub mod filter;
pub mod mac_address;
pub mod output;
pub mod registry;
pub mod source;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{AdElement, Advertisement};
pub use alias::{Alias, AliasMap, parse_alias, resolve_name, to_map};
pub use decoder::{AdvertisementDecoder, DecodeError, DecodedPayload, DecoderChain, Format};
pub use device::DeviceState;
pub use field::{FieldError, FieldSpec, FieldValue, ReadingSpec, Schema};
pub use filter::MacFilter;
pub use mac_address::MacAddress;
pub use output::OutputFormatter;
pub use output::influxdb::InfluxDbFormatter;
pub use registry::DeviceRegistry;
pub use source::{ParseRecordError, RecordResult, parse_record};
