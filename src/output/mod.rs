//! Output formatters for decoded payloads.
//!
//! Currently supports InfluxDB line protocol.

pub mod influxdb;

use crate::decoder::DecodedPayload;

/// Trait for formatting decoded payloads into output lines.
pub trait OutputFormatter: Send + Sync {
    /// Format a payload.
    ///
    /// # Arguments
    /// * `payload` - The decoded payload (includes timestamp)
    /// * `name` - Display name resolved for the device
    fn format(&self, payload: &DecodedPayload, name: &str) -> String;
}
