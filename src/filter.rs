//! Restrict processing to a set of devices.

use crate::mac_address::MacAddress;
use std::collections::HashSet;

/// An allow-list of device addresses. An empty list allows every device.
#[derive(Debug, Clone, Default)]
pub struct MacFilter {
    allowed: HashSet<MacAddress>,
}

impl MacFilter {
    pub fn new(addresses: &[MacAddress]) -> Self {
        Self {
            allowed: addresses.iter().copied().collect(),
        }
    }

    pub fn allows(&self, mac: &MacAddress) -> bool {
        self.allowed.is_empty() || self.allowed.contains(mac)
    }
}
