//! Device registry keyed by address.

use crate::device::{ADDRESS_FIELD, DeviceState};
use crate::field::{FieldError, FieldValue, Schema};
use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

/// All devices seen by one decoder.
///
/// Entries are never evicted; a process that sees many short-lived devices
/// grows this map for its whole lifetime.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    schema: Schema,
    devices: HashMap<MacAddress, DeviceState>,
}

impl DeviceRegistry {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            devices: HashMap::new(),
        }
    }

    /// Return the state for `address`, creating it on first use.
    ///
    /// A new state gets its address recorded as a set-once attribute. Creating
    /// a device is not itself a change: the flag is cleared so that only
    /// accepted readings make the device reportable.
    pub fn get_or_create(&mut self, address: MacAddress) -> Result<&mut DeviceState, FieldError> {
        match self.devices.entry(address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut state = DeviceState::new(self.schema);
                state.set_attribute(ADDRESS_FIELD, FieldValue::Address(address))?;
                state.take_changed();
                debug!(%address, "new device");
                Ok(entry.insert(state))
            }
        }
    }

    pub fn get(&self, address: &MacAddress) -> Option<&DeviceState> {
        self.devices.get(address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &MacAddress> {
        self.devices.keys()
    }
}
