//! Per-device field cache.
//!
//! A [`DeviceState`] holds the latest accepted value of every field of one
//! physical device, together with the value and time used for the next change
//! test. Writes that do not pass the change test leave the state untouched.

use crate::field::{FieldError, FieldKind, FieldSpec, FieldValue, Schema};
use crate::mac_address::MacAddress;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::trace;

/// Field name under which every device records its address.
pub const ADDRESS_FIELD: &str = "mac_address";

/// Cached field values of one device.
#[derive(Debug, Clone)]
pub struct DeviceState {
    schema: Schema,
    /// Publicly visible values.
    fields: BTreeMap<&'static str, FieldValue>,
    /// Last accepted values, compared against on the next write.
    cache: HashMap<&'static str, FieldValue>,
    /// Time of the last accepted write per field.
    timestamp: HashMap<&'static str, Instant>,
    changed: bool,
}

impl DeviceState {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            fields: BTreeMap::new(),
            cache: HashMap::new(),
            timestamp: HashMap::new(),
            changed: false,
        }
    }

    fn spec(&self, name: &str) -> Result<&'static FieldSpec, FieldError> {
        self.schema
            .get(name)
            .ok_or_else(|| FieldError::UnknownField(name.to_string()))
    }

    /// Convert `raw` through the named field and store it if it counts as a change.
    ///
    /// Returns whether the write was accepted.
    pub fn write(&mut self, name: &str, raw: &[u8]) -> Result<bool, FieldError> {
        self.write_at(name, raw, Instant::now())
    }

    /// Like [`DeviceState::write`], with an explicit current time.
    pub fn write_at(&mut self, name: &str, raw: &[u8], now: Instant) -> Result<bool, FieldError> {
        let spec = self.spec(name)?;
        let value = spec.convert(raw)?;
        self.store(spec, value, now)
    }

    /// Set an attribute from an already typed value, e.g. a parsed address.
    pub fn set_attribute(&mut self, name: &str, value: FieldValue) -> Result<bool, FieldError> {
        let spec = self.spec(name)?;
        if !spec.is_attribute() {
            return Err(FieldError::NotAnAttribute(spec.name));
        }
        self.store(spec, value, Instant::now())
    }

    fn store(
        &mut self,
        spec: &'static FieldSpec,
        value: FieldValue,
        now: Instant,
    ) -> Result<bool, FieldError> {
        let accept = match spec.kind {
            FieldKind::Attribute => match self.cache.get(spec.name) {
                None => true,
                Some(current) if spec.equals(&value, current) => false,
                Some(current) => {
                    return Err(FieldError::AttributeOverwrite {
                        field: spec.name,
                        current: current.to_string(),
                        attempted: value.to_string(),
                    });
                }
            },
            FieldKind::Reading(reading) => {
                match (self.cache.get(spec.name), self.timestamp.get(spec.name)) {
                    (Some(cached), Some(last)) => {
                        !spec.equals(&value, cached)
                            || now.saturating_duration_since(*last) > reading.ttl
                    }
                    _ => true,
                }
            }
        };

        if !accept {
            trace!(field = spec.name, %value, "unchanged, not accepted");
            return Ok(false);
        }

        self.cache.insert(spec.name, value.clone());
        self.timestamp.insert(spec.name, now);
        self.fields.insert(spec.name, value);
        self.changed = true;
        Ok(true)
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

    /// Whether a write has been accepted since the flag was last taken.
    pub fn get_changed(&self) -> bool {
        self.changed
    }

    /// Read and clear the changed flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// All fields ever set, each with its latest accepted value.
    pub fn snapshot(&self) -> &BTreeMap<&'static str, FieldValue> {
        &self.fields
    }

    /// Forget every field, including cached values and timestamps.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.cache.clear();
        self.timestamp.clear();
        self.changed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ReadingSpec;
    use crate::test_utils::TEST_MAC;
    use rust_decimal::Decimal;
    use std::time::Duration;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::attribute(ADDRESS_FIELD),
        FieldSpec::attribute("name"),
        FieldSpec::reading(
            "temperature",
            ReadingSpec::new(2, 1, true, -1).with_ttl(Duration::from_secs(3)),
        ),
        FieldSpec::reading("battery_level", ReadingSpec::new(1, 0, false, 0)),
    ];
    const SCHEMA: Schema = Schema::new(FIELDS);

    fn temperature(state: &DeviceState) -> Option<Decimal> {
        state.get("temperature").and_then(FieldValue::as_decimal)
    }

    fn keys_match(state: &DeviceState) -> bool {
        state.fields.len() == state.cache.len()
            && state.fields.len() == state.timestamp.len()
            && state
                .fields
                .keys()
                .all(|k| state.cache.contains_key(k) && state.timestamp.contains_key(k))
    }

    #[test]
    fn test_first_write_is_accepted() {
        let mut state = DeviceState::new(SCHEMA);
        assert!(!state.get_changed());
        assert!(state.write("temperature", &[0xD5, 0x00]).unwrap());
        assert!(state.get_changed());
        assert_eq!(temperature(&state), Some(Decimal::new(213, 1)));
        assert!(keys_match(&state));
    }

    #[test]
    fn test_same_value_within_ttl_is_not_a_change() {
        let mut state = DeviceState::new(SCHEMA);
        let t0 = Instant::now();
        assert!(state.write_at("temperature", &[0xD5, 0x00], t0).unwrap());
        assert!(state.take_changed());

        let t1 = t0 + Duration::from_secs(1);
        assert!(!state.write_at("temperature", &[0xD5, 0x00], t1).unwrap());
        assert!(!state.get_changed());
    }

    #[test]
    fn test_tolerance_boundary() {
        let mut state = DeviceState::new(SCHEMA);
        let t0 = Instant::now();
        // 20.0
        state.write_at("temperature", &[0xC8, 0x00], t0).unwrap();
        state.take_changed();

        // 20.1 is within one unit of the last decimal place
        assert!(!state.write_at("temperature", &[0xC9, 0x00], t0).unwrap());
        assert_eq!(temperature(&state), Some(Decimal::new(200, 1)));

        // 20.2 is not
        assert!(state.write_at("temperature", &[0xCA, 0x00], t0).unwrap());
        assert!(state.take_changed());
        assert_eq!(temperature(&state), Some(Decimal::new(202, 1)));
    }

    #[test]
    fn test_rejected_write_keeps_cached_value() {
        let mut state = DeviceState::new(SCHEMA);
        let t0 = Instant::now();
        state.write_at("temperature", &[0xC8, 0x00], t0).unwrap();
        // drift one step at a time: each compared against 20.0, not the previous write
        assert!(!state.write_at("temperature", &[0xC9, 0x00], t0).unwrap());
        assert!(!state.write_at("temperature", &[0xC7, 0x00], t0).unwrap());
        assert!(state.write_at("temperature", &[0xC6, 0x00], t0).unwrap());
    }

    #[test]
    fn test_ttl_heartbeat() {
        let mut state = DeviceState::new(SCHEMA);
        let t0 = Instant::now();
        state.write_at("temperature", &[0xD5, 0x00], t0).unwrap();
        state.take_changed();

        // exactly at the ttl is not yet expired
        let at_ttl = t0 + Duration::from_secs(3);
        assert!(!state.write_at("temperature", &[0xD5, 0x00], at_ttl).unwrap());

        let after_ttl = t0 + Duration::from_millis(3001);
        assert!(state.write_at("temperature", &[0xD5, 0x00], after_ttl).unwrap());
        assert!(state.take_changed());

        // the heartbeat restarts the ttl window
        let soon_after = after_ttl + Duration::from_secs(1);
        assert!(!state.write_at("temperature", &[0xD5, 0x00], soon_after).unwrap());
    }

    #[test]
    fn test_attribute_set_once_rejects_different_value() {
        let mut state = DeviceState::new(SCHEMA);
        assert!(state.write("name", b"Kitchen").unwrap());
        let err = state.write("name", b"Bedroom").unwrap_err();
        assert_eq!(
            err,
            FieldError::AttributeOverwrite {
                field: "name",
                current: "Kitchen".to_string(),
                attempted: "Bedroom".to_string(),
            }
        );
        assert_eq!(state.get("name"), Some(&FieldValue::from("Kitchen")));
    }

    #[test]
    fn test_attribute_same_value_is_noop() {
        let mut state = DeviceState::new(SCHEMA);
        state.set_attribute(ADDRESS_FIELD, TEST_MAC.into()).unwrap();
        assert!(state.take_changed());

        assert!(!state.set_attribute(ADDRESS_FIELD, TEST_MAC.into()).unwrap());
        assert!(!state.get_changed());
        assert_eq!(state.mac_address(), Some(TEST_MAC));
    }

    #[test]
    fn test_set_attribute_on_reading_fails() {
        let mut state = DeviceState::new(SCHEMA);
        assert_eq!(
            state.set_attribute("temperature", FieldValue::Integer(1)),
            Err(FieldError::NotAnAttribute("temperature"))
        );
    }

    #[test]
    fn test_unknown_field() {
        let mut state = DeviceState::new(SCHEMA);
        assert_eq!(
            state.write("pressure", &[0x01]),
            Err(FieldError::UnknownField("pressure".to_string()))
        );
    }

    #[test]
    fn test_width_error_leaves_state_untouched() {
        let mut state = DeviceState::new(SCHEMA);
        assert!(matches!(
            state.write("temperature", &[0xD5]),
            Err(FieldError::Width { .. })
        ));
        assert!(state.snapshot().is_empty());
        assert!(!state.get_changed());
    }

    #[test]
    fn test_snapshot_holds_all_fields() {
        let mut state = DeviceState::new(SCHEMA);
        state.set_attribute(ADDRESS_FIELD, TEST_MAC.into()).unwrap();
        state.write("battery_level", &[0x64]).unwrap();
        state.write("temperature", &[0xD5, 0x00]).unwrap();

        let keys: Vec<_> = state.snapshot().keys().copied().collect();
        assert_eq!(keys, vec!["battery_level", ADDRESS_FIELD, "temperature"]);
        assert!(keys_match(&state));
    }

    #[test]
    fn test_clear() {
        let mut state = DeviceState::new(SCHEMA);
        state.write("battery_level", &[0x64]).unwrap();
        state.clear();
        assert!(state.snapshot().is_empty());
        assert!(!state.get_changed());
        assert!(keys_match(&state));
        // a cleared field is written again as if new
        assert!(state.write("battery_level", &[0x64]).unwrap());
    }
}
