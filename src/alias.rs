//! Human-readable names for devices.
//!
//! Aliases map MAC addresses to names used in output, taking precedence over
//! the name a device advertises itself.

use crate::mac_address::MacAddress;
use std::collections::BTreeMap;

/// A type alias for MAC-to-name mappings.
pub type AliasMap = BTreeMap<MacAddress, String>;

/// A parsed alias mapping a MAC address to a human-readable name.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub address: MacAddress,
    pub name: String,
}

/// Parse an alias from a string in the format "MAC=NAME".
///
/// # Example
/// ```
/// use ble_sensor_decoder::alias::parse_alias;
///
/// let alias = parse_alias("AA:BB:CC:DD:EE:FF=Kitchen").unwrap();
/// assert_eq!(alias.address.to_string(), "AA:BB:CC:DD:EE:FF");
/// assert_eq!(alias.name, "Kitchen");
/// ```
pub fn parse_alias(src: &str) -> Result<Alias, String> {
    let (address, name) = src
        .split_once('=')
        .ok_or_else(|| "invalid alias: expected format MAC=NAME".to_string())?;
    let address = address
        .parse::<MacAddress>()
        .map_err(|e| format!("invalid alias: {e}"))?;
    Ok(Alias {
        address,
        name: name.into(),
    })
}

/// Convert a slice of Alias values into an AliasMap.
pub fn to_map(aliases: &[Alias]) -> AliasMap {
    aliases
        .iter()
        .map(|a| (a.address, a.name.clone()))
        .collect()
}

/// Pick the display name for a device: alias, then advertised name, then address.
pub fn resolve_name(mac: &MacAddress, advertised: Option<&str>, aliases: &AliasMap) -> String {
    match (aliases.get(mac), advertised) {
        (Some(alias), _) => alias.clone(),
        (None, Some(name)) if !name.is_empty() => name.to_string(),
        _ => mac.to_string(),
    }
}
