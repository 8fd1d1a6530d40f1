//! Field descriptors: how a named field turns raw bytes into a value and
//! whether a new value counts as a change.
//!
//! Two kinds exist. Attribute fields are identifying, write-once values such as
//! a device address or name. Reading fields are numeric sensor values decoded
//! from a fixed-width integer, scaled by a power of ten and quantized to a
//! number of decimal places. A reading is only considered changed when it
//! moves by more than one unit in its last decimal place.

use crate::mac_address::MacAddress;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Largest number of raw bytes a reading may be decoded from.
pub const MAX_READING_WIDTH: usize = 8;

/// Largest supported number of decimal places.
pub const MAX_PRECISION: u32 = 28;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Free-form text, e.g. a device name.
    Text(String),
    /// A device address.
    Address(MacAddress),
    /// An unscaled integer counter or level.
    Integer(i64),
    /// A scaled reading carrying exactly its declared number of decimals.
    Decimal(Decimal),
}

impl FieldValue {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Integer(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Address(mac) => write!(f, "{mac}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Decimal(d) => write!(f, "{d}"),
        }
    }
}

impl From<MacAddress> for FieldValue {
    fn from(mac: MacAddress) -> Self {
        FieldValue::Address(mac)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// Errors raised while converting or storing a field value.
///
/// These indicate internal inconsistencies rather than foreign packets, so
/// they are propagated to the caller instead of being swallowed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("field '{field}': expected {expected} bytes, got {actual}")]
    Width {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("field '{field}': value out of range")]
    Overflow { field: &'static str },
    #[error("attribute '{field}' is already set to {current}, refusing {attempted}")]
    AttributeOverwrite {
        field: &'static str,
        current: String,
        attempted: String,
    },
    #[error("field '{0}' is not an attribute")]
    NotAnAttribute(&'static str),
    #[error("unknown field '{0}'")]
    UnknownField(String),
}

/// Byte order of a raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Numeric parameters of a reading field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingSpec {
    /// Number of raw bytes the value is decoded from.
    pub width: usize,
    /// Decimal places kept in the decoded value.
    pub precision: u32,
    /// Whether the raw integer is two's complement.
    pub signed: bool,
    /// Power of ten applied to the raw integer.
    pub scale: i32,
    /// Byte order of the raw integer.
    pub byte_order: ByteOrder,
    /// Maximum time an unchanged value may go unreported.
    pub ttl: Duration,
}

impl ReadingSpec {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    /// A little-endian reading with the default TTL.
    pub const fn new(width: usize, precision: u32, signed: bool, scale: i32) -> Self {
        assert!(width > 0 && width <= MAX_READING_WIDTH, "unsupported reading width");
        assert!(precision <= MAX_PRECISION, "precision too large");
        Self {
            width,
            precision,
            signed,
            scale,
            byte_order: ByteOrder::Little,
            ttl: Self::DEFAULT_TTL,
        }
    }

    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        assert!(!ttl.is_zero(), "ttl must be positive");
        self.ttl = ttl;
        self
    }

    pub const fn big_endian(mut self) -> Self {
        self.byte_order = ByteOrder::Big;
        self
    }

    /// Smallest step of the decoded value, `10^-precision`.
    pub fn resolution(&self) -> Decimal {
        Decimal::new(1, self.precision)
    }

    fn raw_integer(&self, raw: &[u8]) -> i128 {
        let fold = |acc: i128, b: &u8| (acc << 8) | i128::from(*b);
        let unsigned = match self.byte_order {
            ByteOrder::Little => raw.iter().rev().fold(0, fold),
            ByteOrder::Big => raw.iter().fold(0, fold),
        };
        let bits = 8 * raw.len() as u32;
        if self.signed && (unsigned >> (bits - 1)) & 1 == 1 {
            unsigned - (1i128 << bits)
        } else {
            unsigned
        }
    }
}

/// What kind of field a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Attribute,
    Reading(ReadingSpec),
}

/// Static description of one named field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn attribute(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Attribute,
        }
    }

    pub const fn reading(name: &'static str, spec: ReadingSpec) -> Self {
        Self {
            name,
            kind: FieldKind::Reading(spec),
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, FieldKind::Attribute)
    }

    /// Time after which an unchanged value is reported again. Attributes never expire.
    pub fn ttl(&self) -> Option<Duration> {
        match self.kind {
            FieldKind::Attribute => None,
            FieldKind::Reading(spec) => Some(spec.ttl),
        }
    }

    /// Convert raw bytes into this field's value.
    ///
    /// Attributes take the bytes as text, replacing invalid UTF-8. Readings
    /// decode an integer of exactly `width` bytes, scale it by `10^scale` and
    /// round it half-to-even to `precision` decimal places.
    pub fn convert(&self, raw: &[u8]) -> Result<FieldValue, FieldError> {
        let spec = match self.kind {
            FieldKind::Attribute => {
                return Ok(FieldValue::Text(String::from_utf8_lossy(raw).into_owned()));
            }
            FieldKind::Reading(spec) => spec,
        };

        if raw.len() != spec.width {
            return Err(FieldError::Width {
                field: self.name,
                expected: spec.width,
                actual: raw.len(),
            });
        }

        let overflow = || FieldError::Overflow { field: self.name };
        let integer = spec.raw_integer(raw);
        let value = if spec.scale >= 0 {
            let factor = 10i128.checked_pow(spec.scale.unsigned_abs()).ok_or_else(overflow)?;
            let scaled = integer.checked_mul(factor).ok_or_else(overflow)?;
            Decimal::try_from_i128_with_scale(scaled, 0).map_err(|_| overflow())?
        } else {
            Decimal::try_from_i128_with_scale(integer, spec.scale.unsigned_abs())
                .map_err(|_| overflow())?
        };

        let mut quantized = value.round_dp(spec.precision);
        quantized.rescale(spec.precision);
        Ok(FieldValue::Decimal(quantized))
    }

    /// Whether `new` counts as the same value as `old`.
    ///
    /// Readings tolerate a difference of up to one unit in the last decimal place.
    pub fn equals(&self, new: &FieldValue, old: &FieldValue) -> bool {
        let FieldKind::Reading(spec) = self.kind else {
            return new == old;
        };
        match (new.as_decimal(), old.as_decimal()) {
            (Some(new), Some(old)) => new
                .checked_sub(old)
                .is_some_and(|delta| delta.abs() <= spec.resolution()),
            _ => new == old,
        }
    }
}

const fn same_name(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// The fixed set of fields a device type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [FieldSpec],
}

impl Schema {
    /// Panics on duplicate field names; used in `const` items so a bad schema
    /// fails to compile.
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        let mut i = 0;
        while i < fields.len() {
            let mut j = i + 1;
            while j < fields.len() {
                assert!(
                    !same_name(fields[i].name, fields[j].name),
                    "duplicate field name in schema"
                );
                j += 1;
            }
            i += 1;
        }
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }
}
