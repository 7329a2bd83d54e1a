//! Device match criteria.
//!
//! Filters are plain values: every field left as `None` matches any device.
//! Backends evaluate them against the candidates they enumerate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// USB interface class code of HID interfaces.
pub const USB_CLASS_HID: u8 = 0x03;

/// Bluetooth HID profile service class (0x1124).
pub const HID_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1124_0000_1000_8000_0080_5f9b_34fb);

/// Criteria for selecting a USB HID interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub interface_class: Option<u8>,
    pub interface_subclass: Option<u8>,
    pub interface_protocol: Option<u8>,
    /// Case-insensitive prefix of the manufacturer string.
    pub manufacturer: Option<String>,
    /// Case-insensitive prefix of the product string.
    pub product: Option<String>,
    /// Exact serial number.
    pub serial_number: Option<String>,
}

/// A USB interface as seen during enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbCandidate {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl UsbFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on vendor and product ID only.
    pub fn ids(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, candidate: &UsbCandidate) -> bool {
        field_matches(self.vendor_id, candidate.vendor_id)
            && field_matches(self.product_id, candidate.product_id)
            && field_matches(self.interface_class, candidate.interface_class)
            && field_matches(self.interface_subclass, candidate.interface_subclass)
            && field_matches(self.interface_protocol, candidate.interface_protocol)
            && prefix_matches(self.manufacturer.as_deref(), candidate.manufacturer.as_deref())
            && prefix_matches(self.product.as_deref(), candidate.product.as_deref())
            && match (&self.serial_number, &candidate.serial_number) {
                (None, _) => true,
                (Some(wanted), Some(actual)) => wanted == actual,
                (Some(_), None) => false,
            }
    }
}

/// Criteria for selecting a Bluetooth HID device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothFilter {
    pub address: Option<BluetoothAddress>,
    /// Case-insensitive glob (`*`, `?`) on the device name. Without
    /// wildcards the pattern matches as a prefix.
    pub name_pattern: Option<String>,
    /// A service class the device must advertise.
    pub service_uuid: Option<Uuid>,
}

/// A Bluetooth device as seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluetoothCandidate {
    pub address: BluetoothAddress,
    pub name: Option<String>,
    pub services: Vec<Uuid>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl BluetoothFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(address: BluetoothAddress) -> Self {
        Self {
            address: Some(address),
            ..Default::default()
        }
    }

    pub fn matches(&self, candidate: &BluetoothCandidate) -> bool {
        field_matches(self.address, candidate.address)
            && match (&self.name_pattern, &candidate.name) {
                (None, _) => true,
                (Some(pattern), Some(name)) => name_matches(pattern, name),
                (Some(_), None) => false,
            }
            && self
                .service_uuid
                .is_none_or(|uuid| candidate.services.contains(&uuid))
    }
}

fn field_matches<T: PartialEq>(wanted: Option<T>, actual: T) -> bool {
    wanted.is_none_or(|w| w == actual)
}

fn prefix_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(wanted), Some(actual)) => actual
            .to_lowercase()
            .starts_with(&wanted.to_lowercase()),
        (Some(_), None) => false,
    }
}

fn name_matches(pattern: &str, name: &str) -> bool {
    if pattern.contains(['*', '?']) {
        glob_matches(&pattern.to_lowercase(), &name.to_lowercase())
    } else {
        name.to_lowercase().starts_with(&pattern.to_lowercase())
    }
}

fn glob_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it currently absorbs up to
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, absorbed)) = backtrack {
            p = star + 1;
            t = absorbed + 1;
            backtrack = Some((star, absorbed + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid Bluetooth address: {0}")]
pub struct AddressParseError(String);

/// A 48-bit Bluetooth device address, written most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BluetoothAddress([u8; 6]);

impl BluetoothAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for BluetoothAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressParseError(s.to_string());
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl TryFrom<String> for BluetoothAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BluetoothAddress> for String {
    fn from(address: BluetoothAddress) -> Self {
        address.to_string()
    }
}
