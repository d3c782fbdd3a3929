//! Hardware identity of a tracked beacon.
//!
//! Beacons are identified by their 6-byte Bluetooth device address. The type
//! is independent of the radio backend so the core can be exercised without
//! any Bluetooth library compiled in.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of octets in a device address.
pub const DEVICE_ID_LEN: usize = 6;

/// A beacon's hardware address, e.g. `58:35:0F:DC:8D:BB`.
///
/// Ordering follows the address bytes so snapshots keyed by `DeviceId`
/// iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceId(pub [u8; DEVICE_ID_LEN]);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing a device address string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseDeviceIdError {
    #[error("invalid device address: expected 6 octets, got {0}")]
    OctetCount(usize),
    #[error("invalid device address: octet {0} must be two hex digits")]
    OctetWidth(usize),
    #[error("invalid device address: '{0}' is not valid hex")]
    Hex(String),
}

impl FromStr for DeviceId {
    type Err = ParseDeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split(':').collect();
        if octets.len() != DEVICE_ID_LEN {
            return Err(ParseDeviceIdError::OctetCount(octets.len()));
        }

        let mut bytes = [0u8; DEVICE_ID_LEN];
        for (slot, (i, octet)) in bytes.iter_mut().zip(octets.into_iter().enumerate()) {
            if octet.len() != 2 {
                return Err(ParseDeviceIdError::OctetWidth(i));
            }
            *slot = u8::from_str_radix(octet, 16)
                .map_err(|_| ParseDeviceIdError::Hex(octet.to_string()))?;
        }

        Ok(DeviceId(bytes))
    }
}

impl From<[u8; DEVICE_ID_LEN]> for DeviceId {
    fn from(bytes: [u8; DEVICE_ID_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for DeviceId {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<DeviceId> for bluer::Address {
    fn from(id: DeviceId) -> Self {
        bluer::Address(id.0)
    }
}
