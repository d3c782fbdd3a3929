//! The fixed set of beacons this process tracks.
//!
//! A roster maps each device address to a human-readable label. It is built
//! once at startup (from the command line or the reference deployment) and
//! shared read-only afterwards.

use crate::device_id::DeviceId;
use std::collections::BTreeMap;

/// A parsed `MAC=LABEL` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub device: DeviceId,
    pub label: String,
}

/// Parse a roster entry from a string in the format "MAC=LABEL".
///
/// # Example
/// ```
/// use beacon_telemetry::roster::parse_roster_entry;
///
/// let entry = parse_roster_entry("58:35:0F:DC:8D:BB=1").unwrap();
/// assert_eq!(entry.device.to_string(), "58:35:0F:DC:8D:BB");
/// assert_eq!(entry.label, "1");
/// ```
pub fn parse_roster_entry(src: &str) -> Result<RosterEntry, String> {
    let (address, label) = src
        .split_once('=')
        .ok_or_else(|| "invalid device: expected format MAC=LABEL".to_string())?;

    let device = address.parse::<DeviceId>().map_err(|e| e.to_string())?;
    if label.is_empty() {
        return Err(format!("invalid device: empty label for {device}"));
    }

    Ok(RosterEntry {
        device,
        label: label.to_string(),
    })
}

/// Identity → label mapping for every tracked beacon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    labels: BTreeMap<DeviceId, String>,
}

impl Roster {
    /// The six cells of the reference deployment, labelled "1" through "6".
    pub fn reference() -> Self {
        const REFERENCE: [([u8; 6], &str); 6] = [
            ([0x58, 0x35, 0x0F, 0xDC, 0x8D, 0xBB], "1"),
            ([0x58, 0x35, 0x0F, 0xDC, 0x8D, 0xA9], "2"),
            ([0x58, 0x35, 0x0F, 0xDC, 0x8D, 0xBA], "3"),
            ([0x58, 0x35, 0x0F, 0xDC, 0x8D, 0xC9], "4"),
            ([0x58, 0x35, 0x0F, 0xDC, 0x8D, 0xB9], "5"),
            ([0x58, 0x35, 0x0F, 0xDC, 0x8D, 0xC7], "6"),
        ];

        REFERENCE
            .into_iter()
            .map(|(bytes, label)| (DeviceId(bytes), label.to_string()))
            .collect()
    }

    /// Build a roster from parsed entries. Later duplicates overwrite earlier ones.
    pub fn from_entries(entries: &[RosterEntry]) -> Self {
        entries
            .iter()
            .map(|e| (e.device, e.label.clone()))
            .collect()
    }

    pub fn contains(&self, device: &DeviceId) -> bool {
        self.labels.contains_key(device)
    }

    pub fn label(&self, device: &DeviceId) -> Option<&str> {
        self.labels.get(device).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &str)> {
        self.labels.iter().map(|(id, label)| (id, label.as_str()))
    }

    /// Devices in display order: numeric labels ascending, then the rest
    /// alphabetically.
    pub fn layout(&self) -> Vec<(DeviceId, &str)> {
        let mut devices: Vec<(DeviceId, &str)> =
            self.iter().map(|(id, label)| (*id, label)).collect();
        devices.sort_by(|(_, a), (_, b)| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        });
        devices
    }
}

impl FromIterator<(DeviceId, String)> for Roster {
    fn from_iter<I: IntoIterator<Item = (DeviceId, String)>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}
