//! Output formatters for device state.
//!
//! The display side of the process: each formatter turns one device's latest
//! state into a line of text. Devices that have not been heard from yet are
//! skipped.

pub mod influxdb;

use crate::device_id::DeviceId;
use crate::store::DeviceState;

/// Trait for formatting device state into output lines.
pub trait SnapshotFormatter: Send + Sync {
    /// Format `state`, or `None` if there is nothing to report yet.
    fn format(&self, device: &DeviceId, state: &DeviceState) -> Option<String>;
}
