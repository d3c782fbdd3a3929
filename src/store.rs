//! Live per-device state for the display layer.
//!
//! The store holds one [`DeviceState`] per roster entry for the lifetime of
//! the process. Writers swap in a new mapping; readers share immutable,
//! fully-formed snapshots and can follow changes as a stream.

use crate::decoder::Reading;
use crate::device_id::DeviceId;
use crate::roster::Roster;
use futures::Stream;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;

/// Text shown for a value that has not been received yet.
pub const PLACEHOLDER: &str = "--";

/// Latest known readings for one beacon.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    /// Roster label, e.g. "3"
    pub label: String,
    /// Voltage with unit, e.g. "3.814 V"
    pub formatted_voltage: String,
    /// Voltage in Volts
    pub raw_voltage: f64,
    /// Temperature with unit, e.g. "25.62°C"
    pub formatted_temperature: String,
    /// Temperature in Celsius
    pub raw_temperature_c: f64,
    /// Milliseconds between the two most recent advertisements, 0 for the first
    pub inter_arrival_ms: i64,
    /// When the most recent advertisement was observed
    pub last_seen_at: Option<SystemTime>,
}

impl DeviceState {
    /// A record for a device that has not been heard from yet.
    pub fn placeholder(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            formatted_voltage: PLACEHOLDER.to_string(),
            raw_voltage: 0.0,
            formatted_temperature: PLACEHOLDER.to_string(),
            raw_temperature_c: 0.0,
            inter_arrival_ms: 0,
            last_seen_at: None,
        }
    }

    /// A copy of this record carrying a new reading.
    pub fn with_reading(
        &self,
        reading: &Reading,
        inter_arrival_ms: i64,
        seen_at: SystemTime,
    ) -> Self {
        Self {
            label: self.label.clone(),
            formatted_voltage: reading.formatted_voltage(),
            raw_voltage: reading.voltage,
            formatted_temperature: reading.formatted_temperature(),
            raw_temperature_c: reading.temperature_c,
            inter_arrival_ms,
            last_seen_at: Some(seen_at),
        }
    }

    pub fn has_reading(&self) -> bool {
        self.last_seen_at.is_some()
    }
}

/// Full view of every tracked device.
pub type Snapshot = BTreeMap<DeviceId, DeviceState>;

/// Concurrent identity → state mapping with change notification.
///
/// The current mapping sits behind an `Arc`, so readers only hold the
/// channel lock long enough to bump a reference count. Cloning yields
/// another handle to the same store.
#[derive(Debug, Clone)]
pub struct DeviceStateStore {
    state: Arc<watch::Sender<Arc<Snapshot>>>,
}

impl DeviceStateStore {
    /// Create a store with a placeholder record for every roster entry.
    pub fn new(roster: &Roster) -> Self {
        let initial: Snapshot = roster
            .iter()
            .map(|(id, label)| (*id, DeviceState::placeholder(label)))
            .collect();
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            state: Arc::new(sender),
        }
    }

    /// Replace the record for `device` and notify subscribers.
    ///
    /// Devices outside the roster are never tracked; the call is a no-op for
    /// them and returns `false`.
    pub fn update(&self, device: &DeviceId, new_state: DeviceState) -> bool {
        self.state.send_if_modified(|snapshot| {
            if !snapshot.contains_key(device) {
                return false;
            }
            // Copy-on-write: snapshots held by readers stay untouched.
            Arc::make_mut(snapshot).insert(*device, new_state);
            true
        })
    }

    pub fn get(&self, device: &DeviceId) -> Option<DeviceState> {
        let snapshot = self.snapshot();
        snapshot.get(device).cloned()
    }

    /// The whole mapping as of now.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.borrow())
    }

    /// Follow the store: yields the current snapshot immediately, then one
    /// snapshot per change.
    ///
    /// Slow subscribers skip intermediate snapshots and always resume at the
    /// latest one. The stream ends when the last store handle is dropped.
    pub fn subscribe(&self) -> impl Stream<Item = Arc<Snapshot>> + Send + 'static {
        let receiver = self.state.subscribe();
        futures::stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let snapshot = Arc::clone(&receiver.borrow_and_update());
            Some((snapshot, (receiver, false)))
        })
    }
}
