//! BlueZ D-Bus radio driver.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{DriverFuture, RadioDriver, ScanError, ScanSettings};
use crate::bus::{Publisher, RawDiscoveryEvent};
use crate::device_id::DeviceId;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use tokio::task::JoinHandle;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::DriverUnavailable(err.to_string())
    }
}

/// Discovery-based scanner on the default adapter.
///
/// Each scan owns its D-Bus session inside a spawned task; aborting the task
/// drops the discovery stream, which ends the discovery session in BlueZ.
#[derive(Debug, Default)]
pub struct BluerDriver {
    scan: Mutex<Option<JoinHandle<()>>>,
}

impl BluerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace_scan(&self, next: Option<JoinHandle<()>>) {
        let mut scan = self.scan.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *scan, next) {
            previous.abort();
        }
    }
}

impl RadioDriver for BluerDriver {
    fn start_scan(&self, settings: ScanSettings, publisher: Publisher) -> DriverFuture<'_> {
        Box::pin(async move {
            // Tear down the previous discovery before BlueZ sees a new filter.
            self.replace_scan(None);
            let task = start_discovery(settings, publisher).await?;
            self.replace_scan(Some(task));
            Ok(())
        })
    }

    fn stop_scan(&self) -> DriverFuture<'_> {
        Box::pin(async move {
            self.replace_scan(None);
            Ok(())
        })
    }
}

/// Power the adapter, apply the LE discovery filter and spawn the event loop.
async fn start_discovery(
    settings: ScanSettings,
    publisher: Publisher,
) -> Result<JoinHandle<()>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: settings.duplicate_data,
            rssi: settings.rssi_threshold,
            ..Default::default()
        })
        .await?;

    let events = adapter.discover_devices_with_changes().await?;
    tracing::debug!(adapter = adapter.name(), "BlueZ discovery started");

    // Spawn a task that owns all Bluetooth state and runs the event loop
    Ok(tokio::spawn(async move {
        let _session = session;
        let mut events = Box::pin(events);

        while let Some(event) = events.next().await {
            // Property changes (new advertisement data) are reported as
            // DeviceAdded again when duplicates are enabled.
            if let AdapterEvent::DeviceAdded(address) = event {
                forward_advertisement(&adapter, address, &publisher).await;
            }
        }
        tracing::debug!("BlueZ discovery stream ended");
    }))
}

/// Read manufacturer data for `address` and publish it to the bus.
///
/// The payload is the value of the lowest company identifier present; the
/// identifier itself is not part of the payload.
async fn forward_advertisement(adapter: &Adapter, address: Address, publisher: &Publisher) {
    let Ok(device) = adapter.device(address) else {
        return;
    };

    let manufacturer_data = match device.manufacturer_data().await {
        Ok(Some(data)) => data,
        Ok(None) => return,
        Err(e) => {
            tracing::trace!(%address, error = %e, "could not read manufacturer data");
            return;
        }
    };

    if let Some((_, payload)) = manufacturer_data.into_iter().min_by_key(|(id, _)| *id) {
        let device: DeviceId = address.into();
        publisher.publish(RawDiscoveryEvent::new(device, payload, SystemTime::now()));
    }
}
