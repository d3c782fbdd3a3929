//! Radio driver abstraction.
//!
//! The scan coordinator talks to the radio through [`RadioDriver`] so the
//! duty-cycle logic can run against real hardware (BlueZ via `bluer`) or a
//! synthetic event source. Drivers push every advertisement they receive
//! onto the event bus through a [`Publisher`]; that call never blocks.

#[cfg(feature = "bluer")]
pub mod bluer;

pub mod simulated;

use crate::bus::Publisher;
use crate::roster::Roster;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type for radio and wake-hold operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The radio refused to start or stop a scan
    #[error("Radio driver unavailable: {0}")]
    DriverUnavailable(String),
    /// The wake hold could not be acquired or released
    #[error("Wake hold error: {0}")]
    WakeHold(String),
}

/// Future returned by driver operations.
pub type DriverFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ScanError>> + Send + 'a>>;

/// Parameters for a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Report every advertisement, not only the first one per device
    pub duplicate_data: bool,
    /// Ignore advertisements weaker than this, in dBm
    pub rssi_threshold: Option<i16>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            duplicate_data: true,
            rssi_threshold: None,
        }
    }
}

/// Start/stop capability over a BLE radio.
pub trait RadioDriver: Send + Sync {
    /// Begin a discovery scan, publishing every advertisement to `publisher`.
    ///
    /// Resolves once the radio has acknowledged the start. Starting while a
    /// scan is already running replaces the running scan.
    fn start_scan(&self, settings: ScanSettings, publisher: Publisher) -> DriverFuture<'_>;

    /// Stop the running scan. Stopping an idle driver succeeds.
    fn stop_scan(&self) -> DriverFuture<'_>;
}

/// Keeps the host awake while scanning.
///
/// Holds are requested with a timeout so a crashed process cannot pin the
/// host awake forever; the coordinator renews the hold on every restart.
pub trait WakeHold: Send + Sync {
    fn acquire(&self, timeout: Duration) -> Result<(), ScanError>;
    fn release(&self) -> Result<(), ScanError>;
}

/// Wake hold for hosts that do not suspend while the process runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWakeHold;

impl WakeHold for NoWakeHold {
    fn acquire(&self, _timeout: Duration) -> Result<(), ScanError> {
        Ok(())
    }

    fn release(&self) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Available radio backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Synthetic advertisements for every roster device
    Simulated,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(not(feature = "bluer"))]
        return Backend::Simulated;
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            Backend::Simulated => write!(f, "simulated"),
        }
    }
}

/// Build the driver for `backend`.
pub fn driver_for(backend: Backend, roster: &Roster) -> Arc<dyn RadioDriver> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => Arc::new(bluer::BluerDriver::new()),
        Backend::Simulated => Arc::new(simulated::SimulatedDriver::new(
            roster.iter().map(|(id, _)| *id).collect(),
            simulated::DEFAULT_PERIOD,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::DriverUnavailable("adapter powered off".to_string());
        assert_eq!(err.to_string(), "Radio driver unavailable: adapter powered off");

        let err = ScanError::WakeHold("lock denied".to_string());
        assert_eq!(err.to_string(), "Wake hold error: lock denied");
    }

    #[test]
    fn test_default_settings_report_duplicates() {
        let settings = ScanSettings::default();
        assert!(settings.duplicate_data);
        assert_eq!(settings.rssi_threshold, None);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Simulated.to_string(), "simulated");
        #[cfg(feature = "bluer")]
        assert_eq!(Backend::Bluer.to_string(), "bluer");
    }

    #[test]
    fn test_no_wake_hold_always_succeeds() {
        let hold = NoWakeHold;
        assert_eq!(hold.acquire(Duration::from_secs(1)), Ok(()));
        assert_eq!(hold.release(), Ok(()));
    }
}
