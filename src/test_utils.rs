use crate::bus::{Publisher, RawDiscoveryEvent};
use crate::device_id::DeviceId;
use crate::driver::{DriverFuture, RadioDriver, ScanError, ScanSettings, WakeHold};
use crate::roster::Roster;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A stable device address for unit tests.
pub const TEST_DEVICE: DeviceId = DeviceId([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// 0x06D0 = 1744 mV -> "3.814 V", 0x6750 = 26448 -> "25.62°C".
pub const VALID_PAYLOAD: [u8; 6] = [0x06, 0xD0, 0x67, 0x50, 0x00, 0x00];

/// Roster with devices "A" (…:01) and "B" (…:02).
pub fn two_device_roster() -> (Roster, DeviceId, DeviceId) {
    let a = DeviceId([0x58, 0x35, 0x0F, 0xDC, 0x00, 0x01]);
    let b = DeviceId([0x58, 0x35, 0x0F, 0xDC, 0x00, 0x02]);
    let roster = [(a, "A".to_string()), (b, "B".to_string())]
        .into_iter()
        .collect();
    (roster, a, b)
}

/// Driver that records calls, can refuse or stall, and publishes a fixed
/// batch of events on every successful start.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    failures_left: AtomicUsize,
    fail_stop: bool,
    stall_start: bool,
    stall_stop: bool,
    on_start: Mutex<Vec<RawDiscoveryEvent>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` start requests.
    pub fn failing_starts(n: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Every stop request fails.
    pub fn failing_stops() -> Self {
        Self {
            fail_stop: true,
            ..Self::default()
        }
    }

    /// Start requests never complete.
    pub fn stalling_starts() -> Self {
        Self {
            stall_start: true,
            ..Self::default()
        }
    }

    /// Stop requests never complete.
    pub fn stalling_stops() -> Self {
        Self {
            stall_stop: true,
            ..Self::default()
        }
    }

    /// Publish `events` every time a scan starts.
    pub fn publishing(events: Vec<RawDiscoveryEvent>) -> Self {
        Self {
            on_start: Mutex::new(events),
            ..Self::default()
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl RadioDriver for ScriptedDriver {
    fn start_scan(&self, _settings: ScanSettings, publisher: Publisher) -> DriverFuture<'_> {
        Box::pin(async move {
            if self.stall_start {
                std::future::pending::<()>().await;
            }
            let refused = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ScanError::DriverUnavailable("radio off".to_string()));
            }

            self.starts.fetch_add(1, Ordering::SeqCst);
            let events = self.on_start.lock().unwrap().clone();
            for event in events {
                publisher.publish(event);
            }
            Ok(())
        })
    }

    fn stop_scan(&self) -> DriverFuture<'_> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.stall_stop {
                std::future::pending::<()>().await;
            }
            if self.fail_stop {
                return Err(ScanError::DriverUnavailable("stop refused".to_string()));
            }
            Ok(())
        })
    }
}

/// Wake hold that counts acquisitions and releases.
#[derive(Debug, Default)]
pub struct CountingWakeHold {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub last_timeout: Mutex<Option<Duration>>,
}

impl WakeHold for CountingWakeHold {
    fn acquire(&self, timeout: Duration) -> Result<(), ScanError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        *self.last_timeout.lock().unwrap() = Some(timeout);
        Ok(())
    }

    fn release(&self) -> Result<(), ScanError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
