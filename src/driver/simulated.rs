//! Synthetic radio for demos and tests.
//!
//! Emits one advertisement per roster device every `period`, with voltage
//! and temperature words that drift slowly so the display has something to
//! show without hardware.

use super::{DriverFuture, RadioDriver, ScanSettings};
use crate::bus::{Publisher, RawDiscoveryEvent};
use crate::device_id::DeviceId;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// Interval between synthetic advertisement rounds.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(500);

/// Nominal ADC reading (mV at the divider tap).
const BASE_ADC: u16 = 1700;
/// Roughly 22 °C.
const BASE_TEMPERATURE_WORD: u16 = 25_000;

#[derive(Debug)]
pub struct SimulatedDriver {
    devices: Vec<DeviceId>,
    period: Duration,
    scan: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedDriver {
    pub fn new(devices: Vec<DeviceId>, period: Duration) -> Self {
        Self {
            devices,
            period,
            scan: Mutex::new(None),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn replace_scan(&self, next: Option<JoinHandle<()>>) {
        let mut scan = self.scan.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *scan, next) {
            previous.abort();
        }
    }
}

/// Payload for round `round` of device number `index`.
pub fn synthetic_payload(index: usize, round: u64) -> [u8; 6] {
    let wobble = (round + index as u64 * 7) % 40;
    let adc = BASE_ADC + wobble as u16;
    let temperature = BASE_TEMPERATURE_WORD + (wobble as u16) * 25;
    let [adc_hi, adc_lo] = adc.to_be_bytes();
    let [temp_hi, temp_lo] = temperature.to_be_bytes();
    [adc_hi, adc_lo, temp_hi, temp_lo, 0x00, 0x00]
}

impl RadioDriver for SimulatedDriver {
    fn start_scan(&self, _settings: ScanSettings, publisher: Publisher) -> DriverFuture<'_> {
        let devices = self.devices.clone();
        let period = self.period;
        Box::pin(async move {
            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                for round in 0u64.. {
                    ticker.tick().await;
                    for (index, device) in devices.iter().enumerate() {
                        publisher.publish(RawDiscoveryEvent::new(
                            *device,
                            synthetic_payload(index, round),
                            SystemTime::now(),
                        ));
                    }
                }
            });
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
