//! Drives the public API with a synthetic radio: roster, bus, coordinator,
//! pipeline and store wired together by `Monitor`.

use beacon_telemetry::driver::NoWakeHold;
use beacon_telemetry::{
    DeviceId, DeviceState, DriverFuture, Monitor, Publisher, RadioDriver, RawDiscoveryEvent,
    Roster, ScanConfig, ScanSettings, ScanState,
};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

const DEVICE_A: DeviceId = DeviceId([0x58, 0x35, 0x0F, 0xDC, 0x00, 0x0A]);
const DEVICE_B: DeviceId = DeviceId([0x58, 0x35, 0x0F, 0xDC, 0x00, 0x0B]);
const STRANGER: DeviceId = DeviceId([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

const PAYLOAD: [u8; 4] = [0x06, 0xD0, 0x67, 0x50];

fn at(ms: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(ms)
}

/// Emits a fixed batch of advertisements on the first start only.
struct OneShotRadio {
    events: Vec<RawDiscoveryEvent>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl OneShotRadio {
    fn new(events: Vec<RawDiscoveryEvent>) -> Self {
        Self {
            events,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }
}

impl RadioDriver for OneShotRadio {
    fn start_scan(&self, _settings: ScanSettings, publisher: Publisher) -> DriverFuture<'_> {
        Box::pin(async move {
            if self.starts.fetch_add(1, Ordering::SeqCst) == 0 {
                for event in &self.events {
                    publisher.publish(event.clone());
                }
            }
            Ok(())
        })
    }

    fn stop_scan(&self) -> DriverFuture<'_> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn roster() -> Roster {
    [(DEVICE_A, "A".to_string()), (DEVICE_B, "B".to_string())]
        .into_iter()
        .collect()
}

#[tokio::test(start_paused = true)]
async fn known_unknown_known_sequence() {
    let radio = Arc::new(OneShotRadio::new(vec![
        RawDiscoveryEvent::new(DEVICE_A, PAYLOAD, at(60_000)),
        RawDiscoveryEvent::new(STRANGER, PAYLOAD, at(60_200)),
        RawDiscoveryEvent::new(DEVICE_A, PAYLOAD, at(60_500)),
    ]));

    let monitor = Monitor::start(
        roster(),
        radio.clone(),
        Arc::new(NoWakeHold),
        ScanSettings::default(),
        ScanConfig::default(),
    );

    let mut updates = Box::pin(monitor.store().subscribe());
    let initial = updates.next().await.unwrap();
    assert_eq!(initial.len(), 2);

    while let Some(snapshot) = updates.next().await {
        if snapshot[&DEVICE_A].last_seen_at == Some(at(60_500)) {
            break;
        }
    }

    let a = monitor.store().get(&DEVICE_A).unwrap();
    assert_eq!(a.label, "A");
    assert_eq!(a.inter_arrival_ms, 500);
    assert_eq!(a.formatted_voltage, "3.814 V");
    assert_eq!(a.formatted_temperature, "25.62°C");

    assert_eq!(monitor.store().get(&DEVICE_B), Some(DeviceState::placeholder("B")));
    assert_eq!(monitor.store().get(&STRANGER), None);

    let stats = monitor.shutdown().await;
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.unknown, 1);
    assert_eq!(stats.dropped, 0);
    assert_eq!(radio.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn scan_restarts_on_cadence() {
    let radio = Arc::new(OneShotRadio::new(Vec::new()));
    let config = ScanConfig {
        restart_interval: Duration::from_secs(60),
        ..ScanConfig::default()
    };

    let monitor = Monitor::start(
        roster(),
        radio.clone(),
        Arc::new(NoWakeHold),
        ScanSettings::default(),
        config,
    );
    let mut state = monitor.scan_state();
    state.wait_for(|s| *s == ScanState::Active).await.unwrap();
    assert_eq!(radio.starts.load(Ordering::SeqCst), 1);

    // One full interval plus the settle delay later the scan is back up.
    tokio::time::sleep(Duration::from_millis(60_000 + 500 + 1)).await;
    assert_eq!(radio.starts.load(Ordering::SeqCst), 2);
    assert_eq!(radio.stops.load(Ordering::SeqCst), 1);

    monitor.shutdown().await;
    assert_eq!(*state.borrow(), ScanState::Stopped);
}

#[test]
fn reference_roster_layout() {
    let roster = Roster::reference();
    let labels: Vec<&str> = roster.layout().into_iter().map(|(_, label)| label).collect();
    assert_eq!(labels, ["1", "2", "3", "4", "5", "6"]);
}
