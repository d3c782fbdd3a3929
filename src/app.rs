//! Core application runner for `beacon-telemetry`.
//!
//! [`Monitor`] assembles the event bus, state store, scan coordinator and
//! ingestion pipeline around an injected radio driver. [`run_with_io`] adds
//! the display side: it follows the store and writes one line per fresh
//! reading. Neither depends on CLI parsing or process exit codes, so both
//! can be tested deterministically.

use crate::bus::EventBus;
use crate::config::ScanConfig;
use crate::coordinator::{CoordinatorHandle, ScanCoordinator, ScanState};
use crate::device_id::DeviceId;
use crate::driver::{Backend, NoWakeHold, RadioDriver, ScanError, ScanSettings, WakeHold};
use crate::output::SnapshotFormatter;
use crate::output::influxdb::InfluxDbFormatter;
use crate::pipeline::{IngestStats, Ingestor, PipelineHandle};
use crate::roster::{Roster, RosterEntry};
use crate::store::{DeviceStateStore, Snapshot};
use clap::Parser;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Beacon to track, with its display label. Repeatable.
    /// Format: --device 58:35:0F:DC:8D:BB=1
    /// Without any --device the six-cell reference roster is used.
    #[arg(long = "device", value_parser = crate::roster::parse_roster_entry, value_name = "DEVICE")]
    pub devices: Vec<RosterEntry>,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "beacon_telemetry")]
    pub influxdb_measurement: String,

    /// Event bus capacity (rounded up to a power of two).
    #[arg(long, default_value_t = crate::config::BUS_CAPACITY, value_parser = crate::config::parse_capacity)]
    pub bus_capacity: usize,

    /// How long each scan runs before it is restarted.
    /// Accepts duration with suffix: 500ms, 30s, 4m, 1h.
    #[arg(long, default_value = "4m", value_parser = crate::config::parse_duration)]
    pub restart_interval: Duration,

    /// Pause between stopping and restarting a scan.
    #[arg(long, default_value = "500ms", value_parser = crate::config::parse_duration)]
    pub settle_delay: Duration,

    /// Ignore advertisements weaker than this, in dBm (e.g. -80)
    #[arg(long, allow_hyphen_values = true)]
    pub rssi_threshold: Option<i16>,

    /// Radio backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Verbose output, log dropped and malformed advertisements
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    pub fn roster(&self) -> Roster {
        if self.devices.is_empty() {
            Roster::reference()
        } else {
            Roster::from_entries(&self.devices)
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            bus_capacity: self.bus_capacity,
            restart_interval: self.restart_interval,
            settle_delay: self.settle_delay,
            ..ScanConfig::default()
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            rssi_threshold: self.rssi_threshold,
            ..ScanSettings::default()
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A running scanner: coordinator and ingestion tasks sharing one bus and
/// one store.
#[derive(Debug)]
pub struct Monitor {
    roster: Arc<Roster>,
    store: DeviceStateStore,
    coordinator: CoordinatorHandle,
    pipeline: PipelineHandle,
}

impl Monitor {
    /// Spawn the ingestion and scan tasks. Must be called within a Tokio
    /// runtime.
    pub fn start(
        roster: Roster,
        driver: Arc<dyn RadioDriver>,
        wake: Arc<dyn WakeHold>,
        settings: ScanSettings,
        config: ScanConfig,
    ) -> Self {
        let roster = Arc::new(roster);
        let bus = EventBus::new(config.bus_capacity);
        let store = DeviceStateStore::new(&roster);

        // Attach the consumer before the radio can publish anything.
        let pipeline = Ingestor::new(roster.clone(), store.clone()).spawn(bus.subscribe());
        let coordinator = ScanCoordinator::new(driver, &bus, config)
            .with_wake_hold(wake)
            .with_settings(settings)
            .spawn();

        tracing::info!(devices = roster.len(), capacity = bus.capacity(), "monitor started");
        Self {
            roster,
            store,
            coordinator,
            pipeline,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    pub fn scan_state(&self) -> watch::Receiver<ScanState> {
        self.coordinator.watch_state()
    }

    /// The radio's most recent refusal to start, if no start has succeeded
    /// since.
    pub fn scan_error(&self) -> Option<ScanError> {
        self.coordinator.last_error()
    }

    pub fn watch_scan_errors(&self) -> watch::Receiver<Option<ScanError>> {
        self.coordinator.watch_errors()
    }

    /// Stop the radio, cancel the restart timer, release the wake hold and
    /// end the drain task. Each step runs regardless of earlier failures.
    pub async fn shutdown(self) -> IngestStats {
        // Both tasks are signalled on the first poll, so a slow radio stop
        // does not hold up the drain task.
        let ((), stats) = tokio::join!(self.coordinator.shutdown(), self.pipeline.shutdown());
        tracing::info!(
            updated = stats.updated,
            unknown = stats.unknown,
            malformed = stats.malformed,
            dropped = stats.dropped,
            "monitor stopped"
        );
        stats
    }
}

/// Write a line for every device whose reading is newer than the last one
/// written.
fn write_fresh(
    formatter: &dyn SnapshotFormatter,
    snapshot: &Snapshot,
    written: &mut HashMap<DeviceId, SystemTime>,
    out: &mut dyn Write,
) -> io::Result<()> {
    for (device, state) in snapshot {
        let Some(seen) = state.last_seen_at else {
            continue;
        };
        if written.get(device) == Some(&seen) {
            continue;
        }
        if let Some(line) = formatter.format(device, state) {
            writeln!(out, "{line}")?;
        }
        written.insert(*device, seen);
    }
    Ok(())
}

/// Run the monitor, writing formatted readings to `out` until `shutdown`
/// resolves.
///
/// Readings are written as InfluxDB line protocol, one line per device per
/// fresh advertisement (intermediate readings may be coalesced when the
/// writer is slower than the radio).
///
/// # Errors
/// Returns [`RunError::Scan`] if the radio was still refusing to start when
/// `shutdown` resolved, and [`RunError::Io`] if writing fails.
pub async fn run_with_io(
    options: Options,
    driver: Arc<dyn RadioDriver>,
    out: &mut dyn Write,
    shutdown: impl Future<Output = ()>,
) -> Result<IngestStats, RunError> {
    let formatter = InfluxDbFormatter::new(options.influxdb_measurement.clone());
    let monitor = Monitor::start(
        options.roster(),
        driver,
        Arc::new(NoWakeHold),
        options.scan_settings(),
        options.scan_config(),
    );
    for (device, label) in monitor.roster().layout() {
        tracing::debug!(%device, label, "tracking");
    }

    let mut updates = Box::pin(monitor.store().subscribe());
    let mut written = HashMap::new();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            snapshot = updates.next() => match snapshot {
                Some(snapshot) => {
                    if let Err(e) = write_fresh(&formatter, &snapshot, &mut written, out) {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
        }
    };

    let scan_error = monitor.scan_error();
    let stats = monitor.shutdown().await;
    result?;
    match scan_error {
        Some(e) => Err(e.into()),
        None => Ok(stats),
    }
}
