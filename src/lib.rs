//! `beacon-telemetry` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup
//! and process exit codes. The scan coordinator, event bus, decoder, state
//! store and ingestion pipeline live here, where they can be tested
//! deterministically with an injected radio driver.

pub mod app;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod device_id;
pub mod driver;
pub mod output;
pub mod pipeline;
pub mod roster;
pub mod store;
pub mod throttle;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{Monitor, Options, RunError, run_with_io};
pub use bus::{BusReceiver, EventBus, Publisher, RawDiscoveryEvent};
pub use config::{ScanConfig, parse_capacity, parse_duration};
pub use coordinator::{CoordinatorHandle, ScanCoordinator, ScanState, StartOutcome};
pub use decoder::{DecodeError, Reading, decode};
pub use device_id::DeviceId;
pub use driver::{Backend, DriverFuture, RadioDriver, ScanError, ScanSettings, WakeHold};
pub use output::SnapshotFormatter;
pub use output::influxdb::InfluxDbFormatter;
pub use pipeline::{IngestOutcome, IngestStats, Ingestor, PipelineHandle};
pub use roster::{Roster, RosterEntry, parse_roster_entry};
pub use store::{DeviceState, DeviceStateStore, Snapshot};
pub use throttle::StartThrottle;
