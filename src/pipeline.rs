//! Ingestion: bus events in, device state out.
//!
//! The [`Ingestor`] is the single place where advertisements are filtered
//! against the roster. Known devices are decoded and written to the store
//! together with the time since their previous advertisement.

use crate::bus::{BusReceiver, RawDiscoveryEvent};
use crate::decoder::{DecodeError, decode};
use crate::roster::Roster;
use crate::store::DeviceStateStore;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Updated,
    /// Not in the roster; discarded before decoding.
    UnknownDevice,
    /// Too short to decode; discarded without touching the store.
    Malformed(DecodeError),
}

/// Counters reported when the drain task ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub updated: u64,
    pub unknown: u64,
    pub malformed: u64,
    /// Events lost to bus overflow before this consumer saw them
    pub dropped: u64,
}

impl IngestStats {
    fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Updated => self.updated += 1,
            IngestOutcome::UnknownDevice => self.unknown += 1,
            IngestOutcome::Malformed(_) => self.malformed += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    roster: Arc<Roster>,
    store: DeviceStateStore,
}

impl Ingestor {
    pub fn new(roster: Arc<Roster>, store: DeviceStateStore) -> Self {
        Self { roster, store }
    }

    /// Apply one event to the store.
    pub fn ingest(&self, event: &RawDiscoveryEvent) -> IngestOutcome {
        if !self.roster.contains(&event.device) {
            tracing::trace!(device = %event.device, "ignoring device outside roster");
            return IngestOutcome::UnknownDevice;
        }

        let reading = match decode(&event.payload) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::debug!(device = %event.device, error = %e, "dropping advertisement");
                return IngestOutcome::Malformed(e);
            }
        };

        let Some(current) = self.store.get(&event.device) else {
            return IngestOutcome::UnknownDevice;
        };
        let delta = inter_arrival_ms(current.last_seen_at, event.observed_at);
        let next = current.with_reading(&reading, delta, event.observed_at);

        if self.store.update(&event.device, next) {
            IngestOutcome::Updated
        } else {
            IngestOutcome::UnknownDevice
        }
    }

    /// Drain `receiver` until `shutdown` fires or the bus closes.
    pub async fn run(
        self,
        mut receiver: BusReceiver,
        mut shutdown: oneshot::Receiver<()>,
    ) -> IngestStats {
        let mut stats = IngestStats::default();

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => break,
                event = receiver.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            stats.record(&self.ingest(&event));
        }

        stats.dropped = receiver.dropped();
        tracing::debug!(?stats, "ingestion stopped");
        stats
    }

    /// Run the drain loop on a new task.
    pub fn spawn(self, receiver: BusReceiver) -> PipelineHandle {
        let (shutdown, signal) = oneshot::channel();
        let task = tokio::spawn(self.run(receiver, signal));
        PipelineHandle { shutdown, task }
    }
}

/// Milliseconds since the previous advertisement.
///
/// The first advertisement of a device, and a clock that stepped backwards,
/// both yield 0.
pub fn inter_arrival_ms(last_seen_at: Option<SystemTime>, observed_at: SystemTime) -> i64 {
    last_seen_at
        .and_then(|last| observed_at.duration_since(last).ok())
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}

/// Owner of a spawned ingestion task.
#[derive(Debug)]
pub struct PipelineHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<IngestStats>,
}

impl PipelineHandle {
    /// Stop draining and return the final counters.
    pub async fn shutdown(self) -> IngestStats {
        let _ = self.shutdown.send(());
        self.task.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "ingestion task failed");
            IngestStats::default()
        })
    }
}
