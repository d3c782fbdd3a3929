//! Scan lifecycle: keep discovery running while staying under the
//! platform's start-rate limits.
//!
//! The coordinator owns the [`StartThrottle`] and the restart timer. One
//! task drives the cycle
//!
//! ```text
//! Idle -> Starting -> Active -(restart interval)-> Restarting -(settle)-> Starting -> ...
//! ```
//!
//! and stops in `Stopped` on shutdown. A throttled or refused start drops
//! back to `Idle` and is retried later; neither ends the task. A refusal is
//! also published as the coordinator's last error until a start succeeds.
//!
//! Shutdown wins over any driver call in flight, and the final stop request
//! is bounded by `stop_timeout`, so a radio that never answers cannot keep
//! the wake hold or the task alive.

use crate::bus::{EventBus, Publisher};
use crate::config::ScanConfig;
use crate::driver::{NoWakeHold, RadioDriver, ScanError, ScanSettings, WakeHold};
use crate::throttle::StartThrottle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};

/// Where the coordinator is in the duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Starting,
    Active,
    Restarting,
    Stopped,
}

/// Result of a start attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The radio acknowledged the start.
    Started,
    /// The start window is full; try again after `retry_after`.
    Throttled { retry_after: Duration },
}

pub struct ScanCoordinator {
    driver: Arc<dyn RadioDriver>,
    wake: Arc<dyn WakeHold>,
    publisher: Publisher,
    settings: ScanSettings,
    config: ScanConfig,
    throttle: StartThrottle,
    state: watch::Sender<ScanState>,
    fault: watch::Sender<Option<ScanError>>,
}

impl ScanCoordinator {
    pub fn new(driver: Arc<dyn RadioDriver>, bus: &EventBus, config: ScanConfig) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        let (fault, _) = watch::channel(None);
        Self {
            driver,
            wake: Arc::new(NoWakeHold),
            publisher: bus.publisher(),
            settings: ScanSettings::default(),
            throttle: StartThrottle::new(config.max_starts, config.window),
            config,
            state,
            fault,
        }
    }

    pub fn with_wake_hold(mut self, wake: Arc<dyn WakeHold>) -> Self {
        self.wake = wake;
        self
    }

    pub fn with_settings(mut self, settings: ScanSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    /// The most recent driver refusal, cleared by the next successful start.
    pub fn last_error(&self) -> Option<ScanError> {
        self.fault.borrow().clone()
    }

    pub fn watch_errors(&self) -> watch::Receiver<Option<ScanError>> {
        self.fault.subscribe()
    }

    /// Attempt one scan start.
    ///
    /// The attempt is recorded against the start window before the driver is
    /// called, so refused starts count too.
    ///
    /// # Errors
    /// Returns [`ScanError::DriverUnavailable`] if the radio refuses. The
    /// coordinator is left `Idle` and can be asked again.
    pub async fn start(&mut self) -> Result<StartOutcome, ScanError> {
        let now = Instant::now();
        if !self.throttle.try_acquire_at(now) {
            let retry_after = self
                .throttle
                .retry_after_at(now)
                .unwrap_or(self.config.driver_retry);
            tracing::warn!(?retry_after, "scan start throttled");
            self.set_state(ScanState::Idle);
            return Ok(StartOutcome::Throttled { retry_after });
        }

        self.set_state(ScanState::Starting);
        match self
            .driver
            .start_scan(self.settings.clone(), self.publisher.clone())
            .await
        {
            Ok(()) => {
                tracing::info!("scan started");
                self.set_state(ScanState::Active);
                self.set_fault(None);
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.set_state(ScanState::Idle);
                self.set_fault(Some(e.clone()));
                Err(e)
            }
        }
    }

    /// Stop the active scan ahead of a restart. Failure is logged, not
    /// returned: the next start replaces the scan anyway.
    async fn begin_restart(&mut self) {
        self.set_state(ScanState::Restarting);
        if let Err(e) = self.driver.stop_scan().await {
            tracing::warn!(error = %e, "failed to stop scan before restart");
        }
        self.renew_wake_hold();
        tracing::info!(settle = ?self.config.settle_delay, "scan restarting");
    }

    fn renew_wake_hold(&self) {
        if let Err(e) = self.wake.acquire(self.config.wake_timeout) {
            tracing::warn!(error = %e, "failed to acquire wake hold");
        }
    }

    /// Stop scanning and release resources. Every step runs even if an
    /// earlier one fails or the driver does not answer within
    /// `stop_timeout`.
    pub async fn stop(&mut self) {
        match timeout(self.config.stop_timeout, self.driver.stop_scan()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to stop scan during shutdown"),
            Err(_) => tracing::warn!(
                timeout = ?self.config.stop_timeout,
                "radio did not acknowledge stop, giving up"
            ),
        }
        if let Err(e) = self.wake.release() {
            tracing::warn!(error = %e, "failed to release wake hold");
        }
        self.set_state(ScanState::Stopped);
        tracing::info!("scan stopped");
    }

    /// Drive the duty cycle until `shutdown` resolves (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        self.renew_wake_hold();

        loop {
            let attempt = tokio::select! {
                _ = &mut shutdown => break,
                attempt = self.start() => attempt,
            };

            let pause = match attempt {
                Ok(StartOutcome::Started) => {
                    // The restart timer lives only in this select, so there
                    // is never more than one armed.
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep(self.config.restart_interval) => {}
                    }
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.begin_restart() => {}
                    }
                    self.config.settle_delay
                }
                Ok(StartOutcome::Throttled { retry_after }) => retry_after,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry = ?self.config.driver_retry,
                        "scan start failed"
                    );
                    self.config.driver_retry
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(pause) => {}
            }
        }

        self.stop().await;
    }

    /// Run the duty cycle on a new task.
    pub fn spawn(self) -> CoordinatorHandle {
        let (shutdown, signal) = oneshot::channel();
        let state = self.watch_state();
        let fault = self.watch_errors();
        let task = tokio::spawn(self.run(signal));
        CoordinatorHandle {
            shutdown,
            state,
            fault,
            task,
        }
    }

    fn set_state(&self, next: ScanState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "scan state changed");
        }
    }

    fn set_fault(&self, next: Option<ScanError>) {
        self.fault.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Owner of a spawned coordinator task.
#[derive(Debug)]
pub struct CoordinatorHandle {
    shutdown: oneshot::Sender<()>,
    state: watch::Receiver<ScanState>,
    fault: watch::Receiver<Option<ScanError>>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ScanState> {
        self.state.clone()
    }

    /// The most recent driver refusal, cleared by the next successful start.
    pub fn last_error(&self) -> Option<ScanError> {
        self.fault.borrow().clone()
    }

    pub fn watch_errors(&self) -> watch::Receiver<Option<ScanError>> {
        self.fault.clone()
    }

    /// Signal shutdown and wait for the scan to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "scan coordinator task failed");
        }
    }
}
