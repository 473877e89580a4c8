//! The worker pool that drains pending event records.
//!
//! A [`Dispatcher`] is either stopped or running. While running it owns a
//! fixed number of worker tasks, each on its own interval timer. On every
//! tick a worker claims a batch of pending records and hands them one by one
//! to the [`EventProcessor`]. Worker 0 additionally runs the reclaim sweep
//! that returns abandoned `processing` records to `pending`.
//!
//! Stopping is cooperative: workers see the stop signal only between ticks,
//! so a batch that has been claimed is always finished.

use std::sync::Arc;
use std::time::Duration;

use rockets_db::{EventRecordStore, RocketStore};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::processor::{EventProcessor, ProcessOutcome};

/// Worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Time between a worker's polls.
    pub poll_interval: Duration,
    /// Maximum records claimed per poll.
    pub batch_size: u32,
    /// Number of workers.
    pub worker_count: u32,
    /// Age after which a `processing` record is reclaimed.
    pub reclaim_after: Duration,
}

impl DispatcherConfig {
    /// Reject settings the workers cannot run with. `reclaim_after` may be
    /// zero.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::InvalidConfig`] naming the first zero field.
    pub const fn validate(&self) -> Result<(), DispatcherError> {
        if self.poll_interval.is_zero() {
            return Err(DispatcherError::InvalidConfig("poll_interval"));
        }
        if self.batch_size == 0 {
            return Err(DispatcherError::InvalidConfig("batch_size"));
        }
        if self.worker_count == 0 {
            return Err(DispatcherError::InvalidConfig("worker_count"));
        }
        Ok(())
    }
}

impl From<&PollingConfig> for DispatcherConfig {
    fn from(polling: &PollingConfig) -> Self {
        Self {
            poll_interval: polling.interval(),
            batch_size: polling.batch_size,
            worker_count: polling.worker_count,
            reclaim_after: polling.reclaim_after(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

/// Errors raised when building a [`Dispatcher`].
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// A setting that must be positive was zero.
    #[error("dispatcher {0} must be positive")]
    InvalidConfig(&'static str),
}

/// Observable dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// No workers are running.
    Stopped,
    /// Workers are polling.
    Running,
}

enum Lifecycle {
    Stopped,
    Running {
        shutdown: watch::Sender<bool>,
        workers: Vec<JoinHandle<()>>,
    },
}

/// Per-tick tallies, logged when a batch was non-empty.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Records claimed.
    pub claimed: usize,
    /// Records that advanced rocket state.
    pub applied: usize,
    /// Records that lost the conditional write.
    pub superseded: usize,
    /// Records already covered by the rocket's sequence.
    pub skipped: usize,
    /// Records terminally failed.
    pub failed: usize,
    /// Records another worker had already finished.
    pub already_finished: usize,
    /// Records left in `processing` after a store error.
    pub errored: usize,
}

/// Fixed-size pool of polling workers.
pub struct Dispatcher {
    processor: EventProcessor,
    events: Arc<dyn EventRecordStore>,
    config: DispatcherConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl Dispatcher {
    /// Create a stopped dispatcher over the given stores.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::InvalidConfig`] if `config` has a zero
    /// poll interval, batch size, or worker count.
    pub fn new(
        events: Arc<dyn EventRecordStore>,
        rockets: Arc<dyn RocketStore>,
        config: DispatcherConfig,
    ) -> Result<Self, DispatcherError> {
        config.validate()?;
        Ok(Self {
            processor: EventProcessor::new(Arc::clone(&events), rockets),
            events,
            config,
            lifecycle: Mutex::new(Lifecycle::Stopped),
        })
    }

    /// Spawn the workers. Returns `false` if already running.
    pub async fn start(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Running { .. }) {
            debug!("Dispatcher already running");
            return false;
        }

        let (shutdown, signal) = watch::channel(false);
        let workers = (0..self.config.worker_count)
            .map(|index| {
                let worker = Worker {
                    index,
                    processor: self.processor.clone(),
                    events: Arc::clone(&self.events),
                    config: self.config,
                };
                tokio::spawn(worker.run(signal.clone()))
            })
            .collect();

        *lifecycle = Lifecycle::Running { shutdown, workers };
        info!(
            workers = self.config.worker_count,
            batch_size = self.config.batch_size,
            poll_interval = ?self.config.poll_interval,
            "Dispatcher started"
        );
        true
    }

    /// Signal every worker to exit after its current tick and wait for all
    /// of them. Returns `false` if already stopped.
    pub async fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        let Lifecycle::Running { shutdown, workers } =
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        else {
            debug!("Dispatcher already stopped");
            return false;
        };

        // Receivers live in the workers; a send error only means every
        // worker has already exited.
        let _ = shutdown.send(true);
        for handle in workers {
            if let Err(err) = handle.await {
                warn!(%err, "Dispatcher worker ended abnormally");
            }
        }
        info!("Dispatcher stopped");
        true
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> DispatcherState {
        match *self.lifecycle.lock().await {
            Lifecycle::Stopped => DispatcherState::Stopped,
            Lifecycle::Running { .. } => DispatcherState::Running,
        }
    }

    /// Whether workers are running.
    pub async fn is_running(&self) -> bool {
        self.state().await == DispatcherState::Running
    }
}

struct Worker {
    index: u32,
    processor: EventProcessor,
    events: Arc<dyn EventRecordStore>,
    config: DispatcherConfig,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(worker = self.index, "Worker started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.claimed > 0 {
                        debug!(worker = self.index, ?report, "Batch processed");
                    }
                }
            }
        }

        debug!(worker = self.index, "Worker exited");
    }

    async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        if self.index == 0 {
            if let Err(err) = self.events.reclaim_stale(self.config.reclaim_after).await {
                warn!(worker = self.index, %err, "Reclaim sweep failed");
            }
        }

        let batch = match self.events.claim_pending_batch(self.config.batch_size).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(worker = self.index, %err, "Failed to claim pending events");
                return report;
            }
        };
        report.claimed = batch.len();

        for record in &batch {
            match self.processor.process(record).await {
                Ok(ProcessOutcome::Applied) => report.applied = report.applied.saturating_add(1),
                Ok(ProcessOutcome::Superseded) => {
                    report.superseded = report.superseded.saturating_add(1);
                }
                Ok(ProcessOutcome::Skipped) => report.skipped = report.skipped.saturating_add(1),
                Ok(ProcessOutcome::Failed(_)) => report.failed = report.failed.saturating_add(1),
                Ok(ProcessOutcome::AlreadyFinished) => {
                    report.already_finished = report.already_finished.saturating_add(1);
                }
                Err(err) => {
                    report.errored = report.errored.saturating_add(1);
                    warn!(
                        worker = self.index,
                        event_id = %record.id,
                        rocket_id = %record.rocket_id,
                        %err,
                        "Event left in processing after store error"
                    );
                }
            }
        }

        report
    }
}
