//! # Periodic Scheduler
//!
//! Drives [`PeriodicTask`]s on a fixed cadence.
//!
//! Each runner serializes its task against itself: a run that is still in
//! progress when the next one is due causes that one to be skipped, never
//! queued. Errors are logged and the next cadence retries.
//!
//! # Examples
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let runner = PeriodicRunner::new(engine, Duration::from_secs(1));
//! let handle = runner.spawn(shutdown_rx);
//! // ...
//! shutdown_tx.send(true)?;
//! handle.await?;
//! ```

use crate::application::error::{ApplicationError, ApplicationResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// A job run on a fixed cadence.
#[async_trait]
pub trait PeriodicTask: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one iteration.
    ///
    /// # Errors
    ///
    /// Any error is logged by the runner; the next cadence retries.
    async fn run_once(&self) -> ApplicationResult<()>;
}

/// Outcome of a guarded run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The task ran to completion.
    Completed,
    /// The task ran and failed.
    Failed(ApplicationError),
    /// A previous run was still in progress.
    Skipped,
}

/// Resets the running flag when a run ends, even on panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs a [`PeriodicTask`] until shut down.
#[derive(Debug, Clone)]
pub struct PeriodicRunner {
    task: Arc<dyn PeriodicTask>,
    period: Duration,
    running: Arc<AtomicBool>,
}

impl PeriodicRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(task: Arc<dyn PeriodicTask>, period: Duration) -> Self {
        Self {
            task,
            period,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the cadence.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs the task once unless a run is already in progress.
    pub async fn trigger(&self) -> RunOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(task = self.task.name(), "Previous run still in progress, skipping");
            return RunOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);
        match self.task.run_once().await {
            Ok(()) => RunOutcome::Completed,
            Err(e) => {
                if e.is_unavailable() {
                    tracing::error!(task = self.task.name(), error = %e, "Store unavailable, run aborted");
                } else {
                    tracing::warn!(task = self.task.name(), error = %e, "Run failed");
                }
                RunOutcome::Failed(e)
            }
        }
    }

    /// Runs on the cadence until `shutdown` turns true or its sender drops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            task = self.task.name(),
            period_ms = u64::try_from(self.period.as_millis()).unwrap_or(u64::MAX),
            "Periodic task started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.trigger().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(task = self.task.name(), "Periodic task stopped");
    }

    /// Spawns [`run`](Self::run) on the tokio runtime.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
