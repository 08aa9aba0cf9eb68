//! # Partner Performance Service
//!
//! Records every remote deal-creation call and computes rolling
//! [`AggregatorStats`] per partner over a configurable window (default 24h).
//!
//! # Examples
//!
//! ```ignore
//! use deal_router::domain::services::partner_performance::PartnerPerformanceTracker;
//! use std::sync::Arc;
//!
//! let log: Arc<dyn IntegrationLogRepository> = /* ... */;
//! let tracker = PartnerPerformanceTracker::new(log, 24);
//!
//! tracker.record_attempt(attempt).await?;
//! let stats = tracker.get_stats(&partner_id).await?;
//! ```

use crate::domain::entities::integration_attempt::{
    AggregatorStats, DEFAULT_STATS_WINDOW_HOURS, IntegrationAttempt,
};
use crate::domain::value_objects::{HandlerId, Timestamp};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error type for partner performance operations.
#[derive(Debug, Error)]
pub enum PartnerPerformanceError {
    /// Repository error.
    #[error("repository error: {0}")]
    Repository(String),
}

impl PartnerPerformanceError {
    /// Creates a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }
}

/// Result type for partner performance operations.
pub type PartnerPerformanceResult<T> = Result<T, PartnerPerformanceError>;

/// Append-only store of integration attempts.
#[async_trait]
pub trait IntegrationLogRepository: Send + Sync + fmt::Debug {
    /// Appends an attempt.
    ///
    /// # Errors
    ///
    /// Returns `PartnerPerformanceError::Repository` if it cannot be stored.
    async fn append(&self, attempt: IntegrationAttempt) -> PartnerPerformanceResult<()>;

    /// Returns a partner's attempts in `[from, to]`.
    async fn get_attempts(
        &self,
        partner_id: &HandlerId,
        from: Timestamp,
        to: Timestamp,
    ) -> PartnerPerformanceResult<Vec<IntegrationAttempt>>;

    /// Removes attempts strictly before `before`, returning how many went.
    async fn trim_before(&self, before: Timestamp) -> PartnerPerformanceResult<u64>;
}

/// Tracks partner call quality over a rolling window.
#[derive(Debug, Clone)]
pub struct PartnerPerformanceTracker {
    log: Arc<dyn IntegrationLogRepository>,
    window_hours: u32,
}

impl PartnerPerformanceTracker {
    /// Creates a tracker.
    #[must_use]
    pub fn new(log: Arc<dyn IntegrationLogRepository>, window_hours: u32) -> Self {
        Self { log, window_hours }
    }

    /// Creates a tracker with the default 24-hour window.
    #[must_use]
    pub fn with_defaults(log: Arc<dyn IntegrationLogRepository>) -> Self {
        Self::new(log, DEFAULT_STATS_WINDOW_HOURS)
    }

    /// Returns the window size in hours.
    #[inline]
    #[must_use]
    pub fn window_hours(&self) -> u32 {
        self.window_hours
    }

    /// Records one call.
    ///
    /// # Errors
    ///
    /// Returns `PartnerPerformanceError::Repository` if the append fails.
    pub async fn record_attempt(&self, attempt: IntegrationAttempt) -> PartnerPerformanceResult<()> {
        self.log.append(attempt).await
    }

    /// Computes a partner's stats ending now.
    ///
    /// # Errors
    ///
    /// Returns `PartnerPerformanceError::Repository` if attempts cannot be read.
    pub async fn get_stats(&self, partner_id: &HandlerId) -> PartnerPerformanceResult<AggregatorStats> {
        self.get_stats_at(partner_id, Timestamp::now()).await
    }

    /// Computes a partner's stats for the window ending at `now`.
    ///
    /// # Errors
    ///
    /// Returns `PartnerPerformanceError::Repository` if attempts cannot be read.
    pub async fn get_stats_at(
        &self,
        partner_id: &HandlerId,
        now: Timestamp,
    ) -> PartnerPerformanceResult<AggregatorStats> {
        let window_start = now.sub_hours(self.window_hours);
        let attempts = self.log.get_attempts(partner_id, window_start, now).await?;
        Ok(AggregatorStats::compute(partner_id, &attempts, window_start, now))
    }

    /// Computes stats for several partners concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first repository error encountered.
    pub async fn get_all_stats(
        &self,
        partner_ids: &[HandlerId],
        now: Timestamp,
    ) -> PartnerPerformanceResult<Vec<AggregatorStats>> {
        try_join_all(partner_ids.iter().map(|id| self.get_stats_at(id, now))).await
    }

    /// Drops attempts older than the window.
    ///
    /// # Errors
    ///
    /// Returns `PartnerPerformanceError::Repository` if trimming fails.
    pub async fn trim_old_attempts(&self) -> PartnerPerformanceResult<u64> {
        let cutoff = Timestamp::now().sub_hours(self.window_hours);
        self.log.trim_before(cutoff).await
    }
}
