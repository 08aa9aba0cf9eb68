//! # Integration Attempts
//!
//! Append-only log of remote deal-creation calls and the rolling partner
//! statistics computed from it.
//!
//! Every call the fallback router makes is recorded as one
//! [`IntegrationAttempt`]. [`AggregatorStats::compute`] folds the attempts in
//! a window into the numbers the priority ranking uses.
//!
//! # Scoring
//!
//! ```text
//! score = (100 − success_rate_pct) × 10 + avg_latency_ms / 100 + sla_violations × 5
//! ```
//!
//! Lower is better.
//!
//! # Examples
//!
//! ```
//! use deal_router::domain::entities::integration_attempt::AggregatorStats;
//! use deal_router::domain::value_objects::{HandlerId, Timestamp};
//!
//! let now = Timestamp::now();
//! let stats = AggregatorStats::compute(&HandlerId::new("p-1"), &[], now.sub_hours(24), now);
//! assert_eq!(stats.attempt_count(), 0);
//! assert!(stats.score().is_none());
//! ```

use crate::domain::value_objects::{AttemptOutcome, HandlerId, OperationId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default statistics window in hours.
pub const DEFAULT_STATS_WINDOW_HOURS: u32 = 24;

/// One remote deal-creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationAttempt {
    partner_id: HandlerId,
    operation_id: OperationId,
    attempted_at: Timestamp,
    latency_ms: u64,
    status_code: Option<u16>,
    outcome: AttemptOutcome,
    sla_violated: bool,
}

impl IntegrationAttempt {
    /// Creates an attempt, flagging an SLA violation when `latency_ms`
    /// exceeds `sla_ms`.
    #[must_use]
    pub fn new(
        partner_id: HandlerId,
        operation_id: OperationId,
        attempted_at: Timestamp,
        latency_ms: u64,
        status_code: Option<u16>,
        outcome: AttemptOutcome,
        sla_ms: u64,
    ) -> Self {
        Self {
            partner_id,
            operation_id,
            attempted_at,
            latency_ms,
            status_code,
            outcome,
            sla_violated: latency_ms > sla_ms,
        }
    }

    /// Reconstructs an attempt from storage.
    #[must_use]
    pub fn from_parts(
        partner_id: HandlerId,
        operation_id: OperationId,
        attempted_at: Timestamp,
        latency_ms: u64,
        status_code: Option<u16>,
        outcome: AttemptOutcome,
        sla_violated: bool,
    ) -> Self {
        Self {
            partner_id,
            operation_id,
            attempted_at,
            latency_ms,
            status_code,
            outcome,
            sla_violated,
        }
    }

    /// Returns the partner ID.
    #[inline]
    #[must_use]
    pub fn partner_id(&self) -> &HandlerId {
        &self.partner_id
    }

    /// Returns the operation ID.
    #[inline]
    #[must_use]
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Returns when the call started.
    #[inline]
    #[must_use]
    pub fn attempted_at(&self) -> Timestamp {
        self.attempted_at
    }

    /// Returns the call latency.
    #[inline]
    #[must_use]
    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    /// Returns the HTTP status, when one was received.
    #[inline]
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Returns the outcome.
    #[inline]
    #[must_use]
    pub fn outcome(&self) -> AttemptOutcome {
        self.outcome
    }

    /// Returns true if the call exceeded the partner SLA.
    #[inline]
    #[must_use]
    pub fn sla_violated(&self) -> bool {
        self.sla_violated
    }

    /// Returns true if the attempt falls in `[window_start, window_end]`.
    #[inline]
    #[must_use]
    pub fn is_within_window(&self, window_start: Timestamp, window_end: Timestamp) -> bool {
        !self.attempted_at.is_before(&window_start) && !self.attempted_at.is_after(&window_end)
    }
}

impl fmt::Display for IntegrationAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attempt({} op={} {} {}ms)",
            self.partner_id, self.operation_id, self.outcome, self.latency_ms
        )
    }
}

/// Rolling statistics for one partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorStats {
    partner_id: HandlerId,
    attempt_count: u64,
    success_count: u64,
    avg_latency_ms: Option<f64>,
    sla_violation_count: u64,
    window_start: Timestamp,
    window_end: Timestamp,
}

impl AggregatorStats {
    /// Computes statistics from attempts; those outside the window are ignored.
    #[must_use]
    pub fn compute(
        partner_id: &HandlerId,
        attempts: &[IntegrationAttempt],
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> Self {
        let mut attempt_count: u64 = 0;
        let mut success_count: u64 = 0;
        let mut sla_violation_count: u64 = 0;
        let mut total_latency_ms: u64 = 0;

        for attempt in attempts {
            if &attempt.partner_id != partner_id
                || !attempt.is_within_window(window_start, window_end)
            {
                continue;
            }
            attempt_count = attempt_count.saturating_add(1);
            total_latency_ms = total_latency_ms.saturating_add(attempt.latency_ms);
            if attempt.outcome.is_success() {
                success_count = success_count.saturating_add(1);
            }
            if attempt.sla_violated {
                sla_violation_count = sla_violation_count.saturating_add(1);
            }
        }

        let avg_latency_ms = if attempt_count > 0 {
            Some(total_latency_ms as f64 / attempt_count as f64)
        } else {
            None
        };

        Self {
            partner_id: partner_id.clone(),
            attempt_count,
            success_count,
            avg_latency_ms,
            sla_violation_count,
            window_start,
            window_end,
        }
    }

    /// Returns the partner ID.
    #[inline]
    #[must_use]
    pub fn partner_id(&self) -> &HandlerId {
        &self.partner_id
    }

    /// Returns the number of attempts in the window.
    #[inline]
    #[must_use]
    pub fn attempt_count(&self) -> u64 {
        self.attempt_count
    }

    /// Returns the number of accepted attempts.
    #[inline]
    #[must_use]
    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    /// Returns the number of SLA violations.
    #[inline]
    #[must_use]
    pub fn sla_violation_count(&self) -> u64 {
        self.sla_violation_count
    }

    /// Returns the mean latency, if any attempts exist.
    #[inline]
    #[must_use]
    pub fn avg_latency_ms(&self) -> Option<f64> {
        self.avg_latency_ms
    }

    /// Returns the success rate in percent (0-100).
    #[must_use]
    pub fn success_rate_pct(&self) -> Option<f64> {
        if self.attempt_count == 0 {
            return None;
        }
        Some(self.success_count as f64 / self.attempt_count as f64 * 100.0)
    }

    /// Returns the ranking score, or `None` without attempts.
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        let success_rate = self.success_rate_pct()?;
        let avg_latency = self.avg_latency_ms.unwrap_or(0.0);
        Some(
            (100.0 - success_rate) * 10.0
                + avg_latency / 100.0
                + self.sla_violation_count as f64 * 5.0,
        )
    }

    /// Returns the window start.
    #[inline]
    #[must_use]
    pub fn window_start(&self) -> Timestamp {
        self.window_start
    }

    /// Returns the window end.
    #[inline]
    #[must_use]
    pub fn window_end(&self) -> Timestamp {
        self.window_end
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn attempt(partner: &str, at: Timestamp, latency: u64, outcome: AttemptOutcome) -> IntegrationAttempt {
        IntegrationAttempt::new(
            HandlerId::new(partner),
            OperationId::new_v4(),
            at,
            latency,
            Some(200),
            outcome,
            1_000,
        )
    }

    #[test]
    fn sla_flag_is_strictly_greater() {
        let now = Timestamp::now();
        assert!(!attempt("p", now, 1_000, AttemptOutcome::Accepted).sla_violated());
        assert!(attempt("p", now, 1_001, AttemptOutcome::Accepted).sla_violated());
    }

    #[test]
    fn score_formula() {
        let now = Timestamp::now();
        let attempts = vec![
            attempt("p", now, 400, AttemptOutcome::Accepted),
            attempt("p", now, 1_600, AttemptOutcome::Timeout),
        ];
        let stats = AggregatorStats::compute(&HandlerId::new("p"), &attempts, now.sub_secs(60), now);
        assert_eq!(stats.attempt_count(), 2);
        assert_eq!(stats.success_count(), 1);
        assert_eq!(stats.sla_violation_count(), 1);
        // (100 - 50) × 10 + 1000 / 100 + 1 × 5
        let score = stats.score().unwrap();
        assert!((score - 515.0).abs() < 1e-9);
    }

    #[test]
    fn ignores_other_partners_and_old_attempts() {
        let now = Timestamp::now();
        let attempts = vec![
            attempt("p", now.sub_secs(7_200), 10, AttemptOutcome::Accepted),
            attempt("q", now, 10, AttemptOutcome::Accepted),
            attempt("p", now, 10, AttemptOutcome::Rejected),
        ];
        let stats =
            AggregatorStats::compute(&HandlerId::new("p"), &attempts, now.sub_secs(3_600), now);
        assert_eq!(stats.attempt_count(), 1);
        assert_eq!(stats.success_rate_pct(), Some(0.0));
    }
}
