//! # In-Memory Integration Log
//!
//! In-memory implementation of [`IntegrationLogRepository`], keyed by
//! partner ID in a [`DashMap`].
//!
//! # Examples
//!
//! ```
//! use deal_router::infrastructure::persistence::in_memory::InMemoryIntegrationLog;
//!
//! let log = InMemoryIntegrationLog::new();
//! assert_eq!(log.total_attempt_count(), 0);
//! ```

use crate::domain::entities::IntegrationAttempt;
use crate::domain::services::partner_performance::{
    IntegrationLogRepository, PartnerPerformanceResult,
};
use crate::domain::value_objects::{HandlerId, Timestamp};
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory integration log.
#[derive(Debug, Default)]
pub struct InMemoryIntegrationLog {
    attempts: DashMap<HandlerId, Vec<IntegrationAttempt>>,
}

impl InMemoryIntegrationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored attempts across all partners.
    #[must_use]
    pub fn total_attempt_count(&self) -> usize {
        self.attempts.iter().map(|entry| entry.value().len()).sum()
    }

    /// Returns every attempt for a partner, in append order.
    #[must_use]
    pub fn attempts_for(&self, partner_id: &HandlerId) -> Vec<IntegrationAttempt> {
        self.attempts
            .get(partner_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl IntegrationLogRepository for InMemoryIntegrationLog {
    async fn append(&self, attempt: IntegrationAttempt) -> PartnerPerformanceResult<()> {
        self.attempts
            .entry(attempt.partner_id().clone())
            .or_default()
            .push(attempt);
        Ok(())
    }

    async fn get_attempts(
        &self,
        partner_id: &HandlerId,
        from: Timestamp,
        to: Timestamp,
    ) -> PartnerPerformanceResult<Vec<IntegrationAttempt>> {
        match self.attempts.get(partner_id) {
            Some(attempts) => Ok(attempts
                .iter()
                .filter(|a| a.is_within_window(from, to))
                .cloned()
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn trim_before(&self, before: Timestamp) -> PartnerPerformanceResult<u64> {
        let mut removed = 0u64;
        for mut entry in self.attempts.iter_mut() {
            let initial_len = entry.value().len() as u64;
            entry
                .value_mut()
                .retain(|a| !a.attempted_at().is_before(&before));
            let final_len = entry.value().len() as u64;
            removed = removed.saturating_add(initial_len.saturating_sub(final_len));
        }
        Ok(removed)
    }
}
