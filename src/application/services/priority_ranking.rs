//! # Priority Ranking Updater
//!
//! Periodically recomputes the order in which partners are tried.
//!
//! Each partner gets a score over the trailing window:
//!
//! ```text
//! (100 - success_rate_pct) * 10 + avg_latency_ms / 100 + sla_violations * 5
//! ```
//!
//! Partners are re-sorted ascending by score with a stable sort, so ties keep
//! their previous relative order. Partners without attempts in the window
//! keep their previous relative order after every scored partner. New
//! priorities are the positions `0..n`; only changed ones are written.

use crate::application::error::ApplicationResult;
use crate::application::services::scheduler::PeriodicTask;
use crate::domain::entities::AggregatorPartner;
use crate::domain::services::PartnerPerformanceTracker;
use crate::domain::value_objects::{HandlerId, Timestamp};
use crate::infrastructure::persistence::HandlerRepository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A partner with its recomputed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPartner {
    /// Partner ID.
    pub partner_id: HandlerId,
    /// Score over the window, `None` without attempts.
    pub score: Option<f64>,
    /// Priority before this run.
    pub previous_priority: u32,
    /// Priority after this run.
    pub priority: u32,
}

impl RankedPartner {
    /// Returns true if the priority moved.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous_priority != self.priority
    }
}

impl fmt::Display for RankedPartner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.score {
            Some(score) => write!(
                f,
                "RankedPartner(#{} {} score={score:.2})",
                self.priority, self.partner_id
            ),
            None => write!(f, "RankedPartner(#{} {} no data)", self.priority, self.partner_id),
        }
    }
}

/// Orders partners by score, stable for ties, unscored last.
///
/// `partners` must already be in their current priority order.
#[must_use]
pub fn rank_partners(partners: &[AggregatorPartner], scores: &[Option<f64>]) -> Vec<RankedPartner> {
    let mut scored: Vec<(&AggregatorPartner, f64)> = Vec::new();
    let mut unscored: Vec<&AggregatorPartner> = Vec::new();
    for (partner, score) in partners.iter().zip(scores.iter()) {
        match score {
            Some(s) if s.is_finite() => scored.push((partner, *s)),
            _ => unscored.push(partner),
        }
    }
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));

    scored
        .into_iter()
        .map(|(p, s)| (p, Some(s)))
        .chain(unscored.into_iter().map(|p| (p, None)))
        .enumerate()
        .map(|(position, (partner, score))| RankedPartner {
            partner_id: partner.id().clone(),
            score,
            previous_priority: partner.priority(),
            priority: u32::try_from(position).unwrap_or(u32::MAX),
        })
        .collect()
}

/// Recomputes partner priorities from the integration log.
#[derive(Debug, Clone)]
pub struct PriorityRankingUpdater {
    handlers: Arc<dyn HandlerRepository>,
    tracker: PartnerPerformanceTracker,
}

impl PriorityRankingUpdater {
    /// Creates an updater.
    #[must_use]
    pub fn new(handlers: Arc<dyn HandlerRepository>, tracker: PartnerPerformanceTracker) -> Self {
        Self { handlers, tracker }
    }

    /// Recomputes and stores priorities for the window ending at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if partners or attempts cannot be loaded, or a
    /// priority cannot be written.
    pub async fn update_at(&self, now: Timestamp) -> ApplicationResult<Vec<RankedPartner>> {
        let mut partners = self.handlers.find_partners().await?;
        partners.sort_by_key(AggregatorPartner::priority);
        let ids: Vec<HandlerId> = partners.iter().map(|p| p.id().clone()).collect();
        let stats = self.tracker.get_all_stats(&ids, now).await?;
        let scores: Vec<Option<f64>> = stats.iter().map(|s| s.score()).collect();

        let ranked = rank_partners(&partners, &scores);
        let mut changed = 0usize;
        for entry in ranked.iter().filter(|r| r.changed()) {
            self.handlers
                .update_priority(&entry.partner_id, entry.priority)
                .await?;
            changed = changed.saturating_add(1);
            tracing::debug!(
                partner_id = %entry.partner_id,
                from = entry.previous_priority,
                to = entry.priority,
                "Partner priority changed"
            );
        }
        tracing::info!(partners = ranked.len(), changed, "Partner priorities recomputed");
        Ok(ranked)
    }
}

#[async_trait]
impl PeriodicTask for PriorityRankingUpdater {
    fn name(&self) -> &'static str {
        "priority_ranking"
    }

    async fn run_once(&self) -> ApplicationResult<()> {
        self.update_at(Timestamp::now()).await?;
        let trimmed = self.tracker.trim_old_attempts().await?;
        if trimmed > 0 {
            tracing::debug!(trimmed, "Old partner attempts trimmed");
        }
        Ok(())
    }
}
