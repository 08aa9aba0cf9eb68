//! # Fallback Aggregator Router
//!
//! Walks aggregator partners in ascending priority when no internal handler
//! can take an operation.
//!
//! # Algorithm
//!
//! 1. Load partners, stable-sorted by priority (lower first).
//! 2. Keep those that are active, above their minimum balance, under their
//!    daily-volume cap and concurrency limit, and not in the operation's
//!    history.
//! 3. For each partner in order:
//!    - tentatively assign (freeze, short transaction)
//!    - call the partner with its own timeout, holding no lock
//!    - log the attempt with latency and SLA flag
//!    - on acceptance stop; otherwise revert the tentative assignment and
//!      continue
//!
//! The walk is sequential: at most one partner holds the operation at any
//! time.

use crate::application::error::{RoutingError, RoutingResult};
use crate::application::services::operation_assigner::OperationAssigner;
use crate::domain::entities::{AggregatorPartner, IntegrationAttempt, Operation};
use crate::domain::services::PartnerPerformanceTracker;
use crate::domain::value_objects::{AttemptOutcome, HandlerId, Timestamp};
use crate::infrastructure::partners::{
    PartnerClient, PartnerEndpoint, PartnerError, PartnerResult, RemoteDeal, RemoteDealRequest,
};
use crate::infrastructure::persistence::HandlerRepository;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default per-partner timeout when a partner has none configured.
pub const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 5_000;

/// A deal placed with a partner.
#[derive(Debug, Clone)]
pub struct RoutedDeal {
    /// Partner that accepted.
    pub partner_id: HandlerId,
    /// Partner-side deal ID.
    pub external_ref: Option<String>,
    /// Requisites returned by the partner.
    pub payment_details: Option<serde_json::Value>,
    /// Operation as stored after routing.
    pub operation: Operation,
    /// Remote calls made, including the successful one.
    pub attempts: usize,
}

/// Sequential, priority-ordered partner fallback.
#[derive(Debug, Clone)]
pub struct FallbackRouter {
    handlers: Arc<dyn HandlerRepository>,
    assigner: OperationAssigner,
    client: Arc<dyn PartnerClient>,
    tracker: PartnerPerformanceTracker,
    default_timeout: Duration,
}

impl FallbackRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(
        handlers: Arc<dyn HandlerRepository>,
        assigner: OperationAssigner,
        client: Arc<dyn PartnerClient>,
        tracker: PartnerPerformanceTracker,
    ) -> Self {
        Self {
            handlers,
            assigner,
            client,
            tracker,
            default_timeout: Duration::from_millis(DEFAULT_FALLBACK_TIMEOUT_MS),
        }
    }

    /// Sets the timeout used for partners without one.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the partners to try for `operation`, in order.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Repository` if partners cannot be loaded.
    pub async fn candidates(&self, operation: &Operation) -> RoutingResult<Vec<AggregatorPartner>> {
        let mut partners = self.handlers.find_partners().await?;
        partners.sort_by_key(AggregatorPartner::priority);

        let mut candidates = Vec::with_capacity(partners.len());
        for partner in partners {
            if !partner.is_available_for(operation.amount()) || operation.was_handled_by(partner.id())
            {
                continue;
            }
            let active = self.assigner.active_count(partner.id()).await?;
            if active >= partner.max_concurrent() {
                tracing::debug!(
                    partner_id = %partner.id(),
                    active,
                    max_concurrent = partner.max_concurrent(),
                    "Partner at concurrency limit"
                );
                continue;
            }
            candidates.push(partner);
        }
        Ok(candidates)
    }

    /// Routes `operation` to the first partner that accepts it.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::AllPartnersExhausted` if every partner failed,
    /// `RoutingError::AlreadyAssigned` if the operation was taken
    /// concurrently, or a store error if the store is unreachable.
    pub async fn route(&self, operation: &Operation) -> RoutingResult<RoutedDeal> {
        let partners = self.candidates(operation).await?;
        let mut snapshot = operation.clone();
        let mut attempts = 0usize;

        for partner in &partners {
            let assignment = match self
                .assigner
                .assign(&snapshot, partner.id(), partner.min_balance())
                .await
            {
                Ok(assignment) => assignment,
                Err(e @ RoutingError::AlreadyAssigned(_)) => return Err(e),
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        operation_id = %snapshot.id(),
                        partner_id = %partner.id(),
                        error = %e,
                        "Partner could not reserve, trying next"
                    );
                    continue;
                }
            };
            snapshot = assignment.operation;
            attempts = attempts.saturating_add(1);

            let request =
                RemoteDealRequest::for_attempt(&snapshot, partner, assignment.freeze.settlement_amount());
            let result = self.call_partner(partner, &request).await;

            match result {
                Ok(deal) if deal.accepted => {
                    return self.finish(partner, snapshot, deal, attempts).await;
                }
                Ok(_) => tracing::warn!(
                    operation_id = %snapshot.id(),
                    partner_id = %partner.id(),
                    "Partner declined deal"
                ),
                Err(e) => tracing::warn!(
                    operation_id = %snapshot.id(),
                    partner_id = %partner.id(),
                    error = %e,
                    "Partner call failed"
                ),
            }
            snapshot = self.assigner.revert_tentative(snapshot.id(), partner.id()).await?;
        }

        Err(RoutingError::AllPartnersExhausted {
            operation_id: operation.id(),
            attempts,
        })
    }

    /// Calls the partner under its timeout and logs the attempt.
    async fn call_partner(
        &self,
        partner: &AggregatorPartner,
        request: &RemoteDealRequest,
    ) -> PartnerResult<RemoteDeal> {
        let mut endpoint = PartnerEndpoint::from(partner);
        if endpoint.timeout.is_zero() {
            endpoint.timeout = self.default_timeout;
        }
        let timeout_ms = u64::try_from(endpoint.timeout.as_millis()).unwrap_or(u64::MAX);

        let attempted_at = Timestamp::now();
        let started = Instant::now();
        let result = tokio::time::timeout(
            endpoint.timeout,
            self.client.create_remote_deal(&endpoint, request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(PartnerError::timeout_with_duration(
                "Partner did not answer in time",
                timeout_ms,
            ))
        });
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (outcome, status_code) = match &result {
            Ok(deal) if deal.accepted => (AttemptOutcome::Accepted, None),
            Ok(_) => (AttemptOutcome::Rejected, None),
            Err(e) => (e.attempt_outcome(), e.status_code()),
        };
        let attempt = IntegrationAttempt::new(
            partner.id().clone(),
            request.operation_id,
            attempted_at,
            latency_ms,
            status_code,
            outcome,
            partner.sla_ms(),
        );
        if attempt.sla_violated() {
            tracing::warn!(
                partner_id = %partner.id(),
                latency_ms,
                sla_ms = partner.sla_ms(),
                "Partner SLA violated"
            );
        }
        if let Err(e) = self.tracker.record_attempt(attempt).await {
            tracing::warn!(partner_id = %partner.id(), error = %e, "Failed to log partner attempt");
        }
        result
    }

    async fn finish(
        &self,
        partner: &AggregatorPartner,
        mut operation: Operation,
        deal: RemoteDeal,
        attempts: usize,
    ) -> RoutingResult<RoutedDeal> {
        if let Some(external_ref) = deal.external_id.as_deref() {
            operation = self
                .assigner
                .attach_external_ref(operation.id(), partner.id(), external_ref)
                .await?;
        }
        if let Err(e) = self
            .handlers
            .add_partner_volume(partner.id(), operation.amount(), Timestamp::now())
            .await
        {
            tracing::warn!(partner_id = %partner.id(), error = %e, "Failed to record partner volume");
        }
        tracing::info!(
            operation_id = %operation.id(),
            partner_id = %partner.id(),
            attempts,
            "Operation routed to partner"
        );
        Ok(RoutedDeal {
            partner_id: partner.id().clone(),
            external_ref: deal.external_id,
            payment_details: deal.payment_details,
            operation,
            attempts,
        })
    }
}
