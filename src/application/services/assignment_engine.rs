//! # Assignment Engine
//!
//! The periodic tick that distributes unassigned operations.
//!
//! # Algorithm
//!
//! 1. Load assignable operations (unassigned, not expired), oldest first.
//! 2. Build the [`CandidatePool`] once from the traders and the persisted
//!    round-robin positions.
//! 3. For each operation, walk the pool front to back, evaluate each handler
//!    with the in-tick pending debits and assign to the first eligible one.
//!    The winner rotates to the back of the pool and of the persisted queue.
//! 4. If no trader takes it, hand it to the [`FallbackRouter`] when one is
//!    configured; otherwise it waits for the next tick.
//!
//! A failure on one candidate or partner is logged and the walk continues.
//! Only an unreachable store aborts the tick.

use crate::application::error::{ApplicationResult, RoutingError, RoutingResult};
use crate::application::services::candidate_pool::CandidatePool;
use crate::application::services::eligibility::{EligibilityFilter, OperationFacts};
use crate::application::services::fallback_router::FallbackRouter;
use crate::application::services::operation_assigner::{Assignment, OperationAssigner};
use crate::application::services::scheduler::PeriodicTask;
use crate::domain::entities::Operation;
use crate::domain::value_objects::Timestamp;
use crate::infrastructure::notifications::HandlerNotifier;
use crate::infrastructure::persistence::{AssignmentQueue, HandlerRepository, OperationRepository};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Operations loaded.
    pub considered: usize,
    /// Operations assigned to internal handlers.
    pub assigned: usize,
    /// Operations placed with a partner.
    pub routed: usize,
    /// Operations taken concurrently by someone else.
    pub skipped: usize,
    /// Operations left for the next tick.
    pub unassigned: usize,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "considered={} assigned={} routed={} skipped={} unassigned={}",
            self.considered, self.assigned, self.routed, self.skipped, self.unassigned
        )
    }
}

enum Placement {
    Internal(Assignment),
    Routed,
    Taken,
    None,
}

/// Periodic distributor of unassigned operations.
#[derive(Debug, Clone)]
pub struct AssignmentEngine {
    operations: Arc<dyn OperationRepository>,
    handlers: Arc<dyn HandlerRepository>,
    queue: Arc<dyn AssignmentQueue>,
    filter: EligibilityFilter,
    assigner: OperationAssigner,
    fallback: Option<FallbackRouter>,
    notifier: Arc<dyn HandlerNotifier>,
}

impl AssignmentEngine {
    /// Creates an engine without partner fallback.
    #[must_use]
    pub fn new(
        operations: Arc<dyn OperationRepository>,
        handlers: Arc<dyn HandlerRepository>,
        queue: Arc<dyn AssignmentQueue>,
        filter: EligibilityFilter,
        assigner: OperationAssigner,
        notifier: Arc<dyn HandlerNotifier>,
    ) -> Self {
        Self {
            operations,
            handlers,
            queue,
            filter,
            assigner,
            fallback: None,
            notifier,
        }
    }

    /// Enables partner fallback.
    #[must_use]
    pub fn with_fallback(mut self, router: FallbackRouter) -> Self {
        self.fallback = Some(router);
        self
    }

    /// Returns true if partner fallback is enabled.
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Runs one tick at the current time.
    ///
    /// # Errors
    ///
    /// Returns a store error if the store is unreachable; the tick stops at
    /// that point.
    pub async fn tick(&self) -> RoutingResult<TickReport> {
        self.tick_at(Timestamp::now()).await
    }

    /// Runs one tick as of `now`.
    ///
    /// # Errors
    ///
    /// See [`tick`](Self::tick).
    pub async fn tick_at(&self, now: Timestamp) -> RoutingResult<TickReport> {
        let operations = self.operations.find_assignable(now).await?;
        let mut report = TickReport {
            considered: operations.len(),
            ..TickReport::default()
        };
        if operations.is_empty() {
            return Ok(report);
        }

        let traders = self.handlers.find_traders().await?;
        let positions = self.queue.last_assigned().await?;
        let mut pool = CandidatePool::new(traders, &positions);

        for operation in &operations {
            match self.place_internally(operation, &pool).await? {
                Placement::Internal(assignment) => {
                    pool.record_assignment(&assignment.freeze);
                    self.persist_position(&assignment, now).await?;
                    self.notify(&assignment);
                    report.assigned = report.assigned.saturating_add(1);
                }
                Placement::Routed => report.routed = report.routed.saturating_add(1),
                Placement::Taken => report.skipped = report.skipped.saturating_add(1),
                Placement::None => match self.route_to_partner(operation).await? {
                    Placement::Routed => report.routed = report.routed.saturating_add(1),
                    Placement::Taken => report.skipped = report.skipped.saturating_add(1),
                    Placement::Internal(_) | Placement::None => {
                        report.unassigned = report.unassigned.saturating_add(1);
                    }
                },
            }
        }

        tracing::info!(
            considered = report.considered,
            assigned = report.assigned,
            routed = report.routed,
            skipped = report.skipped,
            unassigned = report.unassigned,
            handlers = pool.len(),
            "Assignment tick finished"
        );
        Ok(report)
    }

    async fn place_internally(
        &self,
        operation: &Operation,
        pool: &CandidatePool,
    ) -> RoutingResult<Placement> {
        let mut facts = OperationFacts::default();

        for handler in pool.iter() {
            let currency = handler.reserved_currency(operation.direction());
            let pending = pool.pending(handler.id(), currency);
            let verdict = match self.filter.evaluate(operation, handler, pending, &mut facts).await {
                Ok(verdict) => verdict,
                Err(e) if e.is_unavailable() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        operation_id = %operation.id(),
                        handler_id = %handler.id(),
                        error = %e,
                        "Eligibility check failed, trying next candidate"
                    );
                    continue;
                }
            };
            if !verdict.is_eligible() {
                continue;
            }

            match self.assigner.assign(operation, handler.id(), Decimal::ZERO).await {
                Ok(assignment) => return Ok(Placement::Internal(assignment)),
                Err(RoutingError::AlreadyAssigned(_)) => {
                    tracing::debug!(operation_id = %operation.id(), "Operation taken concurrently");
                    return Ok(Placement::Taken);
                }
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e @ RoutingError::InsufficientBalance { .. }) => {
                    tracing::debug!(
                        operation_id = %operation.id(),
                        handler_id = %handler.id(),
                        error = %e,
                        "Balance changed since snapshot"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        operation_id = %operation.id(),
                        handler_id = %handler.id(),
                        error = %e,
                        "Assignment failed, trying next candidate"
                    );
                }
            }
        }
        Ok(Placement::None)
    }

    async fn route_to_partner(&self, operation: &Operation) -> RoutingResult<Placement> {
        let Some(router) = &self.fallback else {
            return Ok(Placement::None);
        };
        match router.route(operation).await {
            Ok(deal) => {
                tracing::debug!(
                    operation_id = %operation.id(),
                    partner_id = %deal.partner_id,
                    "Fallback placed operation"
                );
                Ok(Placement::Routed)
            }
            Err(RoutingError::AlreadyAssigned(_)) => Ok(Placement::Taken),
            Err(e) if e.is_unavailable() => Err(e),
            Err(e @ RoutingError::AllPartnersExhausted { .. }) => {
                tracing::info!(operation_id = %operation.id(), error = %e, "Operation left unassigned");
                Ok(Placement::None)
            }
            Err(e) => {
                tracing::warn!(operation_id = %operation.id(), error = %e, "Partner fallback failed");
                Ok(Placement::None)
            }
        }
    }

    async fn persist_position(&self, assignment: &Assignment, now: Timestamp) -> RoutingResult<()> {
        match self
            .queue
            .record_assignment(assignment.freeze.handler_id(), now)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_unavailable() => Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    handler_id = %assignment.freeze.handler_id(),
                    error = %e,
                    "Could not persist round-robin position"
                );
                Ok(())
            }
        }
    }

    fn notify(&self, assignment: &Assignment) {
        let notifier = Arc::clone(&self.notifier);
        let handler_id = assignment.freeze.handler_id().clone();
        let operation = assignment.operation.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_handler_assigned(&handler_id, &operation).await {
                tracing::warn!(
                    operation_id = %operation.id(),
                    handler_id = %handler_id,
                    error = %e,
                    "Handler notification failed"
                );
            }
        });
    }
}

#[async_trait]
impl PeriodicTask for AssignmentEngine {
    fn name(&self) -> &'static str {
        "assignment"
    }

    async fn run_once(&self) -> ApplicationResult<()> {
        self.tick().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::services::fallback_router::tests::{Script, ScriptedClient, partner};
    use crate::application::services::traffic_classifier::TrafficClassifier;
    use crate::domain::entities::{Handler, MerchantLink, OperationBuilder, Trader};
    use crate::domain::services::PartnerPerformanceTracker;
    use crate::domain::value_objects::{BalanceCurrency, Direction, HandlerId, MerchantId};
    use crate::infrastructure::notifications::TracingNotifier;
    use crate::infrastructure::persistence::{
        InMemoryIntegrationLog, InMemoryStore, MerchantLinkRepository,
    };
    use std::collections::HashMap;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn trader(id: &str, balance: i64) -> Trader {
        Trader::new(HandlerId::new(id)).with_balance(BalanceCurrency::Settlement, dec(balance))
    }

    /// Deal debiting 10 in settlement currency.
    fn deal() -> Operation {
        OperationBuilder::new(
            MerchantId::new("m"),
            Direction::In,
            dec(100),
            dec(10),
            Timestamp::now().add_secs(600),
        )
        .build()
        .unwrap()
    }

    struct Fixture {
        store: InMemoryStore,
        assigner: OperationAssigner,
        engine: AssignmentEngine,
        operations: Vec<Operation>,
    }

    async fn fixture(traders: &[Trader], operations: usize) -> Fixture {
        let store = InMemoryStore::new();
        for t in traders {
            HandlerRepository::save(&store, &Handler::from(t.clone()))
                .await
                .unwrap();
            MerchantLinkRepository::save(
                &store,
                &MerchantLink::new(MerchantId::new("m"), t.id().clone()),
            )
            .await
            .unwrap();
        }
        let operations: Vec<Operation> = (0..operations).map(|_| deal()).collect();
        for op in &operations {
            OperationRepository::insert(&store, op).await.unwrap();
        }

        let shared = Arc::new(store.clone());
        let assigner = OperationAssigner::new(shared.clone(), shared.clone());
        let filter = EligibilityFilter::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            TrafficClassifier::new(shared.clone()),
        );
        let engine = AssignmentEngine::new(
            shared.clone(),
            shared.clone(),
            shared,
            filter,
            assigner.clone(),
            Arc::new(TracingNotifier),
        );
        Fixture {
            store,
            assigner,
            engine,
            operations,
        }
    }

    async fn per_handler(store: &InMemoryStore) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for t in HandlerRepository::find_traders(store).await.unwrap() {
            let active = OperationRepository::count_active_for(store, t.id()).await.unwrap();
            counts.insert(t.id().as_str().to_string(), active as usize);
        }
        counts
    }

    mod distribution {
        use super::*;

        #[tokio::test]
        async fn spreads_evenly_across_equal_handlers() {
            let traders = [trader("a", 1_000), trader("b", 1_000), trader("c", 1_000)];
            let f = fixture(&traders, 7).await;

            let report = f.engine.tick().await.unwrap();
            assert_eq!(report.considered, 7);
            assert_eq!(report.assigned, 7);

            let counts = per_handler(&f.store).await;
            for id in ["a", "b", "c"] {
                assert!(counts.get(id).copied().unwrap() >= 2, "{id} got {counts:?}");
            }
        }

        #[tokio::test]
        async fn in_tick_debits_limit_a_handler() {
            let f = fixture(&[trader("a", 15)], 2).await;

            let report = f.engine.tick().await.unwrap();
            assert_eq!(report.assigned, 1);
            assert_eq!(report.unassigned, 1);

            let a = HandlerRepository::get(&f.store, &HandlerId::new("a"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(a.balances().settlement.available, dec(5));
            assert_eq!(a.balances().settlement.frozen, dec(10));
        }

        #[tokio::test]
        async fn positions_persist_across_ticks() {
            let f = fixture(&[trader("a", 1_000), trader("b", 1_000)], 1).await;
            f.engine.tick().await.unwrap();
            OperationRepository::insert(&f.store, &deal()).await.unwrap();
            f.engine.tick().await.unwrap();

            let counts = per_handler(&f.store).await;
            assert_eq!(counts.get("a").copied(), Some(1));
            assert_eq!(counts.get("b").copied(), Some(1));
            assert_eq!(
                AssignmentQueue::last_assigned(&f.store).await.unwrap().len(),
                2
            );
        }

        #[tokio::test]
        async fn empty_queue_is_a_noop() {
            let f = fixture(&[trader("a", 1_000)], 0).await;
            assert_eq!(f.engine.tick().await.unwrap(), TickReport::default());
        }
    }

    mod exclusion {
        use super::*;

        #[tokio::test]
        async fn returned_operation_never_goes_back() {
            let f = fixture(&[trader("a", 1_000)], 1).await;
            f.engine.tick().await.unwrap();

            let a = HandlerId::new("a");
            let id = f.operations.first().unwrap().id();
            f.assigner.accept(id, &a).await.unwrap();
            let returned = f.assigner.cancel_by_handler(id, &a).await.unwrap();
            assert!(returned.was_handled_by(&a));

            for _ in 0..3 {
                let report = f.engine.tick().await.unwrap();
                assert_eq!(report.assigned, 0);
                assert_eq!(report.unassigned, 1);
            }
        }
    }

    mod fallback {
        use super::*;

        #[tokio::test]
        async fn routes_when_no_trader_fits() {
            let f = fixture(&[trader("poor", 1)], 1).await;
            HandlerRepository::save(&f.store, &Handler::from(partner("p0", 0)))
                .await
                .unwrap();
            let shared = Arc::new(f.store.clone());
            let router = FallbackRouter::new(
                shared,
                f.assigner.clone(),
                Arc::new(ScriptedClient::new(&[("p0", Script::Accept)])),
                PartnerPerformanceTracker::with_defaults(Arc::new(InMemoryIntegrationLog::new())),
            );
            let engine = f.engine.clone().with_fallback(router);
            assert!(engine.has_fallback());

            let report = engine.tick().await.unwrap();
            assert_eq!(report.routed, 1);
            assert_eq!(report.assigned, 0);
        }

        #[tokio::test]
        async fn exhausted_partners_leave_operation_unassigned() {
            let f = fixture(&[], 1).await;
            HandlerRepository::save(&f.store, &Handler::from(partner("p0", 0)))
                .await
                .unwrap();
            let router = FallbackRouter::new(
                Arc::new(f.store.clone()),
                f.assigner.clone(),
                Arc::new(ScriptedClient::new(&[("p0", Script::Decline)])),
                PartnerPerformanceTracker::with_defaults(Arc::new(InMemoryIntegrationLog::new())),
            );
            let report = f.engine.clone().with_fallback(router).tick().await.unwrap();
            assert_eq!(report.unassigned, 1);
            assert_eq!(f.store.freeze_count().await, 0);
        }
    }

    #[tokio::test]
    async fn unavailable_store_aborts_the_tick() {
        let f = fixture(&[trader("a", 1_000)], 1).await;
        f.store.set_unavailable(true);
        let err = f.engine.run_once().await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
