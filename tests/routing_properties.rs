//! End-to-end routing properties over the in-memory store.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use deal_router::application::services::balance_ledger::{apply_freeze, apply_release, apply_settle};
use deal_router::application::services::{
    AssignmentEngine, BalanceLedger, EligibilityFilter, FallbackRouter, OperationAssigner,
    TrafficClassifier,
};
use deal_router::domain::entities::{
    AggregatorPartner, Balances, FreezeRecord, FreezeTerms, Handler, HandlerFilters, MerchantLink,
    Operation, OperationBuilder, Trader,
};
use deal_router::domain::services::PartnerPerformanceTracker;
use deal_router::domain::value_objects::{
    BalanceCurrency, CounterpartyId, Direction, HandlerId, MerchantId, OperationId, Timestamp,
    TrafficTier,
};
use deal_router::infrastructure::notifications::TracingNotifier;
use deal_router::infrastructure::partners::{
    PartnerClient, PartnerEndpoint, PartnerError, PartnerResult, RemoteDeal, RemoteDealRequest,
};
use deal_router::infrastructure::persistence::{
    HandlerRepository, InMemoryIntegrationLog, InMemoryStore, MerchantLinkRepository,
    OperationRepository,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn trader(id: &str, balance: i64) -> Trader {
    Trader::new(HandlerId::new(id)).with_balance(BalanceCurrency::Settlement, dec(balance))
}

fn deal(amount: i64, rate: i64) -> OperationBuilder {
    OperationBuilder::new(
        MerchantId::new("m"),
        Direction::In,
        dec(amount),
        dec(rate),
        Timestamp::now().add_secs(600),
    )
}

struct World {
    store: InMemoryStore,
    assigner: OperationAssigner,
    filter: EligibilityFilter,
    engine: AssignmentEngine,
}

async fn world(traders: &[Trader]) -> World {
    let store = InMemoryStore::new();
    for t in traders {
        HandlerRepository::save(&store, &Handler::from(t.clone()))
            .await
            .unwrap();
        MerchantLinkRepository::save(&store, &MerchantLink::new(MerchantId::new("m"), t.id().clone()))
            .await
            .unwrap();
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
        filter.clone(),
        assigner.clone(),
        Arc::new(TracingNotifier),
    );
    World {
        store,
        assigner,
        filter,
        engine,
    }
}

async fn insert(store: &InMemoryStore, count: usize) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(count);
    for _ in 0..count {
        let op = deal(100, 10).build().unwrap();
        OperationRepository::insert(store, &op).await.unwrap();
        ops.push(op);
    }
    ops
}

async fn held_by(store: &InMemoryStore, ops: &[Operation]) -> HashMap<HandlerId, usize> {
    let mut counts = HashMap::new();
    for op in ops {
        let stored = OperationRepository::get(store, op.id()).await.unwrap().unwrap();
        if let Some(h) = stored.handler_id() {
            *counts.entry(h.clone()).or_insert(0) += 1;
        }
    }
    counts
}

mod ledger {
    use super::*;

    fn record(amount: u32, rate: u32, commission_bp: u32) -> FreezeRecord {
        let terms = FreezeTerms::compute(
            Direction::In,
            Decimal::new(i64::from(amount), 2),
            Decimal::new(i64::from(rate), 2),
            Decimal::new(i64::from(commission_bp), 2),
        )
        .unwrap();
        FreezeRecord::new(OperationId::new_v4(), HandlerId::new("h"), terms)
    }

    proptest! {
        #[test]
        fn freeze_then_release_is_exact(
            amount in 1u32..10_000_000,
            rate in 1u32..20_000,
            commission_bp in 0u32..1_000,
            balance in 0i64..1_000_000_000,
        ) {
            let rec = record(amount, rate, commission_bp);
            let mut balances = Balances::default();
            balances.settlement.available = Decimal::new(balance, 2);
            let before = balances;

            if apply_freeze(&mut balances, &rec, Decimal::ZERO).is_ok() {
                prop_assert!(rec.debited_amount() >= rec.frozen_amount());
                prop_assert_eq!(balances.settlement.total(), before.settlement.total());
                prop_assert_eq!(balances.settlement.frozen, rec.debited_amount());
                apply_release(&mut balances, &rec).unwrap();
            }
            prop_assert_eq!(balances, before);
        }

        #[test]
        fn settle_moves_exactly_debit_and_credit(
            amount in 1u32..10_000_000,
            rate in 1u32..20_000,
            credit in 0i64..1_000_000,
        ) {
            let rec = record(amount, rate, 0);
            let mut balances = Balances::default();
            balances.settlement.available = rec.debited_amount() + dec(1);
            apply_freeze(&mut balances, &rec, Decimal::ZERO).unwrap();
            let frozen = balances.settlement.frozen;
            let available = balances.settlement.available;

            apply_settle(&mut balances, &rec, Decimal::new(credit, 2)).unwrap();
            prop_assert_eq!(balances.settlement.frozen, frozen - rec.debited_amount());
            prop_assert_eq!(balances.settlement.available, available + Decimal::new(credit, 2));
            prop_assert!(balances.settlement.frozen >= Decimal::ZERO);
        }

        #[test]
        fn stored_freeze_release_round_trips(amount in 1i64..50_000, rate in 1i64..200) {
            tokio_test::block_on(async {
                let w = world(&[trader("t", 1_000_000)]).await;
                let op = deal(amount, rate).build().unwrap();
                let ledger = BalanceLedger::new(Arc::new(w.store.clone()));
                let rec = ledger.freeze(&HandlerId::new("t"), &op).await.unwrap();
                let after = ledger.release(&rec).await.unwrap();
                assert_eq!(after.settlement.available, dec(1_000_000));
                assert_eq!(after.settlement.frozen, Decimal::ZERO);
                assert_eq!(w.store.freeze_count().await, 0);
            });
        }
    }

    #[tokio::test]
    async fn reference_deal_freezes_seventy() {
        let w = world(&[trader("t", 100)]).await;
        let op = deal(7_000, 100).build().unwrap();
        OperationRepository::insert(&w.store, &op).await.unwrap();

        let assignment = w
            .assigner
            .assign(&op, &HandlerId::new("t"), Decimal::ZERO)
            .await
            .unwrap();
        assert_eq!(assignment.freeze.frozen_amount(), dec(70));
        assert_eq!(assignment.freeze.debited_amount(), dec(70));
        assert_eq!(assignment.balances.settlement.available, dec(30));
        assert_eq!(assignment.balances.settlement.frozen, dec(70));

        let done = w.assigner.complete(op.id(), None).await.unwrap();
        assert_eq!(done.settlement_amount(), Some(dec(70)));
        let t = HandlerRepository::get(&w.store, &HandlerId::new("t"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.balances().settlement.frozen, Decimal::ZERO);
        assert_eq!(t.balances().settlement.available, dec(100));
    }

    #[tokio::test]
    async fn release_restores_freeze_time_amounts_after_commission_change() {
        let t = trader("t", 1_000).with_commission(Direction::In, dec(5));
        let w = world(&[t]).await;
        let op = deal(1_000, 10).build().unwrap();
        OperationRepository::insert(&w.store, &op).await.unwrap();

        let assignment = w
            .assigner
            .assign(&op, &HandlerId::new("t"), Decimal::ZERO)
            .await
            .unwrap();
        assert_eq!(assignment.freeze.debited_amount(), dec(105));

        let stored = HandlerRepository::get(&w.store, &HandlerId::new("t"))
            .await
            .unwrap()
            .unwrap();
        let repriced = stored
            .as_trader()
            .unwrap()
            .clone()
            .with_commission(Direction::In, dec(20));
        HandlerRepository::save(&w.store, &Handler::from(repriced))
            .await
            .unwrap();

        w.assigner
            .cancel_by_handler(op.id(), &HandlerId::new("t"))
            .await
            .unwrap();
        let after = HandlerRepository::get(&w.store, &HandlerId::new("t"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.balances().settlement.available, dec(1_000));
        assert_eq!(after.balances().settlement.frozen, Decimal::ZERO);
        assert_eq!(after.commission_pct(Direction::In), dec(20));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assign_and_cancel_keep_frozen_consistent() {
        let ids = ["t0", "t1", "t2", "t3"];
        let traders: Vec<_> = ids.iter().map(|id| trader(id, 1_000)).collect();
        let w = world(&traders).await;
        let ops = insert(&w.store, 40).await;

        let mut tasks = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            let handler_id = HandlerId::new(ids[i % ids.len()]);
            let assigner = w.assigner.clone();
            let snapshot = op.clone();
            let target = handler_id.clone();
            tasks.push(tokio::spawn(async move {
                let _ = assigner.assign(&snapshot, &target, Decimal::ZERO).await;
            }));
            let assigner = w.assigner.clone();
            let id = op.id();
            tasks.push(tokio::spawn(async move {
                for _ in 0..3 {
                    let _ = assigner.cancel_by_handler(id, &handler_id).await;
                    tokio::task::yield_now().await;
                }
            }));
        }
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        for id in ids {
            let handler_id = HandlerId::new(id);
            let h = HandlerRepository::get(&w.store, &handler_id)
                .await
                .unwrap()
                .unwrap();
            let pair = h.balances().settlement;
            assert!(pair.frozen >= Decimal::ZERO);
            assert_eq!(
                pair.frozen,
                w.store.debited_total(&handler_id, BalanceCurrency::Settlement).await
            );
            assert_eq!(pair.total(), dec(1_000));
        }
    }

    #[tokio::test]
    async fn insufficient_balance_leaves_no_trace() {
        let w = world(&[trader("t", 69)]).await;
        let op = deal(7_000, 100).build().unwrap();
        OperationRepository::insert(&w.store, &op).await.unwrap();

        assert!(
            w.assigner
                .assign(&op, &HandlerId::new("t"), Decimal::ZERO)
                .await
                .is_err()
        );
        let t = HandlerRepository::get(&w.store, &HandlerId::new("t"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.balances().settlement.available, dec(69));
        assert_eq!(w.store.freeze_count().await, 0);
        let stored = OperationRepository::get(&w.store, op.id()).await.unwrap().unwrap();
        assert!(stored.is_unassigned());
    }
}

mod fairness {
    use super::*;

    #[tokio::test]
    async fn every_handler_gets_its_floor_share() {
        for n in 2..=4usize {
            for m in n..=(3 * n + 1) {
                let ids: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
                let traders: Vec<Trader> = ids.iter().map(|id| trader(id, 10_000)).collect();
                let w = world(&traders).await;
                let ops = insert(&w.store, m).await;

                let report = w.engine.tick().await.unwrap();
                assert_eq!(report.assigned, m);

                let counts = held_by(&w.store, &ops).await;
                for id in &ids {
                    let got = counts.get(&HandlerId::new(id.as_str())).copied().unwrap_or(0);
                    assert!(got >= m / n, "n={n} m={m} {id} got {got}");
                    assert!(got <= m.div_ceil(n), "n={n} m={m} {id} got {got}");
                }
            }
        }
    }

    #[tokio::test]
    async fn rotation_carries_over_between_ticks() {
        let w = world(&[trader("a", 10_000), trader("b", 10_000), trader("c", 10_000)]).await;
        let mut all = Vec::new();
        for _ in 0..3 {
            all.extend(insert(&w.store, 1).await);
            w.engine.tick().await.unwrap();
        }
        let counts = held_by(&w.store, &all).await;
        assert_eq!(counts.len(), 3);
    }
}

mod exclusion {
    use super::*;

    #[tokio::test]
    async fn returned_operation_goes_elsewhere_or_nowhere() {
        let w = world(&[trader("a", 10_000), trader("b", 10_000)]).await;
        let ops = insert(&w.store, 1).await;
        let id = ops[0].id();

        for _ in 0..2 {
            w.engine.tick().await.unwrap();
            let held = OperationRepository::get(&w.store, id).await.unwrap().unwrap();
            let holder = held.handler_id().cloned().unwrap();
            w.assigner.accept(id, &holder).await.unwrap();
            w.assigner.cancel_by_handler(id, &holder).await.unwrap();
        }

        for _ in 0..3 {
            let report = w.engine.tick().await.unwrap();
            assert_eq!(report.assigned, 0);
        }
        let stored = OperationRepository::get(&w.store, id).await.unwrap().unwrap();
        assert!(stored.is_unassigned());
        assert_eq!(stored.previous_handlers().len(), 2);
    }
}

mod filtering {
    use super::*;

    #[tokio::test]
    async fn default_filters_accept_every_tier() {
        let w = world(&[trader("open", 10_000)]).await;
        let op = deal(100, 10).build().unwrap();
        let open = HandlerRepository::get(&w.store, &HandlerId::new("open"))
            .await
            .unwrap()
            .unwrap();
        assert!(open.profile().filters.accepts_tier(TrafficTier::HighVolume));
        assert!(w.filter.is_eligible(&op, &open).await.unwrap());
    }

    #[tokio::test]
    async fn configured_filters_accept_only_listed_tiers() {
        let capped = trader("capped", 10_000).with_filters(HandlerFilters::default().with_max_amount(dec(1_000)));
        let listed = trader("listed", 10_000).with_filters(
            HandlerFilters::default()
                .with_max_amount(dec(1_000))
                .with_tier(TrafficTier::New),
        );
        let w = world(&[capped.clone(), listed.clone()]).await;
        let op = deal(100, 10).build().unwrap();

        assert!(!w.filter.is_eligible(&op, &Handler::from(capped)).await.unwrap());
        assert!(w.filter.is_eligible(&op, &Handler::from(listed)).await.unwrap());
    }

    #[tokio::test]
    async fn completed_history_raises_the_tier() {
        let w = world(&[trader("t", 1_000_000)]).await;
        let classifier = TrafficClassifier::new(Arc::new(w.store.clone()));
        let merchant = MerchantId::new("m");
        let cp = CounterpartyId::new("cp");
        let t = HandlerId::new("t");

        assert_eq!(
            classifier.classify(&merchant, Some(&cp), Direction::In).await.unwrap(),
            TrafficTier::New
        );

        let op = deal(100, 10).counterparty(cp.clone()).build().unwrap();
        OperationRepository::insert(&w.store, &op).await.unwrap();
        w.assigner.assign(&op, &t, Decimal::ZERO).await.unwrap();
        w.assigner.complete(op.id(), None).await.unwrap();

        assert_eq!(
            classifier.classify(&merchant, Some(&cp), Direction::In).await.unwrap(),
            TrafficTier::Returning
        );
        assert_eq!(
            classifier.classify(&merchant, Some(&cp), Direction::Out).await.unwrap(),
            TrafficTier::New
        );
        assert_eq!(
            classifier.classify(&merchant, None, Direction::In).await.unwrap(),
            TrafficTier::New
        );
    }
}

mod fallback {
    use super::*;

    #[derive(Debug, Default)]
    struct DecliningUntil {
        accept: String,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PartnerClient for DecliningUntil {
        async fn create_remote_deal(
            &self,
            endpoint: &PartnerEndpoint,
            request: &RemoteDealRequest,
        ) -> PartnerResult<RemoteDeal> {
            self.calls.lock().push(endpoint.base_url.clone());
            if endpoint.base_url == self.accept {
                Ok(RemoteDeal {
                    accepted: true,
                    external_id: Some(format!("x-{}", request.operation_id)),
                    payment_details: None,
                })
            } else {
                Err(PartnerError::connection("refused"))
            }
        }
    }

    fn partner(id: &str, priority: u32) -> AggregatorPartner {
        AggregatorPartner::new(HandlerId::new(id), id, priority)
            .with_settlement_balance(dec(10_000))
            .with_timeout_ms(100)
    }

    #[tokio::test]
    async fn partners_are_tried_in_priority_order() {
        let w = world(&[]).await;
        for p in [partner("p3", 3), partner("p1", 1), partner("p2", 2)] {
            HandlerRepository::save(&w.store, &Handler::from(p)).await.unwrap();
        }
        let ops = insert(&w.store, 1).await;
        let client = Arc::new(DecliningUntil {
            accept: "p3".into(),
            calls: Mutex::new(Vec::new()),
        });
        let log = Arc::new(InMemoryIntegrationLog::new());
        let router = FallbackRouter::new(
            Arc::new(w.store.clone()),
            w.assigner.clone(),
            client.clone(),
            PartnerPerformanceTracker::with_defaults(log.clone()),
        );

        let routed = router.route(&ops[0]).await.unwrap();
        assert_eq!(routed.partner_id, HandlerId::new("p3"));
        assert_eq!(*client.calls.lock(), vec!["p1", "p2", "p3"]);
        assert_eq!(log.total_attempt_count(), 3);
        assert_eq!(w.store.freeze_count().await, 1);
    }
}

#[tokio::test]
async fn unreachable_store_fails_the_tick() {
    let w = world(&[trader("t", 100)]).await;
    insert(&w.store, 1).await;
    w.store.set_unavailable(true);
    assert!(w.engine.tick().await.unwrap_err().is_unavailable());
}
