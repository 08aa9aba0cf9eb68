//! # Partner Callback Handler
//!
//! Applies status callbacks sent by aggregator partners.
//!
//! A callback is verified first (timestamp window and signature). Only then
//! is its operation key parsed and the transition applied:
//!
//! | `operation_type` | Effect |
//! |------------------|--------|
//! | `COMPLETED` | settle the freeze, crediting the settlement amount |
//! | `CANCELED` | terminal cancel, releasing the freeze |

use crate::application::error::ApplicationResult;
use crate::application::services::operation_assigner::OperationAssigner;
use crate::domain::entities::Operation;
use crate::domain::value_objects::{OperationId, Timestamp};
use crate::infrastructure::callbacks::{
    CallbackError, CallbackFields, CallbackHeaders, CallbackVerifier,
};
use uuid::Uuid;

/// Status a partner can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// Deal settled on the partner side.
    Completed,
    /// Deal canceled on the partner side.
    Canceled,
}

impl CallbackKind {
    /// Parses the wire value, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns `CallbackError::UnsupportedType` for anything else.
    pub fn parse(value: &str) -> Result<Self, CallbackError> {
        if value.eq_ignore_ascii_case("COMPLETED") {
            Ok(Self::Completed)
        } else if value.eq_ignore_ascii_case("CANCELED") {
            Ok(Self::Canceled)
        } else {
            Err(CallbackError::UnsupportedType(value.to_string()))
        }
    }
}

/// Verifies callbacks and applies them through the assigner.
#[derive(Debug, Clone)]
pub struct PartnerCallbackHandler {
    verifier: CallbackVerifier,
    assigner: OperationAssigner,
}

impl PartnerCallbackHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(verifier: CallbackVerifier, assigner: OperationAssigner) -> Self {
        Self { verifier, assigner }
    }

    /// Verifies and applies a callback received now.
    ///
    /// # Errors
    ///
    /// See [`handle_at`](Self::handle_at).
    pub async fn handle(
        &self,
        headers: &CallbackHeaders,
        fields: &CallbackFields,
    ) -> ApplicationResult<Operation> {
        self.handle_at(headers, fields, Timestamp::now()).await
    }

    /// Verifies and applies a callback received at `received_at`.
    ///
    /// # Errors
    ///
    /// Returns `CallbackError` if verification fails or the payload is not
    /// understood; nothing is written in that case. Returns a routing error
    /// if the transition itself is rejected.
    pub async fn handle_at(
        &self,
        headers: &CallbackHeaders,
        fields: &CallbackFields,
        received_at: Timestamp,
    ) -> ApplicationResult<Operation> {
        if let Err(e) = self.verifier.verify(headers, fields, received_at) {
            tracing::warn!(
                partner = %fields.partner_name,
                operation_key = %fields.operation_key,
                error = %e,
                "Callback rejected"
            );
            return Err(e.into());
        }
        let kind = CallbackKind::parse(&fields.operation_type)?;
        let id = Uuid::parse_str(&fields.operation_key)
            .map(OperationId::new)
            .map_err(|_| CallbackError::InvalidOperationKey(fields.operation_key.clone()))?;

        let operation = match kind {
            CallbackKind::Completed => self.assigner.complete(id, None).await?,
            CallbackKind::Canceled => self.assigner.cancel(id).await?,
        };
        tracing::info!(
            operation_id = %id,
            partner = %fields.partner_name,
            status = %operation.status(),
            "Partner callback applied"
        );
        Ok(operation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::error::ApplicationError;
    use crate::domain::entities::{AggregatorPartner, Handler, OperationBuilder};
    use crate::domain::value_objects::{
        Direction, HandlerId, MerchantId, OperationStatus,
    };
    use crate::infrastructure::callbacks::SignatureVerifier;
    use crate::infrastructure::persistence::{HandlerRepository, InMemoryStore, OperationRepository};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    /// Accepts a signature equal to the canonical string reversed.
    #[derive(Debug)]
    struct ReversingVerifier;

    impl SignatureVerifier for ReversingVerifier {
        fn verify(&self, _partner: &str, canonical: &str, signature: &str) -> Result<(), String> {
            if canonical.chars().rev().collect::<String>() == signature {
                Ok(())
            } else {
                Err("mismatch".to_string())
            }
        }
    }

    fn signed(fields: &CallbackFields, at: Timestamp) -> CallbackHeaders {
        let ts = at.timestamp_secs();
        CallbackHeaders {
            timestamp: ts,
            signature: crate::infrastructure::callbacks::canonical_string(ts, fields)
                .chars()
                .rev()
                .collect(),
        }
    }

    fn fields(op: OperationId, kind: &str) -> CallbackFields {
        CallbackFields {
            partner_name: "acme".to_string(),
            operation_key: op.to_string(),
            operation_type: kind.to_string(),
        }
    }

    async fn setup() -> (InMemoryStore, PartnerCallbackHandler, Operation) {
        let store = InMemoryStore::new();
        let partner = AggregatorPartner::new(HandlerId::new("acme"), "http://acme", 0)
            .with_settlement_balance(Decimal::new(1_000, 0));
        HandlerRepository::save(&store, &Handler::from(partner)).await.unwrap();
        let op = OperationBuilder::new(
            MerchantId::new("m"),
            Direction::In,
            Decimal::new(7_000, 0),
            Decimal::new(100, 0),
            Timestamp::now().add_secs(600),
        )
        .build()
        .unwrap();
        OperationRepository::insert(&store, &op).await.unwrap();

        let shared = Arc::new(store.clone());
        let assigner = OperationAssigner::new(shared.clone(), shared);
        let assigned = assigner
            .assign(&op, &HandlerId::new("acme"), Decimal::ZERO)
            .await
            .unwrap()
            .operation;
        let handler = PartnerCallbackHandler::new(
            CallbackVerifier::new(Arc::new(ReversingVerifier)),
            assigner,
        );
        (store, handler, assigned)
    }

    #[tokio::test]
    async fn completed_settles_the_freeze() {
        let (store, handler, op) = setup().await;
        let f = fields(op.id(), "COMPLETED");
        let now = Timestamp::now();

        let done = handler.handle_at(&signed(&f, now), &f, now).await.unwrap();
        assert_eq!(done.status(), OperationStatus::Completed);

        let acme = HandlerRepository::get(&store, &HandlerId::new("acme"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acme.balances().settlement.frozen, Decimal::ZERO);
        assert_eq!(acme.balances().settlement.available, Decimal::new(1_000, 0));
    }

    #[tokio::test]
    async fn canceled_releases_the_freeze() {
        let (store, handler, op) = setup().await;
        let f = fields(op.id(), "canceled");
        let now = Timestamp::now();

        let done = handler.handle_at(&signed(&f, now), &f, now).await.unwrap();
        assert_eq!(done.status(), OperationStatus::Canceled);
        assert_eq!(store.freeze_count().await, 0);
    }

    #[tokio::test]
    async fn bad_signature_never_reaches_the_store() {
        let (store, handler, op) = setup().await;
        let f = fields(op.id(), "COMPLETED");
        let now = Timestamp::now();
        let mut headers = signed(&f, now);
        headers.signature.push('x');

        let err = handler.handle_at(&headers, &f, now).await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Callback(CallbackError::SignatureInvalid(_))
        ));
        assert_eq!(store.freeze_count().await, 1);
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let (_, handler, op) = setup().await;
        let f = fields(op.id(), "COMPLETED");
        let now = Timestamp::now();
        let headers = signed(&f, now.sub_secs(121));

        let err = handler.handle_at(&headers, &f, now).await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Callback(CallbackError::TimestampExpired { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_type_and_key_are_rejected() {
        let (_, handler, op) = setup().await;
        let now = Timestamp::now();

        let f = fields(op.id(), "REFUNDED");
        let err = handler.handle_at(&signed(&f, now), &f, now).await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Callback(CallbackError::UnsupportedType(_))
        ));

        let mut f = fields(op.id(), "COMPLETED");
        f.operation_key = "not-a-uuid".to_string();
        let err = handler.handle_at(&signed(&f, now), &f, now).await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Callback(CallbackError::InvalidOperationKey(_))
        ));
    }
}
