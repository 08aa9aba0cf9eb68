//! # Partner Client Trait
//!
//! Port for creating deals on an external aggregator partner.
//!
//! Each call carries an idempotency key so a partner that saw a request
//! before the timeout fired does not open a second deal on retry.

use crate::domain::entities::{AggregatorPartner, Operation};
use crate::domain::value_objects::{Direction, OperationId};
use crate::infrastructure::partners::error::PartnerResult;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where and how to reach a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerEndpoint {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Bearer token.
    pub api_token: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl From<&AggregatorPartner> for PartnerEndpoint {
    fn from(partner: &AggregatorPartner) -> Self {
        Self {
            base_url: partner.base_url().trim_end_matches('/').to_string(),
            api_token: partner.api_token().to_string(),
            timeout: Duration::from_millis(partner.timeout_ms()),
        }
    }
}

/// Payload for a remote deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDealRequest {
    /// Unique per attempt.
    pub idempotency_key: String,
    /// Local operation ID.
    pub operation_id: OperationId,
    /// Deal or payout.
    pub direction: Direction,
    /// Amount in operation currency.
    pub amount: Decimal,
    /// Settlement-currency amount.
    pub settlement_amount: Decimal,
    /// Payment-method category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Counterparty, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_id: Option<String>,
}

impl RemoteDealRequest {
    /// Builds the payload for sending `operation` to `partner`.
    #[must_use]
    pub fn for_attempt(
        operation: &Operation,
        partner: &AggregatorPartner,
        settlement_amount: Decimal,
    ) -> Self {
        Self {
            idempotency_key: format!("{}:{}:{}", operation.id(), partner.id(), operation.version()),
            operation_id: operation.id(),
            direction: operation.direction(),
            amount: operation.amount(),
            settlement_amount,
            category: operation.category().map(str::to_string),
            counterparty_id: operation.counterparty_id().map(ToString::to_string),
        }
    }
}

/// Partner answer to a deal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeal {
    /// Whether the partner took the deal.
    pub accepted: bool,
    /// Partner-side deal ID.
    #[serde(default)]
    pub external_id: Option<String>,
    /// Requisites shown to the payer.
    #[serde(default)]
    pub payment_details: Option<serde_json::Value>,
}

/// Client for partner deal creation.
#[async_trait]
pub trait PartnerClient: Send + Sync + fmt::Debug {
    /// Creates a deal on the partner.
    ///
    /// # Errors
    ///
    /// Returns `PartnerError::Timeout` if no answer arrives within
    /// `endpoint.timeout`, or another `PartnerError` on transport, status or
    /// decoding failures.
    async fn create_remote_deal(
        &self,
        endpoint: &PartnerEndpoint,
        request: &RemoteDealRequest,
    ) -> PartnerResult<RemoteDeal>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::entities::OperationBuilder;
    use crate::domain::value_objects::{HandlerId, MerchantId, Timestamp};

    #[test]
    fn endpoint_trims_trailing_slash() {
        let partner = AggregatorPartner::new(HandlerId::new("p"), "https://p.example/api/", 0)
            .with_api_token("tok")
            .with_timeout_ms(1500);
        let endpoint = PartnerEndpoint::from(&partner);
        assert_eq!(endpoint.base_url, "https://p.example/api");
        assert_eq!(endpoint.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn idempotency_key_differs_per_partner() {
        let op = OperationBuilder::new(
            MerchantId::new("m"),
            Direction::In,
            Decimal::new(100, 0),
            Decimal::new(10, 0),
            Timestamp::now().add_secs(60),
        )
        .build()
        .unwrap();
        let a = AggregatorPartner::new(HandlerId::new("a"), "u", 0);
        let b = AggregatorPartner::new(HandlerId::new("b"), "u", 1);
        let ra = RemoteDealRequest::for_attempt(&op, &a, Decimal::TEN);
        let rb = RemoteDealRequest::for_attempt(&op, &b, Decimal::TEN);
        assert_ne!(ra.idempotency_key, rb.idempotency_key);
        let json = serde_json::to_value(&ra).unwrap();
        assert!(json.get("category").is_none());
    }

    #[test]
    fn remote_deal_defaults() {
        let deal: RemoteDeal = serde_json::from_str(r#"{"accepted": false}"#).unwrap();
        assert!(!deal.accepted);
        assert!(deal.external_id.is_none());
    }
}
