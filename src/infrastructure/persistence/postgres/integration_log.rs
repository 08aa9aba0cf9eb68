//! # PostgreSQL Integration Log
//!
//! Append-only `integration_attempts` table behind [`IntegrationLogRepository`].
//!
//! ```sql
//! CREATE TABLE integration_attempts (
//!     id BIGSERIAL PRIMARY KEY,
//!     partner_id TEXT NOT NULL,
//!     operation_id UUID NOT NULL,
//!     attempted_at TIMESTAMPTZ NOT NULL,
//!     latency_ms BIGINT NOT NULL,
//!     status_code INTEGER,
//!     outcome TEXT NOT NULL,
//!     sla_violated BOOLEAN NOT NULL
//! );
//! CREATE INDEX integration_attempts_partner_time
//!     ON integration_attempts (partner_id, attempted_at);
//! ```

use crate::domain::entities::IntegrationAttempt;
use crate::domain::services::partner_performance::{
    IntegrationLogRepository, PartnerPerformanceError, PartnerPerformanceResult,
};
use crate::domain::value_objects::{AttemptOutcome, HandlerId, OperationId, Timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of [`IntegrationLogRepository`].
#[derive(Debug, Clone)]
pub struct PostgresIntegrationLog {
    pool: PgPool,
}

impl PostgresIntegrationLog {
    /// Creates a new log over the pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntegrationLogRepository for PostgresIntegrationLog {
    async fn append(&self, attempt: IntegrationAttempt) -> PartnerPerformanceResult<()> {
        let latency = i64::try_from(attempt.latency_ms()).unwrap_or(i64::MAX);
        sqlx::query(
            r#"
            INSERT INTO integration_attempts (
                partner_id, operation_id, attempted_at, latency_ms,
                status_code, outcome, sla_violated
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(attempt.partner_id().as_str())
        .bind(attempt.operation_id().get())
        .bind(attempt.attempted_at().as_datetime())
        .bind(latency)
        .bind(attempt.status_code().map(i32::from))
        .bind(attempt.outcome().to_string())
        .bind(attempt.sla_violated())
        .execute(&self.pool)
        .await
        .map_err(|e| PartnerPerformanceError::repository(e.to_string()))?;
        Ok(())
    }

    async fn get_attempts(
        &self,
        partner_id: &HandlerId,
        from: Timestamp,
        to: Timestamp,
    ) -> PartnerPerformanceResult<Vec<IntegrationAttempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"
            SELECT partner_id, operation_id, attempted_at, latency_ms,
                   status_code, outcome, sla_violated
            FROM integration_attempts
            WHERE partner_id = $1 AND attempted_at >= $2 AND attempted_at <= $3
            ORDER BY attempted_at ASC
            "#,
        )
        .bind(partner_id.as_str())
        .bind(from.as_datetime())
        .bind(to.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PartnerPerformanceError::repository(e.to_string()))?;

        rows.into_iter().map(AttemptRow::try_into_attempt).collect()
    }

    async fn trim_before(&self, before: Timestamp) -> PartnerPerformanceResult<u64> {
        let result = sqlx::query("DELETE FROM integration_attempts WHERE attempted_at < $1")
            .bind(before.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| PartnerPerformanceError::repository(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

/// Row type for attempt queries.
#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    partner_id: String,
    operation_id: Uuid,
    attempted_at: DateTime<Utc>,
    latency_ms: i64,
    status_code: Option<i32>,
    outcome: String,
    sla_violated: bool,
}

impl AttemptRow {
    fn try_into_attempt(self) -> PartnerPerformanceResult<IntegrationAttempt> {
        let outcome: AttemptOutcome = self
            .outcome
            .parse()
            .map_err(|e| PartnerPerformanceError::repository(format!("invalid outcome: {e}")))?;
        Ok(IntegrationAttempt::from_parts(
            HandlerId::new(self.partner_id),
            OperationId::new(self.operation_id),
            Timestamp::from(self.attempted_at),
            self.latency_ms.max(0) as u64,
            self.status_code.and_then(|c| u16::try_from(c).ok()),
            outcome,
            self.sla_violated,
        ))
    }
}
