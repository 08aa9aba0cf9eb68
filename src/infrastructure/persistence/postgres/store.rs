//! # PostgreSQL Store
//!
//! PostgreSQL implementation of the persistence ports using sqlx.
//!
//! Ledger transactions lock the handler row with `SELECT ... FOR UPDATE` and
//! write operations with `UPDATE ... WHERE version = $n`, so a concurrent
//! writer surfaces as a version conflict instead of a lost update.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE handlers (
//!     id TEXT PRIMARY KEY,
//!     kind TEXT NOT NULL,
//!     body JSONB NOT NULL,
//!     priority INTEGER NOT NULL DEFAULT 0,
//!     daily_volume_used NUMERIC NOT NULL DEFAULT 0,
//!     volume_date DATE,
//!     op_available NUMERIC NOT NULL DEFAULT 0,
//!     op_frozen NUMERIC NOT NULL DEFAULT 0 CHECK (op_frozen >= 0),
//!     st_available NUMERIC NOT NULL DEFAULT 0,
//!     st_frozen NUMERIC NOT NULL DEFAULT 0 CHECK (st_frozen >= 0)
//! );
//! CREATE TABLE operations (
//!     id UUID PRIMARY KEY,
//!     merchant_id TEXT NOT NULL,
//!     direction TEXT NOT NULL,
//!     amount NUMERIC NOT NULL,
//!     rate NUMERIC NOT NULL,
//!     category TEXT,
//!     counterparty_id TEXT,
//!     handler_id TEXT REFERENCES handlers(id),
//!     status TEXT NOT NULL,
//!     previous_handlers TEXT[] NOT NULL DEFAULT '{}',
//!     settlement_amount NUMERIC,
//!     external_ref TEXT,
//!     version BIGINT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE freeze_records (
//!     operation_id UUID PRIMARY KEY REFERENCES operations(id),
//!     handler_id TEXT NOT NULL REFERENCES handlers(id),
//!     currency TEXT NOT NULL,
//!     frozen_amount NUMERIC NOT NULL,
//!     debited_amount NUMERIC NOT NULL,
//!     settlement_amount NUMERIC NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE merchant_links (
//!     merchant_id TEXT NOT NULL,
//!     handler_id TEXT NOT NULL REFERENCES handlers(id),
//!     enabled BOOLEAN NOT NULL,
//!     deals_enabled BOOLEAN NOT NULL,
//!     payouts_enabled BOOLEAN NOT NULL,
//!     PRIMARY KEY (merchant_id, handler_id)
//! );
//! CREATE TABLE assignment_queue (
//!     handler_id TEXT PRIMARY KEY REFERENCES handlers(id),
//!     last_assigned_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use crate::domain::entities::{
    AggregatorPartner, BalancePair, Balances, FreezeRecord, Handler, MerchantLink, Operation,
};
use crate::domain::value_objects::{
    BalanceCurrency, CounterpartyId, Direction, HandlerId, MerchantId, OperationId,
    OperationStatus, Timestamp,
};
use crate::infrastructure::persistence::traits::{
    AssignmentQueue, HandlerRepository, LedgerStore, LedgerTransaction, MerchantLinkRepository,
    OperationHistory, OperationRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

const OPERATION_COLUMNS: &str = "id, merchant_id, direction, amount, rate, category, \
     counterparty_id, handler_id, status, previous_handlers, settlement_amount, external_ref, \
     version, created_at, expires_at, updated_at";

const HANDLER_COLUMNS: &str = "id, kind, body, priority, daily_volume_used, volume_date, \
     op_available, op_frozen, st_available, st_frozen";

fn query_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::connection(e.to_string())
        }
        other => RepositoryError::query(other.to_string()),
    }
}

fn version_to_db(version: u64) -> RepositoryResult<i64> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::serialization(format!("version {version} out of range")))
}

/// PostgreSQL implementation of the persistence ports.
///
/// # Examples
///
/// ```ignore
/// use sqlx::PgPool;
/// use deal_router::infrastructure::persistence::postgres::PostgresStore;
///
/// let pool = PgPool::connect("postgres://...").await?;
/// let store = PostgresStore::new(pool);
/// ```
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OperationRepository for PostgresStore {
    async fn insert(&self, operation: &Operation) -> RepositoryResult<()> {
        let row = OperationRow::from_operation(operation)?;
        let result = sqlx::query(
            r#"
            INSERT INTO operations (
                id, merchant_id, direction, amount, rate, category,
                counterparty_id, handler_id, status, previous_handlers,
                settlement_amount, external_ref, version,
                created_at, expires_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(&row.merchant_id)
        .bind(&row.direction)
        .bind(row.amount)
        .bind(row.rate)
        .bind(&row.category)
        .bind(&row.counterparty_id)
        .bind(&row.handler_id)
        .bind(&row.status)
        .bind(&row.previous_handlers)
        .bind(row.settlement_amount)
        .bind(&row.external_ref)
        .bind(row.version)
        .bind(row.created_at)
        .bind(row.expires_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::duplicate(
                "Operation",
                operation.id().to_string(),
            ));
        }
        Ok(())
    }

    async fn get(&self, id: OperationId) -> RepositoryResult<Option<Operation>> {
        let row: Option<OperationRow> =
            sqlx::query_as(&format!("SELECT {OPERATION_COLUMNS} FROM operations WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;
        row.map(OperationRow::try_into_operation).transpose()
    }

    async fn update(&self, operation: &Operation, expected_version: u64) -> RepositoryResult<()> {
        let row = OperationRow::from_operation(operation)?;
        let result = sqlx::query(
            r#"
            UPDATE operations SET
                handler_id = $2, status = $3, previous_handlers = $4,
                settlement_amount = $5, external_ref = $6, version = $7, updated_at = $8
            WHERE id = $1 AND version = $9
            "#,
        )
        .bind(row.id)
        .bind(&row.handler_id)
        .bind(&row.status)
        .bind(&row.previous_handlers)
        .bind(row.settlement_amount)
        .bind(&row.external_ref)
        .bind(row.version)
        .bind(row.updated_at)
        .bind(version_to_db(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return match OperationRepository::get(self, operation.id()).await? {
                Some(current) => Err(RepositoryError::version_conflict(
                    "Operation",
                    operation.id().to_string(),
                    expected_version,
                    current.version(),
                )),
                None => Err(RepositoryError::not_found(
                    "Operation",
                    operation.id().to_string(),
                )),
            };
        }
        Ok(())
    }

    async fn find_assignable(&self, now: Timestamp) -> RepositoryResult<Vec<Operation>> {
        let rows: Vec<OperationRow> = sqlx::query_as(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations \
             WHERE status = 'CREATED' AND handler_id IS NULL AND expires_at > $1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.into_iter()
            .map(OperationRow::try_into_operation)
            .collect()
    }

    async fn find_expired(&self, now: Timestamp) -> RepositoryResult<Vec<Operation>> {
        let rows: Vec<OperationRow> = sqlx::query_as(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations \
             WHERE status = 'CREATED' AND expires_at <= $1 \
             ORDER BY expires_at ASC"
        ))
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.into_iter()
            .map(OperationRow::try_into_operation)
            .collect()
    }

    async fn count_active_for(&self, handler_id: &HandlerId) -> RepositoryResult<u32> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM operations
            WHERE handler_id = $1
              AND status IN ('CREATED', 'ACTIVE', 'CHECKING', 'DISPUTE')
            "#,
        )
        .bind(handler_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl HandlerRepository for PostgresStore {
    async fn save(&self, handler: &Handler) -> RepositoryResult<()> {
        let body = serde_json::to_value(handler)
            .map_err(|e| RepositoryError::serialization(e.to_string()))?;
        let (priority, volume_used, volume_date) = match handler.as_partner() {
            Some(p) => (
                i32::try_from(p.priority()).unwrap_or(i32::MAX),
                p.daily_volume_used(),
                p.volume_date(),
            ),
            None => (0, Decimal::ZERO, None),
        };
        let balances = handler.balances();

        sqlx::query(
            r#"
            INSERT INTO handlers (
                id, kind, body, priority, daily_volume_used, volume_date,
                op_available, op_frozen, st_available, st_frozen
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                kind = EXCLUDED.kind,
                body = EXCLUDED.body,
                priority = EXCLUDED.priority,
                daily_volume_used = EXCLUDED.daily_volume_used,
                volume_date = EXCLUDED.volume_date,
                op_available = EXCLUDED.op_available,
                op_frozen = EXCLUDED.op_frozen,
                st_available = EXCLUDED.st_available,
                st_frozen = EXCLUDED.st_frozen
            "#,
        )
        .bind(handler.id().as_str())
        .bind(handler.kind().to_string())
        .bind(body)
        .bind(priority)
        .bind(volume_used)
        .bind(volume_date)
        .bind(balances.operation.available)
        .bind(balances.operation.frozen)
        .bind(balances.settlement.available)
        .bind(balances.settlement.frozen)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn get(&self, id: &HandlerId) -> RepositoryResult<Option<Handler>> {
        let row: Option<HandlerRow> =
            sqlx::query_as(&format!("SELECT {HANDLER_COLUMNS} FROM handlers WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;
        row.map(HandlerRow::try_into_handler).transpose()
    }

    async fn find_traders(&self) -> RepositoryResult<Vec<Handler>> {
        let rows: Vec<HandlerRow> = sqlx::query_as(&format!(
            "SELECT {HANDLER_COLUMNS} FROM handlers WHERE kind = 'INTERNAL' ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.into_iter().map(HandlerRow::try_into_handler).collect()
    }

    async fn find_partners(&self) -> RepositoryResult<Vec<AggregatorPartner>> {
        let rows: Vec<HandlerRow> = sqlx::query_as(&format!(
            "SELECT {HANDLER_COLUMNS} FROM handlers WHERE kind = 'PARTNER' \
             ORDER BY priority ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.into_iter()
            .map(|row| {
                let handler = row.try_into_handler()?;
                match handler {
                    Handler::Partner(partner) => Ok(partner),
                    Handler::Internal(t) => Err(RepositoryError::serialization(format!(
                        "handler {} stored as PARTNER holds a trader body",
                        t.id()
                    ))),
                }
            })
            .collect()
    }

    async fn update_priority(&self, id: &HandlerId, priority: u32) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE handlers SET priority = $2 WHERE id = $1 AND kind = 'PARTNER'",
        )
        .bind(id.as_str())
        .bind(i32::try_from(priority).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("AggregatorPartner", id.to_string()));
        }
        Ok(())
    }

    async fn add_partner_volume(
        &self,
        id: &HandlerId,
        amount: Decimal,
        at: Timestamp,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE handlers SET
                daily_volume_used = CASE
                    WHEN volume_date = $3 THEN daily_volume_used + $2
                    ELSE $2
                END,
                volume_date = $3
            WHERE id = $1 AND kind = 'PARTNER'
            "#,
        )
        .bind(id.as_str())
        .bind(amount)
        .bind(at.date())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("AggregatorPartner", id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MerchantLinkRepository for PostgresStore {
    async fn save(&self, link: &MerchantLink) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO merchant_links (
                merchant_id, handler_id, enabled, deals_enabled, payouts_enabled
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (merchant_id, handler_id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                deals_enabled = EXCLUDED.deals_enabled,
                payouts_enabled = EXCLUDED.payouts_enabled
            "#,
        )
        .bind(link.merchant_id.as_str())
        .bind(link.handler_id.as_str())
        .bind(link.enabled)
        .bind(link.deals_enabled)
        .bind(link.payouts_enabled)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn get(
        &self,
        merchant_id: &MerchantId,
        handler_id: &HandlerId,
    ) -> RepositoryResult<Option<MerchantLink>> {
        let row: Option<(bool, bool, bool)> = sqlx::query_as(
            r#"
            SELECT enabled, deals_enabled, payouts_enabled FROM merchant_links
            WHERE merchant_id = $1 AND handler_id = $2
            "#,
        )
        .bind(merchant_id.as_str())
        .bind(handler_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.map(|(enabled, deals_enabled, payouts_enabled)| MerchantLink {
            merchant_id: merchant_id.clone(),
            handler_id: handler_id.clone(),
            enabled,
            deals_enabled,
            payouts_enabled,
        }))
    }
}

#[async_trait]
impl OperationHistory for PostgresStore {
    async fn count_completed(
        &self,
        merchant_id: &MerchantId,
        counterparty_id: &CounterpartyId,
        direction: Direction,
    ) -> RepositoryResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM operations
            WHERE merchant_id = $1 AND counterparty_id = $2
              AND direction = $3 AND status = 'COMPLETED'
            "#,
        )
        .bind(merchant_id.as_str())
        .bind(counterparty_id.as_str())
        .bind(direction.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(count.max(0) as u64)
    }

    async fn has_served(
        &self,
        handler_id: &HandlerId,
        counterparty_id: &CounterpartyId,
    ) -> RepositoryResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM operations
                WHERE handler_id = $1 AND counterparty_id = $2
                  AND status IN ('CREATED', 'ACTIVE', 'CHECKING', 'DISPUTE', 'COMPLETED')
            )
            "#,
        )
        .bind(handler_id.as_str())
        .bind(counterparty_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(exists)
    }

    async fn distinct_counterparties(&self, handler_id: &HandlerId) -> RepositoryResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT counterparty_id) FROM operations
            WHERE handler_id = $1 AND counterparty_id IS NOT NULL
              AND status IN ('CREATED', 'ACTIVE', 'CHECKING', 'DISPUTE', 'COMPLETED')
            "#,
        )
        .bind(handler_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl AssignmentQueue for PostgresStore {
    async fn last_assigned(&self) -> RepositoryResult<HashMap<HandlerId, Timestamp>> {
        let rows: Vec<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT handler_id, last_assigned_at FROM assignment_queue")
                .fetch_all(&self.pool)
                .await
                .map_err(query_error)?;
        Ok(rows
            .into_iter()
            .map(|(id, at)| (HandlerId::new(id), Timestamp::from(at)))
            .collect())
    }

    async fn record_assignment(
        &self,
        handler_id: &HandlerId,
        at: Timestamp,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO assignment_queue (handler_id, last_assigned_at) VALUES ($1, $2)
            ON CONFLICT (handler_id) DO UPDATE SET last_assigned_at = EXCLUDED.last_assigned_at
            "#,
        )
        .bind(handler_id.as_str())
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn begin(&self, handler_id: &HandlerId) -> RepositoryResult<Box<dyn LedgerTransaction>> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        let row: Option<HandlerRow> = sqlx::query_as(&format!(
            "SELECT {HANDLER_COLUMNS} FROM handlers WHERE id = $1 FOR UPDATE"
        ))
        .bind(handler_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;
        let handler = row
            .ok_or_else(|| RepositoryError::not_found("Handler", handler_id.to_string()))?
            .try_into_handler()?;
        Ok(Box::new(PostgresLedgerTransaction { tx, handler }))
    }
}

/// Ledger transaction holding the handler row lock until commit.
struct PostgresLedgerTransaction {
    tx: Transaction<'static, Postgres>,
    handler: Handler,
}

#[async_trait]
impl LedgerTransaction for PostgresLedgerTransaction {
    fn handler(&self) -> &Handler {
        &self.handler
    }

    async fn save_balances(&mut self, balances: Balances) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE handlers
            SET op_available = $2, op_frozen = $3, st_available = $4, st_frozen = $5
            WHERE id = $1
            "#,
        )
        .bind(self.handler.id().as_str())
        .bind(balances.operation.available)
        .bind(balances.operation.frozen)
        .bind(balances.settlement.available)
        .bind(balances.settlement.frozen)
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;
        self.handler.set_balances(balances);
        Ok(())
    }

    async fn load_operation(&mut self, id: OperationId) -> RepositoryResult<Operation> {
        let row: Option<OperationRow> =
            sqlx::query_as(&format!("SELECT {OPERATION_COLUMNS} FROM operations WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(query_error)?;
        row.ok_or_else(|| RepositoryError::not_found("Operation", id.to_string()))?
            .try_into_operation()
    }

    async fn save_operation(
        &mut self,
        operation: &Operation,
        expected_version: u64,
    ) -> RepositoryResult<()> {
        let row = OperationRow::from_operation(operation)?;
        let result = sqlx::query(
            r#"
            UPDATE operations SET
                handler_id = $2, status = $3, previous_handlers = $4,
                settlement_amount = $5, external_ref = $6, version = $7, updated_at = $8
            WHERE id = $1 AND version = $9
            "#,
        )
        .bind(row.id)
        .bind(&row.handler_id)
        .bind(&row.status)
        .bind(&row.previous_handlers)
        .bind(row.settlement_amount)
        .bind(&row.external_ref)
        .bind(row.version)
        .bind(row.updated_at)
        .bind(version_to_db(expected_version)?)
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            let actual: Option<(i64,)> = sqlx::query_as("SELECT version FROM operations WHERE id = $1")
                .bind(row.id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(query_error)?;
            return match actual {
                Some((actual,)) => Err(RepositoryError::version_conflict(
                    "Operation",
                    operation.id().to_string(),
                    expected_version,
                    actual.max(0) as u64,
                )),
                None => Err(RepositoryError::not_found(
                    "Operation",
                    operation.id().to_string(),
                )),
            };
        }
        Ok(())
    }

    async fn load_freeze(
        &mut self,
        operation_id: OperationId,
    ) -> RepositoryResult<Option<FreezeRecord>> {
        let row: Option<FreezeRow> = sqlx::query_as(
            r#"
            SELECT operation_id, handler_id, currency, frozen_amount,
                   debited_amount, settlement_amount, created_at
            FROM freeze_records WHERE operation_id = $1
            "#,
        )
        .bind(operation_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_error)?;
        row.map(FreezeRow::try_into_record).transpose()
    }

    async fn insert_freeze(&mut self, record: &FreezeRecord) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO freeze_records (
                operation_id, handler_id, currency, frozen_amount,
                debited_amount, settlement_amount, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (operation_id) DO NOTHING
            "#,
        )
        .bind(record.operation_id().get())
        .bind(record.handler_id().as_str())
        .bind(record.currency().to_string())
        .bind(record.frozen_amount())
        .bind(record.debited_amount())
        .bind(record.settlement_amount())
        .bind(record.created_at().as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::duplicate(
                "FreezeRecord",
                record.operation_id().to_string(),
            ));
        }
        Ok(())
    }

    async fn delete_freeze(&mut self, operation_id: OperationId) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM freeze_records WHERE operation_id = $1")
            .bind(operation_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.commit().await.map_err(query_error)
    }
}

/// Row type for operation queries.
#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    id: Uuid,
    merchant_id: String,
    direction: String,
    amount: Decimal,
    rate: Decimal,
    category: Option<String>,
    counterparty_id: Option<String>,
    handler_id: Option<String>,
    status: String,
    previous_handlers: Vec<String>,
    settlement_amount: Option<Decimal>,
    external_ref: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OperationRow {
    fn from_operation(op: &Operation) -> RepositoryResult<Self> {
        Ok(Self {
            id: op.id().get(),
            merchant_id: op.merchant_id().to_string(),
            direction: op.direction().to_string(),
            amount: op.amount(),
            rate: op.rate(),
            category: op.category().map(str::to_string),
            counterparty_id: op.counterparty_id().map(ToString::to_string),
            handler_id: op.handler_id().map(ToString::to_string),
            status: op.status().to_string(),
            previous_handlers: op.previous_handlers().iter().map(ToString::to_string).collect(),
            settlement_amount: op.settlement_amount(),
            external_ref: op.external_ref().map(str::to_string),
            version: version_to_db(op.version())?,
            created_at: *op.created_at().as_datetime(),
            expires_at: *op.expires_at().as_datetime(),
            updated_at: *op.updated_at().as_datetime(),
        })
    }

    fn try_into_operation(self) -> RepositoryResult<Operation> {
        let direction: Direction = self
            .direction
            .parse()
            .map_err(|e| RepositoryError::serialization(format!("invalid direction: {e}")))?;
        let status: OperationStatus = self
            .status
            .parse()
            .map_err(|e| RepositoryError::serialization(format!("invalid status: {e}")))?;

        Ok(Operation::from_parts(
            OperationId::new(self.id),
            MerchantId::new(self.merchant_id),
            direction,
            self.amount,
            self.rate,
            self.category,
            self.counterparty_id.map(CounterpartyId::new),
            self.handler_id.map(HandlerId::new),
            status,
            self.previous_handlers.into_iter().map(HandlerId::new).collect(),
            self.settlement_amount,
            self.external_ref,
            self.version.max(0) as u64,
            Timestamp::from(self.created_at),
            Timestamp::from(self.expires_at),
            Timestamp::from(self.updated_at),
        ))
    }
}

/// Row type for handler queries.
#[derive(Debug, sqlx::FromRow)]
struct HandlerRow {
    id: String,
    kind: String,
    body: serde_json::Value,
    priority: i32,
    daily_volume_used: Decimal,
    volume_date: Option<NaiveDate>,
    op_available: Decimal,
    op_frozen: Decimal,
    st_available: Decimal,
    st_frozen: Decimal,
}

impl HandlerRow {
    /// Columns are authoritative over the JSON body for balances, priority
    /// and daily usage.
    fn try_into_handler(self) -> RepositoryResult<Handler> {
        let mut handler: Handler = serde_json::from_value(self.body).map_err(|e| {
            RepositoryError::serialization(format!("handler {} ({}): {e}", self.id, self.kind))
        })?;
        handler.set_balances(Balances {
            operation: BalancePair::new(self.op_available, self.op_frozen),
            settlement: BalancePair::new(self.st_available, self.st_frozen),
        });
        if let Some(partner) = handler.as_partner_mut() {
            partner.set_priority(u32::try_from(self.priority).unwrap_or(0));
            partner.set_daily_volume(self.daily_volume_used, self.volume_date);
        }
        Ok(handler)
    }
}

/// Row type for freeze record queries.
#[derive(Debug, sqlx::FromRow)]
struct FreezeRow {
    operation_id: Uuid,
    handler_id: String,
    currency: String,
    frozen_amount: Decimal,
    debited_amount: Decimal,
    settlement_amount: Decimal,
    created_at: DateTime<Utc>,
}

impl FreezeRow {
    fn try_into_record(self) -> RepositoryResult<FreezeRecord> {
        let currency: BalanceCurrency = self
            .currency
            .parse()
            .map_err(|e| RepositoryError::serialization(format!("invalid currency: {e}")))?;
        Ok(FreezeRecord::from_parts(
            OperationId::new(self.operation_id),
            HandlerId::new(self.handler_id),
            currency,
            self.frozen_amount,
            self.debited_amount,
            self.settlement_amount,
            Timestamp::from(self.created_at),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::entities::{AggregatorPartner, OperationBuilder};

    #[test]
    fn operation_row_round_trip() {
        let mut op = OperationBuilder::new(
            MerchantId::new("m"),
            Direction::Out,
            Decimal::new(500, 0),
            Decimal::new(92, 0),
            Timestamp::now().add_secs(60),
        )
        .counterparty(CounterpartyId::new("c"))
        .build()
        .unwrap();
        op.assign(HandlerId::new("h"), Decimal::new(5, 0)).unwrap();

        let row = OperationRow::from_operation(&op).unwrap();
        assert_eq!(row.status, "CREATED");
        assert_eq!(row.direction, "OUT");
        let back = row.try_into_operation().unwrap();
        assert_eq!(back.handler_id(), op.handler_id());
        assert_eq!(back.version(), op.version());
    }

    #[test]
    fn handler_row_columns_override_body() {
        let partner = AggregatorPartner::new(HandlerId::new("p"), "http://p", 9);
        let row = HandlerRow {
            id: "p".to_string(),
            kind: "PARTNER".to_string(),
            body: serde_json::to_value(Handler::from(partner)).unwrap(),
            priority: 2,
            daily_volume_used: Decimal::new(40, 0),
            volume_date: Some(Timestamp::now().date()),
            op_available: Decimal::ZERO,
            op_frozen: Decimal::ZERO,
            st_available: Decimal::new(300, 0),
            st_frozen: Decimal::new(12, 0),
        };
        let handler = row.try_into_handler().unwrap();
        let partner = handler.as_partner().unwrap();
        assert_eq!(partner.priority(), 2);
        assert_eq!(partner.daily_volume_used(), Decimal::new(40, 0));
        assert_eq!(partner.volume_used_on(Timestamp::now().date()), Decimal::new(40, 0));
        assert_eq!(handler.balances().settlement.frozen, Decimal::new(12, 0));
    }

    #[test]
    fn bad_body_is_serialization_error() {
        let row = HandlerRow {
            id: "t".to_string(),
            kind: "INTERNAL".to_string(),
            body: serde_json::json!({"kind": "nope"}),
            priority: 0,
            daily_volume_used: Decimal::ZERO,
            volume_date: None,
            op_available: Decimal::ZERO,
            op_frozen: Decimal::ZERO,
            st_available: Decimal::ZERO,
            st_frozen: Decimal::ZERO,
        };
        assert!(matches!(
            row.try_into_handler(),
            Err(RepositoryError::Serialization(_))
        ));
    }
}
