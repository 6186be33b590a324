//! Daily movement aggregation over the six transaction ledgers
//!
//! The ledgers themselves (incoming, outgoing, material-usage, production,
//! adjustment, scrap) are owned by the transaction modules; this engine only
//! consumes a signed day-total read API from each. The read API is where
//! soft-deleted rows are excluded and reversal/adjustment sign rules are
//! applied, so everything downstream works with already-signed quantities.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use shared::{MovementTotals, StockKey};

use crate::error::{AppError, AppResult};

/// The seven movement totals a day of ledger activity can contribute.
/// Scrap is one ledger but contributes two signed totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Incoming,
    Outgoing,
    MaterialUsage,
    Production,
    Adjustment,
    ScrapIn,
    ScrapOut,
}

/// Read API over one movement ledger.
///
/// `exclude_ref` omits a single transaction by id, used when re-validating an
/// edit so the in-flight transaction is not double-counted.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn day_total(
        &self,
        kind: LedgerKind,
        key: &StockKey,
        date: NaiveDate,
        exclude_ref: Option<Uuid>,
    ) -> AppResult<Decimal>;
}

/// Postgres-backed ledger reader.
pub struct PgLedgerReader {
    db: PgPool,
}

impl PgLedgerReader {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // Reversal rows flip sign; soft-deleted rows never count.
    fn query_for(kind: LedgerKind) -> &'static str {
        match kind {
            LedgerKind::Incoming => {
                "SELECT COALESCE(SUM(CASE WHEN is_reversal THEN -quantity ELSE quantity END), 0) \
                 FROM incoming_transactions \
                 WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND txn_date = $4 \
                   AND deleted_at IS NULL AND ($5::uuid IS NULL OR id <> $5)"
            }
            LedgerKind::Outgoing => {
                "SELECT COALESCE(SUM(CASE WHEN is_reversal THEN -quantity ELSE quantity END), 0) \
                 FROM outgoing_transactions \
                 WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND txn_date = $4 \
                   AND deleted_at IS NULL AND ($5::uuid IS NULL OR id <> $5)"
            }
            LedgerKind::MaterialUsage => {
                "SELECT COALESCE(SUM(CASE WHEN is_reversal THEN -quantity ELSE quantity END), 0) \
                 FROM material_usage_transactions \
                 WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND txn_date = $4 \
                   AND deleted_at IS NULL AND ($5::uuid IS NULL OR id <> $5)"
            }
            LedgerKind::Production => {
                "SELECT COALESCE(SUM(CASE WHEN is_reversal THEN -quantity ELSE quantity END), 0) \
                 FROM production_transactions \
                 WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND txn_date = $4 \
                   AND deleted_at IS NULL AND ($5::uuid IS NULL OR id <> $5)"
            }
            // Gains add, losses subtract; the formula receives one signed total.
            LedgerKind::Adjustment => {
                "SELECT COALESCE(SUM(CASE WHEN adjustment_type = 'gain' THEN quantity ELSE -quantity END), 0) \
                 FROM adjustment_transactions \
                 WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND txn_date = $4 \
                   AND deleted_at IS NULL AND ($5::uuid IS NULL OR id <> $5)"
            }
            LedgerKind::ScrapIn => {
                "SELECT COALESCE(SUM(quantity), 0) \
                 FROM scrap_transactions \
                 WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND txn_date = $4 \
                   AND direction = 'in' AND deleted_at IS NULL AND ($5::uuid IS NULL OR id <> $5)"
            }
            LedgerKind::ScrapOut => {
                "SELECT COALESCE(SUM(quantity), 0) \
                 FROM scrap_transactions \
                 WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND txn_date = $4 \
                   AND direction = 'out' AND deleted_at IS NULL AND ($5::uuid IS NULL OR id <> $5)"
            }
        }
    }
}

#[async_trait]
impl LedgerReader for PgLedgerReader {
    async fn day_total(
        &self,
        kind: LedgerKind,
        key: &StockKey,
        date: NaiveDate,
        exclude_ref: Option<Uuid>,
    ) -> AppResult<Decimal> {
        sqlx::query_scalar::<_, Decimal>(Self::query_for(kind))
            .bind(key.company_id)
            .bind(&key.item_type)
            .bind(&key.item_code)
            .bind(date)
            .bind(exclude_ref)
            .fetch_one(&self.db)
            .await
            .map_err(|e| AppError::LedgerQuery(format!("{:?} ledger for {}: {}", kind, key, e)))
    }
}

/// Aggregates the signed day totals of every ledger into one
/// [`MovementTotals`], decoupled from how each ledger is stored.
#[derive(Clone)]
pub struct DailyAggregator {
    reader: Arc<dyn LedgerReader>,
}

impl DailyAggregator {
    pub fn new(reader: Arc<dyn LedgerReader>) -> Self {
        Self { reader }
    }

    /// Movement totals for one item on one day.
    pub async fn day_totals(
        &self,
        key: &StockKey,
        date: NaiveDate,
        exclude_ref: Option<Uuid>,
    ) -> AppResult<MovementTotals> {
        Ok(MovementTotals {
            incoming: self
                .reader
                .day_total(LedgerKind::Incoming, key, date, exclude_ref)
                .await?,
            outgoing: self
                .reader
                .day_total(LedgerKind::Outgoing, key, date, exclude_ref)
                .await?,
            material_usage: self
                .reader
                .day_total(LedgerKind::MaterialUsage, key, date, exclude_ref)
                .await?,
            production: self
                .reader
                .day_total(LedgerKind::Production, key, date, exclude_ref)
                .await?,
            adjustment: self
                .reader
                .day_total(LedgerKind::Adjustment, key, date, exclude_ref)
                .await?,
            scrap_in: self
                .reader
                .day_total(LedgerKind::ScrapIn, key, date, exclude_ref)
                .await?,
            scrap_out: self
                .reader
                .day_total(LedgerKind::ScrapOut, key, date, exclude_ref)
                .await?,
        })
    }
}
