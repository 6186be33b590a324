//! Snapshot persistence and the per-day snapshot calculator

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{BeginningBalance, OpeningSource, StockKey, StockSnapshot};

use crate::error::{AppError, AppResult};
use crate::services::aggregator::DailyAggregator;
use crate::services::registry::CompanyDirectory;

/// Durable store of per (company, item, date) closing balances.
///
/// Writers use atomic upsert keyed by the natural key, so concurrent
/// recomputation of the same key converges instead of corrupting partial
/// state. Rows are never deleted.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Snapshot for the exact date, if one has been calculated.
    async fn get(&self, key: &StockKey, date: NaiveDate) -> AppResult<Option<StockSnapshot>>;

    /// Nearest snapshot strictly before `date` (carry-forward lookup).
    async fn latest_before(&self, key: &StockKey, date: NaiveDate)
        -> AppResult<Option<StockSnapshot>>;

    /// Idempotent insert-or-replace keyed by (company, item_type, item_code, date).
    async fn upsert(&self, snapshot: &StockSnapshot) -> AppResult<()>;
}

/// Read access to the externally-owned beginning-balance anchors.
#[async_trait]
pub trait BeginningBalanceSource: Send + Sync {
    /// The one active anchor row for an item, or `None`.
    ///
    /// Fails with [`AppError::DataInconsistency`] when more than one active
    /// row matches: the key is unique by construction, so duplicates mean the
    /// reference data cannot be trusted.
    async fn lookup(&self, key: &StockKey) -> AppResult<Option<BeginningBalance>>;
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    company_id: Uuid,
    item_type: String,
    item_code: String,
    item_name: String,
    uom: String,
    snapshot_date: NaiveDate,
    opening_balance: Decimal,
    incoming_qty: Decimal,
    outgoing_qty: Decimal,
    material_usage_qty: Decimal,
    production_qty: Decimal,
    adjustment_qty: Decimal,
    scrap_in_qty: Decimal,
    scrap_out_qty: Decimal,
    closing_balance: Decimal,
    calculation_method: String,
}

impl From<SnapshotRow> for StockSnapshot {
    fn from(r: SnapshotRow) -> Self {
        StockSnapshot {
            company_id: r.company_id,
            item_type: r.item_type,
            item_code: r.item_code,
            item_name: r.item_name,
            uom: r.uom,
            snapshot_date: r.snapshot_date,
            opening_balance: r.opening_balance,
            incoming_qty: r.incoming_qty,
            outgoing_qty: r.outgoing_qty,
            material_usage_qty: r.material_usage_qty,
            production_qty: r.production_qty,
            adjustment_qty: r.adjustment_qty,
            scrap_in_qty: r.scrap_in_qty,
            scrap_out_qty: r.scrap_out_qty,
            closing_balance: r.closing_balance,
            calculation_method: r.calculation_method,
        }
    }
}

const SNAPSHOT_COLUMNS: &str = "company_id, item_type, item_code, item_name, uom, snapshot_date, \
     opening_balance, incoming_qty, outgoing_qty, material_usage_qty, production_qty, \
     adjustment_qty, scrap_in_qty, scrap_out_qty, closing_balance, calculation_method";

/// Postgres-backed snapshot store.
#[derive(Clone)]
pub struct PgSnapshotStore {
    db: PgPool,
}

impl PgSnapshotStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn get(&self, key: &StockKey, date: NaiveDate) -> AppResult<Option<StockSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM stock_snapshots \
             WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND snapshot_date = $4"
        ))
        .bind(key.company_id)
        .bind(&key.item_type)
        .bind(&key.item_code)
        .bind(date)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(StockSnapshot::from))
    }

    async fn latest_before(
        &self,
        key: &StockKey,
        date: NaiveDate,
    ) -> AppResult<Option<StockSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM stock_snapshots \
             WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND snapshot_date < $4 \
             ORDER BY snapshot_date DESC LIMIT 1"
        ))
        .bind(key.company_id)
        .bind(&key.item_type)
        .bind(&key.item_code)
        .bind(date)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(StockSnapshot::from))
    }

    async fn upsert(&self, s: &StockSnapshot) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_snapshots (
                company_id, item_type, item_code, item_name, uom, snapshot_date,
                opening_balance, incoming_qty, outgoing_qty, material_usage_qty,
                production_qty, adjustment_qty, scrap_in_qty, scrap_out_qty,
                closing_balance, calculation_method
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (company_id, item_type, item_code, snapshot_date)
            DO UPDATE SET
                item_name = EXCLUDED.item_name,
                uom = EXCLUDED.uom,
                opening_balance = EXCLUDED.opening_balance,
                incoming_qty = EXCLUDED.incoming_qty,
                outgoing_qty = EXCLUDED.outgoing_qty,
                material_usage_qty = EXCLUDED.material_usage_qty,
                production_qty = EXCLUDED.production_qty,
                adjustment_qty = EXCLUDED.adjustment_qty,
                scrap_in_qty = EXCLUDED.scrap_in_qty,
                scrap_out_qty = EXCLUDED.scrap_out_qty,
                closing_balance = EXCLUDED.closing_balance,
                calculation_method = EXCLUDED.calculation_method,
                updated_at = NOW()
            "#,
        )
        .bind(s.company_id)
        .bind(&s.item_type)
        .bind(&s.item_code)
        .bind(&s.item_name)
        .bind(&s.uom)
        .bind(s.snapshot_date)
        .bind(s.opening_balance)
        .bind(s.incoming_qty)
        .bind(s.outgoing_qty)
        .bind(s.material_usage_qty)
        .bind(s.production_qty)
        .bind(s.adjustment_qty)
        .bind(s.scrap_in_qty)
        .bind(s.scrap_out_qty)
        .bind(s.closing_balance)
        .bind(&s.calculation_method)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

/// Postgres-backed beginning-balance lookup.
#[derive(Clone)]
pub struct PgBeginningBalances {
    db: PgPool,
}

impl PgBeginningBalances {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct BeginningRow {
    company_id: Uuid,
    item_type: String,
    item_code: String,
    item_name: String,
    uom: String,
    qty: Decimal,
    balance_date: NaiveDate,
}

#[async_trait]
impl BeginningBalanceSource for PgBeginningBalances {
    async fn lookup(&self, key: &StockKey) -> AppResult<Option<BeginningBalance>> {
        let rows = sqlx::query_as::<_, BeginningRow>(
            "SELECT company_id, item_type, item_code, item_name, uom, qty, balance_date \
             FROM beginning_balances \
             WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND is_active = true",
        )
        .bind(key.company_id)
        .bind(&key.item_type)
        .bind(&key.item_code)
        .fetch_all(&self.db)
        .await?;

        if rows.len() > 1 {
            return Err(AppError::DataInconsistency(format!(
                "{} active beginning balances for {}",
                rows.len(),
                key
            )));
        }

        Ok(rows.into_iter().next().map(|r| BeginningBalance {
            company_id: r.company_id,
            item_type: r.item_type,
            item_code: r.item_code,
            item_name: r.item_name,
            uom: r.uom,
            qty: r.qty,
            balance_date: r.balance_date,
        }))
    }
}

/// Result of calculating one day's snapshot.
#[derive(Debug, Clone)]
pub struct DailyCalculation {
    pub snapshot: StockSnapshot,
    pub opening_source: OpeningSource,
    pub duration_ms: u64,
}

/// Computes and upserts one day's snapshot for one item.
///
/// Idempotent: unchanged ledger state on a repeated invocation produces an
/// identical snapshot and an equivalent write.
#[derive(Clone)]
pub struct SnapshotCalculator {
    store: Arc<dyn SnapshotStore>,
    beginnings: Arc<dyn BeginningBalanceSource>,
    aggregator: DailyAggregator,
    directory: Arc<dyn CompanyDirectory>,
}

impl SnapshotCalculator {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        beginnings: Arc<dyn BeginningBalanceSource>,
        aggregator: DailyAggregator,
        directory: Arc<dyn CompanyDirectory>,
    ) -> Self {
        Self {
            store,
            beginnings,
            aggregator,
            directory,
        }
    }

    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        Arc::clone(&self.store)
    }

    /// Calculate the snapshot for `target_date` and upsert it.
    pub async fn calculate(
        &self,
        key: &StockKey,
        target_date: NaiveDate,
    ) -> AppResult<DailyCalculation> {
        let started = Instant::now();

        // Opening balance: nearest prior snapshot (normally yesterday's; an
        // earlier one carries forward across gap days with no snapshot), then
        // the beginning-balance anchor, then zero.
        let prior = self.store.latest_before(key, target_date).await?;
        let beginning = match &prior {
            Some(_) => None,
            None => self.beginnings.lookup(key).await?,
        };

        let (opening, opening_source) = match (&prior, &beginning) {
            (Some(p), _) => (p.closing_balance, OpeningSource::PriorSnapshot),
            (None, Some(b)) if b.balance_date <= target_date => {
                (b.qty, OpeningSource::BeginningBalance)
            }
            _ => (Decimal::ZERO, OpeningSource::ZeroDefault),
        };

        let movements = self.aggregator.day_totals(key, target_date, None).await?;
        let closing = key.category().closing_balance(opening, &movements);

        let (item_name, uom) = self.resolve_item_labels(key, &prior, &beginning).await?;

        let snapshot = StockSnapshot {
            company_id: key.company_id,
            item_type: key.item_type.clone(),
            item_code: key.item_code.clone(),
            item_name,
            uom,
            snapshot_date: target_date,
            opening_balance: opening,
            incoming_qty: movements.incoming,
            outgoing_qty: movements.outgoing,
            material_usage_qty: movements.material_usage,
            production_qty: movements.production,
            adjustment_qty: movements.adjustment,
            scrap_in_qty: movements.scrap_in,
            scrap_out_qty: movements.scrap_out,
            closing_balance: closing,
            calculation_method: opening_source.as_str().to_string(),
        };

        self.store.upsert(&snapshot).await?;

        Ok(DailyCalculation {
            snapshot,
            opening_source,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn resolve_item_labels(
        &self,
        key: &StockKey,
        prior: &Option<StockSnapshot>,
        beginning: &Option<BeginningBalance>,
    ) -> AppResult<(String, String)> {
        if let Some(p) = prior {
            return Ok((p.item_name.clone(), p.uom.clone()));
        }
        if let Some(b) = beginning {
            return Ok((b.item_name.clone(), b.uom.clone()));
        }
        if let Some(info) = self.directory.item_info(key).await? {
            return Ok((info.item_name, info.uom));
        }
        Ok((key.item_code.clone(), "EA".to_string()))
    }
}
