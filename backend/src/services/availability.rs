//! Real-time stock-availability admission check
//!
//! A pure read path combining persisted snapshots with live same-day ledger
//! deltas. Called synchronously by transaction-admission flows before commit:
//! on storage failure it fails closed (the error propagates and the
//! transaction is rejected), never silently approves.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{
    balance_epsilon, AvailabilityLine, AvailabilityReport, ItemAvailability, StockKey,
    StockSnapshot,
};

use crate::error::{AppError, AppResult};
use crate::services::aggregator::DailyAggregator;
use crate::services::snapshot::{BeginningBalanceSource, SnapshotStore};

/// Read-only availability and balance resolution.
#[derive(Clone)]
pub struct AvailabilityChecker {
    snapshots: Arc<dyn SnapshotStore>,
    beginnings: Arc<dyn BeginningBalanceSource>,
    aggregator: DailyAggregator,
}

impl AvailabilityChecker {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        beginnings: Arc<dyn BeginningBalanceSource>,
        aggregator: DailyAggregator,
    ) -> Self {
        Self {
            snapshots,
            beginnings,
            aggregator,
        }
    }

    /// All-or-nothing batch check: the whole transaction is admissible only
    /// when every line has sufficient stock as of `as_of`.
    ///
    /// `exclude_ref` omits one in-flight transaction from the live same-day
    /// aggregate so re-validating an edit does not double-count it.
    pub async fn check_availability(
        &self,
        company_id: Uuid,
        lines: Vec<AvailabilityLine>,
        as_of: NaiveDate,
        today: NaiveDate,
        exclude_ref: Option<Uuid>,
    ) -> AppResult<AvailabilityReport> {
        if lines.is_empty() {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: "At least one item line is required".to_string(),
            });
        }

        let mut results = Vec::with_capacity(lines.len());
        for line in lines {
            if line.qty_requested < Decimal::ZERO {
                return Err(AppError::Validation {
                    field: "qty_requested".to_string(),
                    message: format!("Requested quantity for {} must not be negative", line.item_code),
                });
            }
            let key = StockKey::new(company_id, line.item_type.clone(), line.item_code.clone());
            let current = self.balance_as_of(&key, as_of, today, exclude_ref).await?;
            results.push(ItemAvailability::verdict(line, current));
        }

        Ok(AvailabilityReport::new(results))
    }

    /// Single-item balance as of a date; the reporting variant of the
    /// availability check, without the quantity comparison.
    pub async fn balance_as_of(
        &self,
        key: &StockKey,
        as_of: NaiveDate,
        today: NaiveDate,
        exclude_ref: Option<Uuid>,
    ) -> AppResult<Decimal> {
        if as_of < today {
            self.historical_balance(key, as_of).await
        } else {
            // `as_of` of today; a future date is answered with the best
            // currently-known figure, which is today's.
            self.live_balance(key, today, exclude_ref).await
        }
    }

    /// Historical balance: exact snapshot, else carry-forward from the
    /// nearest earlier snapshot, else zero (unknown history never implies
    /// availability). True negatives are returned as-is here; only the live
    /// path clamps.
    async fn historical_balance(&self, key: &StockKey, as_of: NaiveDate) -> AppResult<Decimal> {
        if let Some(snapshot) = self.snapshots.get(key, as_of).await? {
            self.warn_on_drift(&snapshot);
            return Ok(snapshot.closing_balance);
        }
        if let Some(snapshot) = self.snapshots.latest_before(key, as_of).await? {
            self.warn_on_drift(&snapshot);
            tracing::debug!(
                %key,
                %as_of,
                carried_from = %snapshot.snapshot_date,
                "no exact snapshot, carrying forward"
            );
            return Ok(snapshot.closing_balance);
        }
        Ok(Decimal::ZERO)
    }

    /// Today's balance: once today's snapshot exists it is trusted outright
    /// (later ledger mutations become visible only after the queue or sweep
    /// recomputes it); otherwise opening + today's live ledger delta.
    async fn live_balance(
        &self,
        key: &StockKey,
        today: NaiveDate,
        exclude_ref: Option<Uuid>,
    ) -> AppResult<Decimal> {
        if let Some(snapshot) = self.snapshots.get(key, today).await? {
            self.warn_on_drift(&snapshot);
            return Ok(snapshot.closing_balance);
        }

        let opening = if let Some(prior) = self.snapshots.latest_before(key, today).await? {
            self.warn_on_drift(&prior);
            prior.closing_balance
        } else {
            match self.beginnings.lookup(key).await? {
                Some(b) if b.balance_date <= today => b.qty,
                _ => Decimal::ZERO,
            }
        };

        let movements = self.aggregator.day_totals(key, today, exclude_ref).await?;
        let live = key.category().closing_balance(opening, &movements);

        // The live path clamps negative computed balances to zero; the
        // historical snapshot path deliberately does not.
        Ok(live.max(Decimal::ZERO))
    }

    fn warn_on_drift(&self, snapshot: &StockSnapshot) {
        let drift = snapshot.formula_drift();
        if drift > balance_epsilon() {
            tracing::warn!(
                key = %snapshot.key(),
                date = %snapshot.snapshot_date,
                %drift,
                "stored closing balance diverges from formula"
            );
        }
    }
}
