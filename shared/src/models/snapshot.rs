//! Per-item, per-day balance snapshot and the beginning-balance anchor

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MovementTotals, StockKey};

/// Where a snapshot's opening balance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningSource {
    /// Previous day's snapshot closing balance.
    PriorSnapshot,
    /// Beginning-balance anchor (no prior snapshot yet).
    BeginningBalance,
    /// No history at all; opened at zero.
    ZeroDefault,
}

impl OpeningSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpeningSource::PriorSnapshot => "prior_snapshot",
            OpeningSource::BeginningBalance => "beginning_balance",
            OpeningSource::ZeroDefault => "zero_default",
        }
    }
}

/// Persisted closing balance for one item on one day.
///
/// Unique on (company_id, item_type, item_code, snapshot_date). Written only
/// by the snapshot calculator via atomic upsert; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub company_id: Uuid,
    pub item_type: String,
    pub item_code: String,
    pub item_name: String,
    pub uom: String,
    pub snapshot_date: NaiveDate,
    pub opening_balance: Decimal,
    pub incoming_qty: Decimal,
    pub outgoing_qty: Decimal,
    pub material_usage_qty: Decimal,
    pub production_qty: Decimal,
    pub adjustment_qty: Decimal,
    pub scrap_in_qty: Decimal,
    pub scrap_out_qty: Decimal,
    pub closing_balance: Decimal,
    /// Opening-source tag, see [`OpeningSource`].
    pub calculation_method: String,
}

impl StockSnapshot {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.company_id, self.item_type.clone(), self.item_code.clone())
    }

    pub fn movements(&self) -> MovementTotals {
        MovementTotals {
            incoming: self.incoming_qty,
            outgoing: self.outgoing_qty,
            material_usage: self.material_usage_qty,
            production: self.production_qty,
            adjustment: self.adjustment_qty,
            scrap_in: self.scrap_in_qty,
            scrap_out: self.scrap_out_qty,
        }
    }

    /// Absolute difference between the stored closing balance and the one the
    /// category formula yields from the stored opening and movements. Non-zero
    /// drift beyond [`crate::types::balance_epsilon`] indicates legacy or
    /// hand-edited data and is surfaced as a warning by readers.
    pub fn formula_drift(&self) -> Decimal {
        let expected = self
            .key()
            .category()
            .closing_balance(self.opening_balance, &self.movements());
        (self.closing_balance - expected).abs()
    }
}

/// Anchor quantity for an item before any snapshot history exists.
///
/// Owned by master-data maintenance outside this engine; exactly one active
/// row per item is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginningBalance {
    pub company_id: Uuid,
    pub item_type: String,
    pub item_code: String,
    pub item_name: String,
    pub uom: String,
    pub qty: Decimal,
    pub balance_date: NaiveDate,
}
