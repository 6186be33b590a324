//! Stock-availability admission check requests and verdicts

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One requested line of a multi-line transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityLine {
    pub item_type: String,
    pub item_code: String,
    pub qty_requested: Decimal,
}

/// Verdict for one line. Insufficient stock is a structured negative verdict,
/// not an error: the admission flow decides what to do with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAvailability {
    pub item_type: String,
    pub item_code: String,
    pub qty_requested: Decimal,
    pub current_stock: Decimal,
    pub available: bool,
    /// `max(0, qty_requested - current_stock)`; zero when available.
    pub shortfall: Decimal,
}

impl ItemAvailability {
    pub fn verdict(line: AvailabilityLine, current_stock: Decimal) -> Self {
        let available = current_stock >= line.qty_requested;
        let shortfall = if available {
            Decimal::ZERO
        } else {
            line.qty_requested - current_stock
        };
        Self {
            item_type: line.item_type,
            item_code: line.item_code,
            qty_requested: line.qty_requested,
            current_stock,
            available,
            shortfall,
        }
    }
}

/// All-or-nothing batch verdict: a transaction is admitted only when every
/// line is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub results: Vec<ItemAvailability>,
    pub all_available: bool,
}

impl AvailabilityReport {
    pub fn new(results: Vec<ItemAvailability>) -> Self {
        let all_available = results.iter().all(|r| r.available);
        Self {
            results,
            all_available,
        }
    }
}
