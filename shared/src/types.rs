//! Common types used across the stock ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tolerance when comparing a stored closing balance against the formula.
/// Drift beyond this is reported as a data-quality warning, not a failure.
pub fn balance_epsilon() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

/// Identity of one stocked item within one company.
///
/// Together with a date this is the natural key of every snapshot and
/// recalculation-queue row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub company_id: Uuid,
    pub item_type: String,
    pub item_code: String,
}

impl StockKey {
    pub fn new(company_id: Uuid, item_type: impl Into<String>, item_code: impl Into<String>) -> Self {
        Self {
            company_id,
            item_type: item_type.into(),
            item_code: item_code.into(),
        }
    }

    pub fn category(&self) -> ItemCategory {
        ItemCategory::from_type_code(&self.item_type)
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.company_id, self.item_type, self.item_code)
    }
}

/// Balance category of an item type.
///
/// This is a closed set: each variant carries its own closing-balance formula
/// in [`crate::formula`], and the match there is exhaustive so a new category
/// cannot silently fall into the fallback branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// Raw/sub-materials and capital-goods subtypes consumed by production.
    InputConsumption,
    /// Finished goods produced on site.
    Output,
    /// Scrap generated and disposed of.
    Scrap,
    /// Item types with no registered category. Balanced with the conservative
    /// net-of-all-movements fallback rather than silently dropped.
    Uncategorized,
}

impl ItemCategory {
    /// Resolve the category from an item-type code.
    ///
    /// RM = raw material, SM = sub material, CE = capital equipment,
    /// SP = spare part, FG = finished goods, SC = scrap.
    pub fn from_type_code(code: &str) -> Self {
        match code {
            "RM" | "SM" | "CE" | "SP" => ItemCategory::InputConsumption,
            "FG" => ItemCategory::Output,
            "SC" => ItemCategory::Scrap,
            _ => ItemCategory::Uncategorized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::InputConsumption => "input_consumption",
            ItemCategory::Output => "output",
            ItemCategory::Scrap => "scrap",
            ItemCategory::Uncategorized => "uncategorized",
        }
    }
}

/// Signed movement totals for one item on one day, one figure per ledger.
///
/// Totals arrive net of soft-deletes and reversal sign flips; the adjustment
/// total is already signed (gains positive, losses negative). A ledger with no
/// rows for the day contributes zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementTotals {
    pub incoming: Decimal,
    pub outgoing: Decimal,
    pub material_usage: Decimal,
    pub production: Decimal,
    pub adjustment: Decimal,
    pub scrap_in: Decimal,
    pub scrap_out: Decimal,
}

impl MovementTotals {
    /// Net of all signed movements, used by the uncategorized fallback.
    pub fn net(&self) -> Decimal {
        self.incoming + self.production + self.adjustment + self.scrap_in
            - self.outgoing
            - self.material_usage
            - self.scrap_out
    }

    pub fn is_zero(&self) -> bool {
        *self == MovementTotals::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_category_from_type_code() {
        assert_eq!(ItemCategory::from_type_code("RM"), ItemCategory::InputConsumption);
        assert_eq!(ItemCategory::from_type_code("SM"), ItemCategory::InputConsumption);
        assert_eq!(ItemCategory::from_type_code("CE"), ItemCategory::InputConsumption);
        assert_eq!(ItemCategory::from_type_code("SP"), ItemCategory::InputConsumption);
        assert_eq!(ItemCategory::from_type_code("FG"), ItemCategory::Output);
        assert_eq!(ItemCategory::from_type_code("SC"), ItemCategory::Scrap);
        assert_eq!(ItemCategory::from_type_code("XX"), ItemCategory::Uncategorized);
        assert_eq!(ItemCategory::from_type_code(""), ItemCategory::Uncategorized);
    }

    #[test]
    fn test_net_movement() {
        let totals = MovementTotals {
            incoming: dec("20"),
            outgoing: dec("10"),
            material_usage: dec("5"),
            production: dec("7"),
            adjustment: dec("-2"),
            scrap_in: dec("3"),
            scrap_out: dec("1"),
        };
        // 20 + 7 - 2 + 3 - 10 - 5 - 1 = 12
        assert_eq!(totals.net(), dec("12"));
    }

    #[test]
    fn test_default_totals_are_zero() {
        let totals = MovementTotals::default();
        assert!(totals.is_zero());
        assert_eq!(totals.net(), Decimal::ZERO);
    }
}
