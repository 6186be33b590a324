//! Closing-balance formulas per item category.
//!
//! These are pure functions of the opening balance and one day's movement
//! totals. Everything stateful (ledger reads, snapshot persistence) lives in
//! the backend; keeping the formulas here lets them be verified without a
//! database.

use rust_decimal::Decimal;

use crate::types::{ItemCategory, MovementTotals};

impl ItemCategory {
    /// Compute the closing balance for one day.
    ///
    /// The adjustment total is already signed upstream (gain adds, loss
    /// subtracts). The match is exhaustive on purpose: adding a category
    /// without deciding its formula must not compile.
    pub fn closing_balance(&self, opening: Decimal, m: &MovementTotals) -> Decimal {
        match self {
            ItemCategory::InputConsumption => {
                opening + m.incoming - m.material_usage - m.outgoing + m.adjustment
            }
            ItemCategory::Output => opening + m.production - m.outgoing + m.adjustment,
            ItemCategory::Scrap => opening + m.scrap_in - m.scrap_out + m.adjustment,
            // Conservative fallback for unregistered item types: net of every
            // signed movement, so nothing is dropped on the floor.
            ItemCategory::Uncategorized => opening + m.net(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_input_consumption_formula() {
        // O=100, I=20, U=5, G=10, A=0 -> 105
        let m = MovementTotals {
            incoming: dec("20"),
            material_usage: dec("5"),
            outgoing: dec("10"),
            ..Default::default()
        };
        assert_eq!(
            ItemCategory::InputConsumption.closing_balance(dec("100"), &m),
            dec("105")
        );
    }

    #[test]
    fn test_output_formula() {
        let m = MovementTotals {
            production: dec("40"),
            outgoing: dec("15"),
            adjustment: dec("-5"),
            ..Default::default()
        };
        assert_eq!(ItemCategory::Output.closing_balance(dec("10"), &m), dec("30"));
    }

    #[test]
    fn test_scrap_formula() {
        let m = MovementTotals {
            scrap_in: dec("8"),
            scrap_out: dec("3"),
            adjustment: dec("1"),
            ..Default::default()
        };
        assert_eq!(ItemCategory::Scrap.closing_balance(dec("0"), &m), dec("6"));
    }

    #[test]
    fn test_output_ignores_incoming_and_usage() {
        let m = MovementTotals {
            incoming: dec("100"),
            material_usage: dec("50"),
            production: dec("10"),
            ..Default::default()
        };
        assert_eq!(ItemCategory::Output.closing_balance(dec("0"), &m), dec("10"));
    }

    #[test]
    fn test_uncategorized_fallback_nets_everything() {
        let m = MovementTotals {
            incoming: dec("20"),
            outgoing: dec("10"),
            material_usage: dec("5"),
            production: dec("7"),
            adjustment: dec("-2"),
            scrap_in: dec("3"),
            scrap_out: dec("1"),
        };
        assert_eq!(
            ItemCategory::Uncategorized.closing_balance(dec("100"), &m),
            dec("112")
        );
    }

    #[test]
    fn test_zero_movements_carry_opening() {
        let m = MovementTotals::default();
        for category in [
            ItemCategory::InputConsumption,
            ItemCategory::Output,
            ItemCategory::Scrap,
            ItemCategory::Uncategorized,
        ] {
            assert_eq!(category.closing_balance(dec("42.5"), &m), dec("42.5"));
        }
    }

    fn qty_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn signed_qty_strategy() -> impl Strategy<Value = Decimal> {
        (-1_000_000i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Input-consumption formula holds for all quantities.
        #[test]
        fn prop_input_consumption_formula(
            opening in signed_qty_strategy(),
            incoming in qty_strategy(),
            usage in qty_strategy(),
            outgoing in qty_strategy(),
            adjustment in signed_qty_strategy(),
        ) {
            let m = MovementTotals {
                incoming,
                material_usage: usage,
                outgoing,
                adjustment,
                ..Default::default()
            };
            let closing = ItemCategory::InputConsumption.closing_balance(opening, &m);
            prop_assert_eq!(closing, opening + incoming - usage - outgoing + adjustment);
        }

        /// Formulas are deterministic: same inputs, same closing.
        #[test]
        fn prop_formula_deterministic(
            opening in signed_qty_strategy(),
            incoming in qty_strategy(),
            production in qty_strategy(),
            outgoing in qty_strategy(),
        ) {
            let m = MovementTotals {
                incoming,
                production,
                outgoing,
                ..Default::default()
            };
            for category in [
                ItemCategory::InputConsumption,
                ItemCategory::Output,
                ItemCategory::Scrap,
                ItemCategory::Uncategorized,
            ] {
                prop_assert_eq!(
                    category.closing_balance(opening, &m),
                    category.closing_balance(opening, &m)
                );
            }
        }

        /// A day with no movement never changes the balance, whatever the category.
        #[test]
        fn prop_no_movement_no_change(opening in signed_qty_strategy()) {
            let m = MovementTotals::default();
            for category in [
                ItemCategory::InputConsumption,
                ItemCategory::Output,
                ItemCategory::Scrap,
                ItemCategory::Uncategorized,
            ] {
                prop_assert_eq!(category.closing_balance(opening, &m), opening);
            }
        }
    }
}
