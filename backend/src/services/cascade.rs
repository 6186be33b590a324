//! Cascading forward recalculation after a backdated change
//!
//! Each date's opening balance is literally the previous date's freshly
//! computed closing balance, so dates for one item must be recomputed in
//! ascending order, one at a time. Distinct items have no ordering dependency
//! and may cascade concurrently.

use chrono::NaiveDate;

use shared::StockKey;

use crate::error::{AppError, AppResult};
use crate::services::snapshot::{DailyCalculation, SnapshotCalculator};

/// Outcome of one cascade run. On failure the results computed so far are
/// kept: the calculator is idempotent, so resuming from `failed.date` later
/// reproduces exactly what a from-scratch run would.
#[derive(Debug)]
pub struct CascadeOutcome {
    pub results: Vec<DailyCalculation>,
    pub failed: Option<CascadeFailure>,
}

#[derive(Debug)]
pub struct CascadeFailure {
    pub date: NaiveDate,
    pub error: AppError,
}

impl CascadeOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }
}

/// Re-runs the snapshot calculator across a forward date range.
#[derive(Clone)]
pub struct CascadeRecalculator {
    calculator: SnapshotCalculator,
}

impl CascadeRecalculator {
    pub fn new(calculator: SnapshotCalculator) -> Self {
        Self { calculator }
    }

    pub fn calculator(&self) -> &SnapshotCalculator {
        &self.calculator
    }

    /// Recompute snapshots for every date in `[start_date, end_date]`,
    /// strictly ascending and strictly sequential: date D+1 is never started
    /// before D's write has committed.
    pub async fn recalc_from(
        &self,
        key: &StockKey,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AppResult<CascadeOutcome> {
        if start_date > end_date {
            return Err(AppError::Validation {
                field: "start_date".to_string(),
                message: format!("start date {} is after end date {}", start_date, end_date),
            });
        }

        let mut results = Vec::new();
        let mut date = start_date;

        while date <= end_date {
            match self.calculator.calculate(key, date).await {
                Ok(calc) => {
                    tracing::debug!(
                        %key,
                        %date,
                        closing = %calc.snapshot.closing_balance,
                        duration_ms = calc.duration_ms,
                        "snapshot recalculated"
                    );
                    results.push(calc);
                }
                Err(error) => {
                    // Stop at the first failing date; later dates would be
                    // built on a stale opening balance.
                    tracing::warn!(%key, %date, %error, "cascade stopped at failing date");
                    return Ok(CascadeOutcome {
                        results,
                        failed: Some(CascadeFailure { date, error }),
                    });
                }
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break, // end of representable time
            };
        }

        Ok(CascadeOutcome {
            results,
            failed: None,
        })
    }
}
