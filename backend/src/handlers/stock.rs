//! HTTP handlers for stock availability and balance reads

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{AvailabilityLine, AvailabilityReport, StockKey};

use crate::error::AppResult;
use crate::services::scheduler::local_today;
use crate::AppState;

/// Request body for the availability check
#[derive(Debug, Deserialize)]
pub struct CheckAvailabilityRequest {
    pub company_id: Uuid,
    pub items: Vec<AvailabilityLine>,
    pub as_of_date: NaiveDate,
    /// In-flight transaction to exclude from the live same-day aggregate
    /// (re-validation of an edit).
    pub exclude_ref: Option<Uuid>,
}

/// Check stock availability for a multi-line transaction
pub async fn check_availability(
    State(state): State<AppState>,
    Json(input): Json<CheckAvailabilityRequest>,
) -> AppResult<Json<AvailabilityReport>> {
    let today = local_today(state.config.scheduler.utc_offset_minutes);
    let report = state
        .checker
        .check_availability(
            input.company_id,
            input.items,
            input.as_of_date,
            today,
            input.exclude_ref,
        )
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub company_id: Uuid,
    pub item_type: String,
    pub item_code: String,
    pub as_of: NaiveDate,
    pub balance: Decimal,
}

/// Get a single item's balance as of a date (defaults to today)
pub async fn get_balance(
    State(state): State<AppState>,
    Path((company_id, item_type, item_code)): Path<(Uuid, String, String)>,
    Query(query): Query<BalanceQuery>,
) -> AppResult<Json<BalanceResponse>> {
    let today = local_today(state.config.scheduler.utc_offset_minutes);
    let as_of = query.as_of.unwrap_or(today);
    let key = StockKey::new(company_id, item_type.clone(), item_code.clone());
    let balance = state.checker.balance_as_of(&key, as_of, today, None).await?;
    Ok(Json(BalanceResponse {
        company_id,
        item_type,
        item_code,
        as_of,
        balance,
    }))
}
