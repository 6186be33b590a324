//! HTTP handlers for the recalculation queue

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{RecalcQueueEntry, StockKey};

use crate::error::AppResult;
use crate::services::scheduler::local_today;
use crate::AppState;

/// Request body for enqueueing a recalculation
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub company_id: Uuid,
    pub item_type: String,
    pub item_code: String,
    pub recalc_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub queued: bool,
}

/// Enqueue a snapshot recalculation for an item from a date forward.
/// Called by transaction flows whenever a transaction affecting that
/// item/date is created, edited, deleted, or reversed.
pub async fn enqueue_recalc(
    State(state): State<AppState>,
    Json(input): Json<EnqueueRequest>,
) -> AppResult<Json<EnqueueResponse>> {
    let today = local_today(state.config.scheduler.utc_offset_minutes);
    let key = StockKey::new(input.company_id, input.item_type, input.item_code);
    state
        .queue
        .enqueue(&key, input.recalc_date, &input.reason, today)
        .await?;
    Ok(Json(EnqueueResponse { queued: true }))
}

/// List a company's queue entries, newest first (audit/replay view)
pub async fn list_queue(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<Vec<RecalcQueueEntry>>> {
    let entries = state.queue.store().entries_for_company(company_id).await?;
    Ok(Json(entries))
}
