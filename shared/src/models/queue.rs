//! Durable recalculation work-queue entries

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StockKey;

/// Lifecycle of a queue entry. Entries are never hard-deleted; DONE and
/// FAILED rows are retained for audit and replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "done" => Some(QueueStatus::Done),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }
}

/// Drain priority for a recalculation date: same-day corrections surface
/// before deep historical ones (lower value drains first).
pub fn priority_for(recalc_date: NaiveDate, today: NaiveDate) -> i32 {
    if recalc_date == today {
        -1
    } else {
        0
    }
}

/// One pending recalculation: recompute snapshots for this item from
/// `recalc_date` forward. Unique on (company_id, item_type, item_code,
/// recalc_date); repeated enqueues coalesce into the existing PENDING row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalcQueueEntry {
    pub company_id: Uuid,
    pub item_type: String,
    pub item_code: String,
    pub recalc_date: NaiveDate,
    pub status: QueueStatus,
    pub priority: i32,
    pub reason: String,
    pub attempts: i32,
    pub queued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl RecalcQueueEntry {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.company_id, self.item_type.clone(), self.item_code.clone())
    }
}
