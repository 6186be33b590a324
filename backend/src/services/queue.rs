//! Durable recalculation queue and its periodic worker
//!
//! Transaction mutations enqueue {company, item, date} requests instead of
//! firing recalculation inline: the commit succeeds before its snapshot
//! impact is visible, and the worker drains the backlog on a timer. Every
//! unit of background work is a queue row, so a process crash never silently
//! loses one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use tokio::task::JoinSet;
use uuid::Uuid;

use shared::{priority_for, QueueStatus, RecalcQueueEntry, StockKey};

use crate::error::{AppError, AppResult};
use crate::services::cascade::CascadeRecalculator;

/// Durable queue storage. Rows are unique on (company, item_type, item_code,
/// recalc_date) and never hard-deleted; DONE/FAILED rows are kept for audit
/// and are reactivated in place when the same key/date is enqueued again.
#[async_trait]
pub trait RecalcQueueStore: Send + Sync {
    /// Upsert a request. An existing row for the key/date is coalesced:
    /// latest reason/priority/queued_at win, status returns to PENDING and
    /// the attempt counter resets.
    async fn enqueue(
        &self,
        key: &StockKey,
        recalc_date: NaiveDate,
        reason: &str,
        priority: i32,
    ) -> AppResult<()>;

    /// Companies that currently have claimable entries.
    async fn pending_companies(&self, max_attempts: i32) -> AppResult<Vec<Uuid>>;

    /// Claim up to `limit` entries for one company (priority, then
    /// queued_at), marking them PROCESSING. FAILED entries under the attempt
    /// cap are claimable again.
    async fn claim_batch(
        &self,
        company_id: Uuid,
        limit: i64,
        max_attempts: i32,
    ) -> AppResult<Vec<RecalcQueueEntry>>;

    /// Mark DONE. No-op unless the row is still PROCESSING: a coalescing
    /// re-enqueue that raced the cascade has reset it to PENDING and that
    /// request must not be swallowed.
    async fn mark_done(&self, key: &StockKey, recalc_date: NaiveDate) -> AppResult<()>;

    /// Mark FAILED, increment the attempt counter and record the error.
    /// Guarded on PROCESSING like `mark_done`.
    async fn mark_failed(
        &self,
        key: &StockKey,
        recalc_date: NaiveDate,
        error: &str,
    ) -> AppResult<()>;

    /// Reset every PROCESSING row back to PENDING, returning how many were
    /// released. Claims do not survive a restart, so at startup a PROCESSING
    /// row is always an orphan of a crash mid-cascade.
    async fn release_stale(&self) -> AppResult<u64>;

    /// Full queue contents for one company, newest first (audit/replay view).
    async fn entries_for_company(&self, company_id: Uuid) -> AppResult<Vec<RecalcQueueEntry>>;
}

#[derive(Debug, FromRow)]
struct QueueRow {
    company_id: Uuid,
    item_type: String,
    item_code: String,
    recalc_date: NaiveDate,
    status: String,
    priority: i32,
    reason: String,
    attempts: i32,
    queued_at: DateTime<Utc>,
    last_error: Option<String>,
}

impl QueueRow {
    fn into_entry(self) -> AppResult<RecalcQueueEntry> {
        let status = QueueStatus::parse(&self.status).ok_or_else(|| {
            AppError::DataInconsistency(format!("unknown queue status '{}'", self.status))
        })?;
        Ok(RecalcQueueEntry {
            company_id: self.company_id,
            item_type: self.item_type,
            item_code: self.item_code,
            recalc_date: self.recalc_date,
            status,
            priority: self.priority,
            reason: self.reason,
            attempts: self.attempts,
            queued_at: self.queued_at,
            last_error: self.last_error,
        })
    }
}

const QUEUE_COLUMNS: &str = "company_id, item_type, item_code, recalc_date, status, priority, \
     reason, attempts, queued_at, last_error";

// Alias-qualified column list for statements where recalc_queue is joined
// against a CTE exposing the same key columns.
fn qualified_queue_columns(alias: &str) -> String {
    QUEUE_COLUMNS
        .split(',')
        .map(|column| format!("{}.{}", alias, column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Postgres-backed queue store.
#[derive(Clone)]
pub struct PgRecalcQueue {
    db: PgPool,
}

impl PgRecalcQueue {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // The CTE `picked` carries the same key columns as `q`, so the RETURNING
    // list must be `q.`-qualified or Postgres rejects it as ambiguous.
    fn claim_sql() -> String {
        format!(
            r#"
            WITH picked AS (
                SELECT company_id, item_type, item_code, recalc_date
                FROM recalc_queue
                WHERE company_id = $1
                  AND (status = 'pending' OR (status = 'failed' AND attempts < $3))
                ORDER BY priority, queued_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE recalc_queue q
            SET status = 'processing'
            FROM picked p
            WHERE q.company_id = p.company_id
              AND q.item_type = p.item_type
              AND q.item_code = p.item_code
              AND q.recalc_date = p.recalc_date
            RETURNING {}
            "#,
            qualified_queue_columns("q")
        )
    }
}

#[async_trait]
impl RecalcQueueStore for PgRecalcQueue {
    async fn enqueue(
        &self,
        key: &StockKey,
        recalc_date: NaiveDate,
        reason: &str,
        priority: i32,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recalc_queue (
                company_id, item_type, item_code, recalc_date,
                status, priority, reason, attempts, queued_at
            )
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, 0, NOW())
            ON CONFLICT (company_id, item_type, item_code, recalc_date)
            DO UPDATE SET
                status = 'pending',
                priority = EXCLUDED.priority,
                reason = EXCLUDED.reason,
                attempts = 0,
                last_error = NULL,
                queued_at = NOW()
            "#,
        )
        .bind(key.company_id)
        .bind(&key.item_type)
        .bind(&key.item_code)
        .bind(recalc_date)
        .bind(priority)
        .bind(reason)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn pending_companies(&self, max_attempts: i32) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT company_id FROM recalc_queue \
             WHERE status = 'pending' OR (status = 'failed' AND attempts < $1)",
        )
        .bind(max_attempts)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    async fn claim_batch(
        &self,
        company_id: Uuid,
        limit: i64,
        max_attempts: i32,
    ) -> AppResult<Vec<RecalcQueueEntry>> {
        let rows = sqlx::query_as::<_, QueueRow>(&Self::claim_sql())
            .bind(company_id)
            .bind(limit)
            .bind(max_attempts)
            .fetch_all(&self.db)
            .await?;

        let mut entries: Vec<RecalcQueueEntry> = rows
            .into_iter()
            .map(QueueRow::into_entry)
            .collect::<AppResult<_>>()?;
        // RETURNING does not preserve the pick order.
        entries.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.queued_at.cmp(&b.queued_at))
        });
        Ok(entries)
    }

    async fn mark_done(&self, key: &StockKey, recalc_date: NaiveDate) -> AppResult<()> {
        sqlx::query(
            "UPDATE recalc_queue SET status = 'done', last_error = NULL \
             WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND recalc_date = $4 \
               AND status = 'processing'",
        )
        .bind(key.company_id)
        .bind(&key.item_type)
        .bind(&key.item_code)
        .bind(recalc_date)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        key: &StockKey,
        recalc_date: NaiveDate,
        error: &str,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE recalc_queue SET status = 'failed', attempts = attempts + 1, last_error = $5 \
             WHERE company_id = $1 AND item_type = $2 AND item_code = $3 AND recalc_date = $4 \
               AND status = 'processing'",
        )
        .bind(key.company_id)
        .bind(&key.item_type)
        .bind(&key.item_code)
        .bind(recalc_date)
        .bind(error)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn release_stale(&self) -> AppResult<u64> {
        let result =
            sqlx::query("UPDATE recalc_queue SET status = 'pending' WHERE status = 'processing'")
                .execute(&self.db)
                .await?;
        Ok(result.rows_affected())
    }

    async fn entries_for_company(&self, company_id: Uuid) -> AppResult<Vec<RecalcQueueEntry>> {
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM recalc_queue \
             WHERE company_id = $1 ORDER BY queued_at DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(QueueRow::into_entry).collect()
    }
}

/// Enqueue entry point used by transaction-mutation flows (and the HTTP
/// surface). Priority is derived here: same-day corrections drain before
/// backdated history.
#[derive(Clone)]
pub struct RecalcQueue {
    store: Arc<dyn RecalcQueueStore>,
}

impl RecalcQueue {
    pub fn new(store: Arc<dyn RecalcQueueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn RecalcQueueStore> {
        Arc::clone(&self.store)
    }

    pub async fn enqueue(
        &self,
        key: &StockKey,
        recalc_date: NaiveDate,
        reason: &str,
        today: NaiveDate,
    ) -> AppResult<()> {
        if recalc_date > today {
            return Err(AppError::Validation {
                field: "recalc_date".to_string(),
                message: format!("recalc date {} is in the future", recalc_date),
            });
        }
        let priority = priority_for(recalc_date, today);
        self.store.enqueue(key, recalc_date, reason, priority).await?;
        tracing::debug!(%key, %recalc_date, priority, reason, "recalculation enqueued");
        Ok(())
    }
}

/// Periodic queue consumer: one drain per scheduler tick.
#[derive(Clone)]
pub struct QueueWorker {
    store: Arc<dyn RecalcQueueStore>,
    cascade: CascadeRecalculator,
    batch_size: i64,
    max_attempts: i32,
}

impl QueueWorker {
    pub fn new(
        store: Arc<dyn RecalcQueueStore>,
        cascade: CascadeRecalculator,
        batch_size: i64,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            cascade,
            batch_size,
            max_attempts,
        }
    }

    /// Reset orphaned PROCESSING rows before the first drain. The calculator
    /// is idempotent, so re-running a cascade that crashed halfway is safe.
    pub async fn recover_orphans(&self) -> AppResult<()> {
        let released = self.store.release_stale().await?;
        if released > 0 {
            tracing::warn!(released, "reset orphaned processing queue entries");
        }
        Ok(())
    }

    /// Drain every company's backlog once. Companies run in parallel; one
    /// company's failure never blocks another's drain.
    pub async fn drain_tick(&self, today: NaiveDate) -> AppResult<()> {
        let companies = self.store.pending_companies(self.max_attempts).await?;
        if companies.is_empty() {
            return Ok(());
        }
        tracing::info!(companies = companies.len(), "draining recalculation queue");

        let mut tasks = JoinSet::new();
        for company_id in companies {
            let worker = self.clone();
            tasks.spawn(async move {
                if let Err(error) = worker.drain_company(company_id, today).await {
                    tracing::error!(%company_id, %error, "company queue drain failed");
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(error) = joined {
                tracing::error!(%error, "queue drain task panicked");
            }
        }
        Ok(())
    }

    /// Drain one batch for one company, entries strictly in sequence so two
    /// entries for the same item can never interleave their cascades.
    async fn drain_company(&self, company_id: Uuid, today: NaiveDate) -> AppResult<()> {
        let entries = self
            .store
            .claim_batch(company_id, self.batch_size, self.max_attempts)
            .await?;

        for entry in entries {
            let key = entry.key();
            match self.cascade.recalc_from(&key, entry.recalc_date, today).await {
                Ok(outcome) if outcome.is_complete() => {
                    self.store.mark_done(&key, entry.recalc_date).await?;
                    tracing::debug!(%key, recalc_date = %entry.recalc_date, dates = outcome.results.len(), "recalculation done");
                }
                Ok(outcome) => {
                    // `failed` is Some here by the guard above.
                    let failure = outcome
                        .failed
                        .map(|f| format!("{}: {}", f.date, f.error))
                        .unwrap_or_else(|| "unknown cascade failure".to_string());
                    self.handle_failure(&key, &entry, &failure).await?;
                }
                Err(error) => {
                    self.handle_failure(&key, &entry, &error.to_string()).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_failure(
        &self,
        key: &StockKey,
        entry: &RecalcQueueEntry,
        failure: &str,
    ) -> AppResult<()> {
        self.store.mark_failed(key, entry.recalc_date, failure).await?;
        let attempts_now = entry.attempts + 1;
        if attempts_now >= self.max_attempts {
            // Alert hook: the entry stays FAILED and will not be retried.
            tracing::error!(
                %key,
                recalc_date = %entry.recalc_date,
                attempts = attempts_now,
                failure,
                "recalculation giving up after retry cap"
            );
        } else {
            tracing::warn!(
                %key,
                recalc_date = %entry.recalc_date,
                attempts = attempts_now,
                failure,
                "recalculation failed, will retry on a later tick"
            );
        }
        Ok(())
    }
}
