//! Periodic driver for the queue worker and the end-of-day sweep
//!
//! Two timer-driven loops run independently of request handling: a frequent
//! queue drain, and a once-daily sweep that snapshots every active company and
//! item for the day that just elapsed — including items with zero movement, so
//! the next day's opening-balance lookup never falls back to the beginning
//! balance by accident.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use shared::StockKey;

use crate::config::SchedulerConfig;
use crate::services::queue::QueueWorker;
use crate::services::registry::{CompanyCache, CompanyDirectory};
use crate::services::snapshot::SnapshotCalculator;

/// Today in warehouse-local time.
pub fn local_today(utc_offset_minutes: i32) -> NaiveDate {
    local_now(utc_offset_minutes).date()
}

fn local_now(utc_offset_minutes: i32) -> NaiveDateTime {
    Utc::now().naive_utc() + chrono::Duration::minutes(utc_offset_minutes as i64)
}

/// Next wall-clock occurrence of `hour:minute` strictly after `now`.
fn next_sweep_after(now: NaiveDateTime, hour: u32, minute: u32) -> NaiveDateTime {
    let candidate = now
        .date()
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| now.date().and_hms_opt(0, 5, 0).expect("00:05 is valid"));
    if candidate > now {
        candidate
    } else {
        candidate + chrono::Duration::days(1)
    }
}

#[derive(Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    worker: QueueWorker,
    calculator: SnapshotCalculator,
    directory: Arc<dyn CompanyDirectory>,
    companies: Arc<CompanyCache>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        worker: QueueWorker,
        calculator: SnapshotCalculator,
        directory: Arc<dyn CompanyDirectory>,
    ) -> Self {
        let companies = Arc::new(CompanyCache::new(
            Arc::clone(&directory),
            Duration::from_secs(600),
        ));
        Self {
            config,
            worker,
            calculator,
            directory,
            companies,
        }
    }

    /// Spawn both loops. The handles live for the life of the process; a
    /// failure inside either loop is logged and the loop keeps running.
    pub fn spawn(self) -> (JoinHandle<()>, JoinHandle<()>) {
        let drain = tokio::spawn(self.clone().drain_loop());
        let sweep = tokio::spawn(self.sweep_loop());
        (drain, sweep)
    }

    async fn drain_loop(self) {
        // Entries left PROCESSING by a crash would otherwise never be
        // re-claimed.
        if let Err(error) = self.worker.recover_orphans().await {
            tracing::error!(%error, "queue recovery at startup failed");
        }

        let mut timer = tokio::time::interval(Duration::from_secs(self.config.drain_interval_secs));
        tracing::info!(
            interval_secs = self.config.drain_interval_secs,
            "queue drain loop started"
        );
        loop {
            // First tick completes immediately, draining any backlog left
            // over from before a restart.
            timer.tick().await;
            let today = local_today(self.config.utc_offset_minutes);
            if let Err(error) = self.worker.drain_tick(today).await {
                tracing::error!(%error, "queue drain tick failed");
            }
        }
    }

    async fn sweep_loop(self) {
        tracing::info!(
            hour = self.config.sweep_hour,
            minute = self.config.sweep_minute,
            "end-of-day sweep loop started"
        );
        loop {
            let now = local_now(self.config.utc_offset_minutes);
            let next = next_sweep_after(now, self.config.sweep_hour, self.config.sweep_minute);
            let wait = (next - now).to_std().unwrap_or(Duration::from_secs(60));
            tokio::time::sleep(wait).await;

            // The sweep runs shortly after midnight for the day that just
            // elapsed.
            let today = local_today(self.config.utc_offset_minutes);
            let Some(elapsed_day) = today.pred_opt() else {
                continue;
            };
            self.run_sweep(elapsed_day).await;
        }
    }

    /// Snapshot every active company x item for `for_date`. Failures are
    /// contained per company and per item; the sweep always visits everything.
    pub async fn run_sweep(&self, for_date: NaiveDate) {
        tracing::info!(%for_date, "end-of-day sweep starting");
        let companies = match self.companies.active_companies().await {
            Ok(companies) => companies,
            Err(error) => {
                tracing::error!(%error, "sweep could not list active companies");
                return;
            }
        };

        let mut items_done = 0usize;
        let mut items_failed = 0usize;
        for company_id in companies {
            match self.sweep_company(company_id, for_date).await {
                Ok((done, failed)) => {
                    items_done += done;
                    items_failed += failed;
                }
                Err(error) => {
                    tracing::error!(%company_id, %for_date, %error, "sweep skipped company");
                }
            }
        }
        tracing::info!(%for_date, items_done, items_failed, "end-of-day sweep finished");
    }

    async fn sweep_company(
        &self,
        company_id: Uuid,
        for_date: NaiveDate,
    ) -> crate::error::AppResult<(usize, usize)> {
        let items = self.directory.active_items(company_id).await?;
        let mut done = 0usize;
        let mut failed = 0usize;
        for item in items {
            let key = StockKey::new(company_id, item.item_type, item.item_code);
            match self.calculator.calculate(&key, for_date).await {
                Ok(_) => done += 1,
                Err(error) => {
                    failed += 1;
                    tracing::warn!(%key, %for_date, %error, "sweep skipped item");
                }
            }
        }
        Ok((done, failed))
    }
}
