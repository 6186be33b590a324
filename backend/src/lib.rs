//! Warehouse Stock Ledger - Stock Snapshot & Recalculation Engine
//!
//! Maintains per-item, per-day inventory balance snapshots for a
//! multi-company warehouse/customs ledger and keeps them consistent when
//! transactions arrive out of chronological order. Backdated mutations go
//! through a durable recalculation queue drained by a periodic worker; a
//! synchronous availability check combines snapshots with live same-day
//! ledger deltas to admit or reject transactions.

use std::sync::Arc;

use sqlx::PgPool;

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod services;

pub use config::Config;

use services::{
    AvailabilityChecker, CascadeRecalculator, DailyAggregator, PgBeginningBalances,
    PgCompanyDirectory, PgLedgerReader, PgRecalcQueue, PgSnapshotStore, QueueWorker, RecalcQueue,
    Scheduler, SnapshotCalculator,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub checker: AvailabilityChecker,
    pub queue: RecalcQueue,
}

/// Wire the engine over a database pool: Postgres-backed stores behind the
/// trait seams, the calculator/cascade/worker stack on top, and the
/// scheduler ready to spawn.
pub fn build_engine(db: PgPool, config: &Config) -> (AppState, Scheduler) {
    let snapshots: Arc<dyn services::SnapshotStore> = Arc::new(PgSnapshotStore::new(db.clone()));
    let beginnings: Arc<dyn services::BeginningBalanceSource> =
        Arc::new(PgBeginningBalances::new(db.clone()));
    let directory: Arc<dyn services::CompanyDirectory> =
        Arc::new(PgCompanyDirectory::new(db.clone()));
    let queue_store: Arc<dyn services::RecalcQueueStore> = Arc::new(PgRecalcQueue::new(db.clone()));
    let aggregator = DailyAggregator::new(Arc::new(PgLedgerReader::new(db.clone())));

    let calculator = SnapshotCalculator::new(
        Arc::clone(&snapshots),
        Arc::clone(&beginnings),
        aggregator.clone(),
        Arc::clone(&directory),
    );
    let cascade = CascadeRecalculator::new(calculator.clone());
    let worker = QueueWorker::new(
        Arc::clone(&queue_store),
        cascade,
        config.queue.batch_size,
        config.queue.max_attempts,
    );
    let scheduler = Scheduler::new(config.scheduler.clone(), worker, calculator, directory);

    let state = AppState {
        db,
        config: Arc::new(config.clone()),
        checker: AvailabilityChecker::new(snapshots, beginnings, aggregator),
        queue: RecalcQueue::new(queue_store),
    };

    (state, scheduler)
}
