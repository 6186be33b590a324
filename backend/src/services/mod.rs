//! Stock snapshot & recalculation engine services

pub mod aggregator;
pub mod availability;
pub mod cascade;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod snapshot;

pub use aggregator::{DailyAggregator, LedgerKind, LedgerReader, PgLedgerReader};
pub use availability::AvailabilityChecker;
pub use cascade::{CascadeOutcome, CascadeRecalculator};
pub use queue::{PgRecalcQueue, QueueWorker, RecalcQueue, RecalcQueueStore};
pub use registry::{CompanyCache, CompanyDirectory, ItemInfo, PgCompanyDirectory};
pub use scheduler::Scheduler;
pub use snapshot::{
    BeginningBalanceSource, DailyCalculation, PgBeginningBalances, PgSnapshotStore,
    SnapshotCalculator, SnapshotStore,
};
