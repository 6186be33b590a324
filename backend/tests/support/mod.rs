//! In-memory stand-ins for the storage seams, used by the engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::{BeginningBalance, QueueStatus, RecalcQueueEntry, StockKey, StockSnapshot};
use wsl_backend::error::{AppError, AppResult};
use wsl_backend::services::{
    AvailabilityChecker, BeginningBalanceSource, CascadeRecalculator, CompanyDirectory,
    DailyAggregator, ItemInfo, LedgerKind, LedgerReader, RecalcQueueStore, SnapshotCalculator,
    SnapshotStore,
};

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ----------------------------------------------------------------------------
// Ledger fake
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub key: StockKey,
    pub date: NaiveDate,
    pub kind: LedgerKind,
    pub qty: Decimal,
}

/// In-memory movement ledgers with optional per-date injected failures.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    failing_dates: Mutex<HashSet<NaiveDate>>,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, key: &StockKey, date: NaiveDate, kind: LedgerKind, qty: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.lock().unwrap().push(LedgerEntry {
            id,
            key: key.clone(),
            date,
            kind,
            qty: dec(qty),
        });
        id
    }

    pub fn fail_on(&self, date: NaiveDate) {
        self.failing_dates.lock().unwrap().insert(date);
    }

    pub fn clear_failures(&self) {
        self.failing_dates.lock().unwrap().clear();
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn day_total(
        &self,
        kind: LedgerKind,
        key: &StockKey,
        date: NaiveDate,
        exclude_ref: Option<Uuid>,
    ) -> AppResult<Decimal> {
        if self.failing_dates.lock().unwrap().contains(&date) {
            return Err(AppError::LedgerQuery(format!(
                "injected failure for {}",
                date
            )));
        }
        let total = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.kind == kind && e.key == *key && e.date == date && Some(e.id) != exclude_ref
            })
            .map(|e| e.qty)
            .sum();
        Ok(total)
    }
}

// ----------------------------------------------------------------------------
// Snapshot store fake
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySnapshotStore {
    rows: Mutex<HashMap<(StockKey, NaiveDate), StockSnapshot>>,
    pub upsert_count: Mutex<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn insert_raw(&self, snapshot: StockSnapshot) {
        self.rows
            .lock()
            .unwrap()
            .insert((snapshot.key(), snapshot.snapshot_date), snapshot);
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, key: &StockKey, date: NaiveDate) -> AppResult<Option<StockSnapshot>> {
        Ok(self.rows.lock().unwrap().get(&(key.clone(), date)).cloned())
    }

    async fn latest_before(
        &self,
        key: &StockKey,
        date: NaiveDate,
    ) -> AppResult<Option<StockSnapshot>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, d), _)| k == key && *d < date)
            .max_by_key(|((_, d), _)| *d)
            .map(|(_, s)| s.clone()))
    }

    async fn upsert(&self, snapshot: &StockSnapshot) -> AppResult<()> {
        *self.upsert_count.lock().unwrap() += 1;
        self.rows
            .lock()
            .unwrap()
            .insert((snapshot.key(), snapshot.snapshot_date), snapshot.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Beginning balances fake
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBeginnings {
    rows: Mutex<Vec<BeginningBalance>>,
}

impl MemoryBeginnings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, key: &StockKey, qty: &str, balance_date: NaiveDate) {
        self.rows.lock().unwrap().push(BeginningBalance {
            company_id: key.company_id,
            item_type: key.item_type.clone(),
            item_code: key.item_code.clone(),
            item_name: format!("Item {}", key.item_code),
            uom: "KG".to_string(),
            qty: dec(qty),
            balance_date,
        });
    }
}

#[async_trait]
impl BeginningBalanceSource for MemoryBeginnings {
    async fn lookup(&self, key: &StockKey) -> AppResult<Option<BeginningBalance>> {
        let matching: Vec<BeginningBalance> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|b| {
                b.company_id == key.company_id
                    && b.item_type == key.item_type
                    && b.item_code == key.item_code
            })
            .cloned()
            .collect();
        if matching.len() > 1 {
            return Err(AppError::DataInconsistency(format!(
                "{} active beginning balances for {}",
                matching.len(),
                key
            )));
        }
        Ok(matching.into_iter().next())
    }
}

// ----------------------------------------------------------------------------
// Company directory fake
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryDirectory {
    companies: Mutex<Vec<Uuid>>,
    items: Mutex<HashMap<Uuid, Vec<ItemInfo>>>,
}

impl MemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_company(&self, company_id: Uuid) {
        self.companies.lock().unwrap().push(company_id);
    }

    pub fn add_item(&self, key: &StockKey, item_name: &str, uom: &str) {
        self.companies
            .lock()
            .unwrap()
            .retain(|c| *c != key.company_id);
        self.companies.lock().unwrap().push(key.company_id);
        self.items
            .lock()
            .unwrap()
            .entry(key.company_id)
            .or_default()
            .push(ItemInfo {
                item_type: key.item_type.clone(),
                item_code: key.item_code.clone(),
                item_name: item_name.to_string(),
                uom: uom.to_string(),
            });
    }
}

#[async_trait]
impl CompanyDirectory for MemoryDirectory {
    async fn active_companies(&self) -> AppResult<Vec<Uuid>> {
        Ok(self.companies.lock().unwrap().clone())
    }

    async fn active_items(&self, company_id: Uuid) -> AppResult<Vec<ItemInfo>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&company_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn item_info(&self, key: &StockKey) -> AppResult<Option<ItemInfo>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&key.company_id)
            .and_then(|items| {
                items
                    .iter()
                    .find(|i| i.item_type == key.item_type && i.item_code == key.item_code)
                    .cloned()
            }))
    }
}

// ----------------------------------------------------------------------------
// Queue store fake (mirrors the Postgres coalescing semantics)
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryQueue {
    rows: Mutex<HashMap<(StockKey, NaiveDate), RecalcQueueEntry>>,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all_entries(&self) -> Vec<RecalcQueueEntry> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn entry(&self, key: &StockKey, recalc_date: NaiveDate) -> Option<RecalcQueueEntry> {
        self.rows
            .lock()
            .unwrap()
            .get(&(key.clone(), recalc_date))
            .cloned()
    }
}

#[async_trait]
impl RecalcQueueStore for MemoryQueue {
    async fn enqueue(
        &self,
        key: &StockKey,
        recalc_date: NaiveDate,
        reason: &str,
        priority: i32,
    ) -> AppResult<()> {
        let entry = RecalcQueueEntry {
            company_id: key.company_id,
            item_type: key.item_type.clone(),
            item_code: key.item_code.clone(),
            recalc_date,
            status: QueueStatus::Pending,
            priority,
            reason: reason.to_string(),
            attempts: 0,
            queued_at: Utc::now(),
            last_error: None,
        };
        self.rows
            .lock()
            .unwrap()
            .insert((key.clone(), recalc_date), entry);
        Ok(())
    }

    async fn pending_companies(&self, max_attempts: i32) -> AppResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|e| is_claimable(e, max_attempts))
            .map(|e| e.company_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn claim_batch(
        &self,
        company_id: Uuid,
        limit: i64,
        max_attempts: i32,
    ) -> AppResult<Vec<RecalcQueueEntry>> {
        let mut rows = self.rows.lock().unwrap();
        let mut claimable: Vec<(StockKey, NaiveDate)> = rows
            .values()
            .filter(|e| e.company_id == company_id && is_claimable(e, max_attempts))
            .map(|e| (e.key(), e.recalc_date))
            .collect();
        claimable.sort_by(|a, b| {
            let ea = &rows[a];
            let eb = &rows[b];
            ea.priority
                .cmp(&eb.priority)
                .then(ea.queued_at.cmp(&eb.queued_at))
        });
        claimable.truncate(limit as usize);

        let mut claimed = Vec::new();
        for id in claimable {
            if let Some(entry) = rows.get_mut(&id) {
                entry.status = QueueStatus::Processing;
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_done(&self, key: &StockKey, recalc_date: NaiveDate) -> AppResult<()> {
        if let Some(entry) = self
            .rows
            .lock()
            .unwrap()
            .get_mut(&(key.clone(), recalc_date))
        {
            // A re-enqueue that raced the cascade has reset the row to
            // pending; that request must survive.
            if entry.status == QueueStatus::Processing {
                entry.status = QueueStatus::Done;
                entry.last_error = None;
            }
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        key: &StockKey,
        recalc_date: NaiveDate,
        error: &str,
    ) -> AppResult<()> {
        if let Some(entry) = self
            .rows
            .lock()
            .unwrap()
            .get_mut(&(key.clone(), recalc_date))
        {
            if entry.status == QueueStatus::Processing {
                entry.status = QueueStatus::Failed;
                entry.attempts += 1;
                entry.last_error = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn release_stale(&self) -> AppResult<u64> {
        let mut released = 0;
        for entry in self.rows.lock().unwrap().values_mut() {
            if entry.status == QueueStatus::Processing {
                entry.status = QueueStatus::Pending;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn entries_for_company(&self, company_id: Uuid) -> AppResult<Vec<RecalcQueueEntry>> {
        let mut entries: Vec<RecalcQueueEntry> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.company_id == company_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        Ok(entries)
    }
}

fn is_claimable(entry: &RecalcQueueEntry, max_attempts: i32) -> bool {
    entry.status == QueueStatus::Pending
        || (entry.status == QueueStatus::Failed && entry.attempts < max_attempts)
}

// ----------------------------------------------------------------------------
// Wired engine over the fakes
// ----------------------------------------------------------------------------

pub struct TestEngine {
    pub ledger: Arc<MemoryLedger>,
    pub snapshots: Arc<MemorySnapshotStore>,
    pub beginnings: Arc<MemoryBeginnings>,
    pub directory: Arc<MemoryDirectory>,
    pub calculator: SnapshotCalculator,
    pub cascade: CascadeRecalculator,
    pub checker: AvailabilityChecker,
}

impl TestEngine {
    pub fn new() -> Self {
        let ledger = MemoryLedger::new();
        let snapshots = MemorySnapshotStore::new();
        let beginnings = MemoryBeginnings::new();
        let directory = MemoryDirectory::new();

        let aggregator = DailyAggregator::new(ledger.clone() as Arc<dyn LedgerReader>);
        let calculator = SnapshotCalculator::new(
            snapshots.clone() as Arc<dyn SnapshotStore>,
            beginnings.clone() as Arc<dyn BeginningBalanceSource>,
            aggregator.clone(),
            directory.clone() as Arc<dyn CompanyDirectory>,
        );
        let cascade = CascadeRecalculator::new(calculator.clone());
        let checker = AvailabilityChecker::new(
            snapshots.clone() as Arc<dyn SnapshotStore>,
            beginnings.clone() as Arc<dyn BeginningBalanceSource>,
            aggregator,
        );

        Self {
            ledger,
            snapshots,
            beginnings,
            directory,
            calculator,
            cascade,
            checker,
        }
    }
}
