//! Company and item master-data lookups for the background loops
//!
//! The drain tick and the end-of-day sweep both iterate every active company;
//! the company list changes rarely, so it sits behind a small TTL cache owned
//! by the service instance (with explicit invalidation) rather than a
//! process-wide singleton.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tokio::sync::Mutex;
use uuid::Uuid;

use shared::StockKey;

use crate::error::AppResult;

/// Item master-data needed to label a snapshot row.
#[derive(Debug, Clone, FromRow)]
pub struct ItemInfo {
    pub item_type: String,
    pub item_code: String,
    pub item_name: String,
    pub uom: String,
}

/// Master-data read API: which companies are active and what items they stock.
#[async_trait]
pub trait CompanyDirectory: Send + Sync {
    async fn active_companies(&self) -> AppResult<Vec<Uuid>>;

    async fn active_items(&self, company_id: Uuid) -> AppResult<Vec<ItemInfo>>;

    async fn item_info(&self, key: &StockKey) -> AppResult<Option<ItemInfo>>;
}

/// Postgres-backed directory over the `companies` / `items` tables.
pub struct PgCompanyDirectory {
    db: PgPool,
}

impl PgCompanyDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CompanyDirectory for PgCompanyDirectory {
    async fn active_companies(&self) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM companies WHERE is_active = true ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    async fn active_items(&self, company_id: Uuid) -> AppResult<Vec<ItemInfo>> {
        let items = sqlx::query_as::<_, ItemInfo>(
            "SELECT item_type, item_code, item_name, uom FROM items \
             WHERE company_id = $1 AND is_active = true \
             ORDER BY item_type, item_code",
        )
        .bind(company_id)
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    async fn item_info(&self, key: &StockKey) -> AppResult<Option<ItemInfo>> {
        let info = sqlx::query_as::<_, ItemInfo>(
            "SELECT item_type, item_code, item_name, uom FROM items \
             WHERE company_id = $1 AND item_type = $2 AND item_code = $3",
        )
        .bind(key.company_id)
        .bind(&key.item_type)
        .bind(&key.item_code)
        .fetch_optional(&self.db)
        .await?;
        Ok(info)
    }
}

/// TTL cache over the active-company list.
pub struct CompanyCache {
    directory: Arc<dyn CompanyDirectory>,
    ttl: Duration,
    cached: Mutex<Option<(Instant, Vec<Uuid>)>>,
}

impl CompanyCache {
    pub fn new(directory: Arc<dyn CompanyDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Active companies, served from cache within the TTL.
    pub async fn active_companies(&self) -> AppResult<Vec<Uuid>> {
        let mut guard = self.cached.lock().await;
        if let Some((at, companies)) = guard.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(companies.clone());
            }
        }
        let companies = self.directory.active_companies().await?;
        *guard = Some((Instant::now(), companies.clone()));
        Ok(companies)
    }

    /// Drop the cached list, forcing a reload on the next call. Used when
    /// company master data changes mid-TTL.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
