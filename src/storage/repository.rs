//! Repository Pattern for Database Abstraction
//!
//! Trait-based repositories decouple the engine from storage:
//! - Easy testing with the in-memory implementation
//! - SQLite for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Distribution Engine                     │
//! │        (selectors, dispatcher, ledger, insights)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Repository Traits                         │
//! │  PoolRepository, LedgerRepository, IntegrationRepository    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    ┌─────────┴─────────┐
//!                    ▼                   ▼
//!           ┌─────────────────┐ ┌─────────────────┐
//!           │   SqliteStore   │ │   MemoryStore   │
//!           └─────────────────┘ └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use promocast::storage::{Repositories, SqliteStore, MemoryStore};
//!
//! // Production: use SQLite
//! let repos = Repositories::from_store(Arc::new(SqliteStore::new("data/promocast.db")?));
//!
//! // Testing: use memory
//! let repos = Repositories::from_store(Arc::new(MemoryStore::new()));
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::{
    ChannelIntegration, ContentItem, DeliveryRecord, DeliveryStatus, EngagementMetrics, ImageAsset,
    NewContentItem, NewDeliveryRecord, NewImageAsset, PlatformScope,
};

// ============================================================================
// Repository Traits
// ============================================================================

/// Content and image pools
///
/// Active listings are returned in pool order (insertion order); selection
/// ordering is applied by the selectors.
pub trait PoolRepository: Send + Sync {
    /// Add a content item to the pool
    fn insert_content(&self, item: &NewContentItem) -> Result<ContentItem>;

    /// Add an image to the pool
    fn insert_image(&self, image: &NewImageAsset) -> Result<ImageAsset>;

    /// Active content items in pool order
    fn active_content(&self) -> Result<Vec<ContentItem>>;

    /// Active images in pool order
    fn active_images(&self) -> Result<Vec<ImageAsset>>;

    /// Get content item by id
    fn get_content(&self, id: &str) -> Result<Option<ContentItem>>;

    /// Get image by id
    fn get_image(&self, id: &str) -> Result<Option<ImageAsset>>;

    /// Increment usage and stamp last use, in one statement
    fn record_content_usage(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Increment usage and stamp last use, in one statement
    fn record_image_usage(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Activate or retire a content item; false if unknown
    fn set_content_active(&self, id: &str, active: bool) -> Result<bool>;

    /// Number of active content items
    fn count_active_content(&self) -> Result<usize> {
        Ok(self.active_content()?.len())
    }

    /// Number of active images
    fn count_active_images(&self) -> Result<usize> {
        Ok(self.active_images()?.len())
    }
}

/// Append-only delivery ledger
pub trait LedgerRepository: Send + Sync {
    /// Append a row; `posted_at` is set iff the row is posted
    fn append(&self, record: &NewDeliveryRecord, at: DateTime<Utc>) -> Result<DeliveryRecord>;

    /// Newest rows first
    fn history(&self, limit: usize) -> Result<Vec<DeliveryRecord>>;

    /// Every row, oldest first
    fn all_records(&self) -> Result<Vec<DeliveryRecord>>;

    /// Posted rows carrying an external id, oldest first, skipping `offset`
    fn posted_with_external_id(&self, offset: usize, limit: usize) -> Result<Vec<DeliveryRecord>>;

    /// Overwrite performance counters; false if the row is unknown
    fn update_metrics(&self, id: &str, metrics: &EngagementMetrics, at: DateTime<Utc>) -> Result<bool>;

    /// Number of rows with the given status
    fn count_by_status(&self, status: DeliveryStatus) -> Result<usize>;
}

/// Per-tenant channel credentials
pub trait IntegrationRepository: Send + Sync {
    fn get_integration(&self, tenant_id: &str) -> Result<Option<ChannelIntegration>>;

    fn upsert_integration(&self, integration: &ChannelIntegration) -> Result<()>;
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository wrappers
pub type SharedPoolRepository = Arc<dyn PoolRepository>;
pub type SharedLedgerRepository = Arc<dyn LedgerRepository>;
pub type SharedIntegrationRepository = Arc<dyn IntegrationRepository>;

/// The three repositories an engine needs, usually backed by one store
#[derive(Clone)]
pub struct Repositories {
    pub pool: SharedPoolRepository,
    pub ledger: SharedLedgerRepository,
    pub integrations: SharedIntegrationRepository,
}

impl Repositories {
    /// Share one store behind all three traits
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PoolRepository + LedgerRepository + IntegrationRepository + 'static,
    {
        Self {
            pool: store.clone(),
            ledger: store.clone(),
            integrations: store,
        }
    }

    /// Open (or create) the SQLite store at `path`
    pub fn sqlite(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_store(Arc::new(SqliteStore::new(path)?)))
    }

    /// Fresh in-memory store
    pub fn memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }
}

// ============================================================================
// Row Helpers
// ============================================================================

fn to_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

const CONTENT_COLUMNS: &str = "id, body, platform, hashtags, target_site, category, season, content_type, tone, cta, \
     is_active, usage_count, last_used_at, created_at";

const IMAGE_COLUMNS: &str = "id, filename, file_path, category, alt_text, is_active, usage_count, last_used_at, created_at";

const RECORD_COLUMNS: &str = "id, platform, content, status, external_id, error, content_item_id, image_ref, schedule, \
     created_at, posted_at, impressions, reach, clicks, likes, comments, shares, metrics_updated_at";

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<ContentItem> {
    let hashtags: String = row.get(3)?;
    let season: String = row.get(6)?;
    let usage: i64 = row.get(11)?;
    Ok(ContentItem {
        id: row.get(0)?,
        body: row.get(1)?,
        platform: PlatformScope::from(row.get::<_, String>(2)?),
        hashtags: serde_json::from_str(&hashtags).unwrap_or_default(),
        target_site: row.get(4)?,
        category: row.get(5)?,
        season: season.parse().unwrap_or_default(),
        content_type: row.get(7)?,
        tone: row.get(8)?,
        cta: row.get(9)?,
        is_active: row.get(10)?,
        usage_count: u32::try_from(usage).unwrap_or(u32::MAX),
        last_used_at: parse_opt_ts(row.get(12)?),
        created_at: parse_ts(&row.get::<_, String>(13)?),
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageAsset> {
    let usage: i64 = row.get(6)?;
    Ok(ImageAsset {
        id: row.get(0)?,
        filename: row.get(1)?,
        file_path: row.get(2)?,
        category: row.get(3)?,
        alt_text: row.get(4)?,
        is_active: row.get(5)?,
        usage_count: u32::try_from(usage).unwrap_or(u32::MAX),
        last_used_at: parse_opt_ts(row.get(7)?),
        created_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryRecord> {
    let status: String = row.get(3)?;
    Ok(DeliveryRecord {
        id: row.get(0)?,
        platform: row.get(1)?,
        content: row.get(2)?,
        status: status.parse().unwrap_or(DeliveryStatus::Failed),
        external_id: row.get(4)?,
        error: row.get(5)?,
        content_item_id: row.get(6)?,
        image_ref: row.get(7)?,
        schedule: row.get(8)?,
        created_at: parse_ts(&row.get::<_, String>(9)?),
        posted_at: parse_opt_ts(row.get(10)?),
        metrics: EngagementMetrics {
            impressions: to_u64(row.get(11)?),
            reach: to_u64(row.get(12)?),
            clicks: to_u64(row.get(13)?),
            likes: to_u64(row.get(14)?),
            comments: to_u64(row.get(15)?),
            shares: to_u64(row.get(16)?),
        },
        metrics_updated_at: parse_opt_ts(row.get(17)?),
    })
}

fn build_content(item: &NewContentItem, now: DateTime<Utc>) -> ContentItem {
    ContentItem {
        id: Uuid::new_v4().to_string(),
        body: item.body.clone(),
        platform: item.platform.clone(),
        hashtags: item.hashtags.clone(),
        target_site: item.target_site.clone(),
        category: item.category.clone(),
        season: item.season,
        content_type: item.content_type.clone(),
        tone: item.tone.clone(),
        cta: item.cta.clone(),
        is_active: true,
        usage_count: 0,
        last_used_at: None,
        created_at: now,
    }
}

fn build_image(image: &NewImageAsset, now: DateTime<Utc>) -> ImageAsset {
    ImageAsset {
        id: Uuid::new_v4().to_string(),
        filename: image.filename.clone(),
        file_path: image.resolved_path(),
        category: image.category.clone(),
        alt_text: image.alt_text.clone(),
        is_active: true,
        usage_count: 0,
        last_used_at: None,
        created_at: now,
    }
}

fn build_record(record: &NewDeliveryRecord, at: DateTime<Utc>) -> DeliveryRecord {
    DeliveryRecord {
        id: Uuid::new_v4().to_string(),
        platform: record.platform.clone(),
        content: record.content.clone(),
        status: record.status,
        external_id: record.external_id.clone(),
        error: record.error.clone(),
        content_item_id: record.content_item_id.clone(),
        image_ref: record.image_ref.clone(),
        schedule: record.schedule.clone(),
        created_at: at,
        posted_at: (record.status == DeliveryStatus::Posted).then_some(at),
        metrics: EngagementMetrics::default(),
        metrics_updated_at: None,
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite store implementing every repository trait
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS content_items (
                    id TEXT PRIMARY KEY,
                    body TEXT NOT NULL,
                    platform TEXT NOT NULL DEFAULT 'all',
                    hashtags TEXT NOT NULL DEFAULT '[]',
                    target_site TEXT NOT NULL,
                    category TEXT,
                    season TEXT NOT NULL DEFAULT 'all',
                    content_type TEXT,
                    tone TEXT,
                    cta TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    usage_count INTEGER NOT NULL DEFAULT 0,
                    last_used_at TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_content_items_active
                    ON content_items(is_active);

                CREATE TABLE IF NOT EXISTS image_assets (
                    id TEXT PRIMARY KEY,
                    filename TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    category TEXT,
                    alt_text TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    usage_count INTEGER NOT NULL DEFAULT 0,
                    last_used_at TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_image_assets_active
                    ON image_assets(is_active);

                CREATE TABLE IF NOT EXISTS delivery_records (
                    id TEXT PRIMARY KEY,
                    platform TEXT NOT NULL,
                    content TEXT NOT NULL,
                    status TEXT NOT NULL,
                    external_id TEXT,
                    error TEXT,
                    content_item_id TEXT,
                    image_ref TEXT,
                    schedule TEXT,
                    created_at TEXT NOT NULL,
                    posted_at TEXT,
                    impressions INTEGER NOT NULL DEFAULT 0,
                    reach INTEGER NOT NULL DEFAULT 0,
                    clicks INTEGER NOT NULL DEFAULT 0,
                    likes INTEGER NOT NULL DEFAULT 0,
                    comments INTEGER NOT NULL DEFAULT 0,
                    shares INTEGER NOT NULL DEFAULT 0,
                    metrics_updated_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_delivery_records_status
                    ON delivery_records(status);

                CREATE INDEX IF NOT EXISTS idx_delivery_records_created
                    ON delivery_records(created_at);

                CREATE TABLE IF NOT EXISTS channel_integrations (
                    tenant_id TEXT PRIMARY KEY,
                    facebook_page_id TEXT,
                    facebook_page_access_token TEXT,
                    facebook_connected INTEGER NOT NULL DEFAULT 0,
                    instagram_account_id TEXT,
                    instagram_connected INTEGER NOT NULL DEFAULT 0,
                    x_access_token TEXT,
                    x_connected INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT
                );
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }
}

impl PoolRepository for SqliteStore {
    fn insert_content(&self, item: &NewContentItem) -> Result<ContentItem> {
        let content = build_content(item, Utc::now());
        let hashtags = serde_json::to_string(&content.hashtags)?;
        let conn = self.conn()?;

        conn.execute(
            r#"
                INSERT INTO content_items (id, body, platform, hashtags, target_site, category, season,
                                           content_type, tone, cta, is_active, usage_count, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, 0, ?11)
                "#,
            params![
                content.id,
                content.body,
                content.platform.as_str(),
                hashtags,
                content.target_site,
                content.category,
                content.season.as_str(),
                content.content_type,
                content.tone,
                content.cta,
                to_ts(&content.created_at),
            ],
        )
        .context("Failed to insert content item")?;

        Ok(content)
    }

    fn insert_image(&self, image: &NewImageAsset) -> Result<ImageAsset> {
        let asset = build_image(image, Utc::now());
        let conn = self.conn()?;

        conn.execute(
            r#"
                INSERT INTO image_assets (id, filename, file_path, category, alt_text, is_active, usage_count, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, ?6)
                "#,
            params![
                asset.id,
                asset.filename,
                asset.file_path,
                asset.category,
                asset.alt_text,
                to_ts(&asset.created_at),
            ],
        )
        .context("Failed to insert image asset")?;

        Ok(asset)
    }

    fn active_content(&self) -> Result<Vec<ContentItem>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CONTENT_COLUMNS} FROM content_items WHERE is_active = 1 ORDER BY rowid"
            ))
            .context("Failed to prepare content query")?;

        let items = stmt
            .query_map([], content_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load active content")?;

        Ok(items)
    }

    fn active_images(&self) -> Result<Vec<ImageAsset>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {IMAGE_COLUMNS} FROM image_assets WHERE is_active = 1 ORDER BY rowid"
            ))
            .context("Failed to prepare image query")?;

        let images = stmt
            .query_map([], image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load active images")?;

        Ok(images)
    }

    fn get_content(&self, id: &str) -> Result<Option<ContentItem>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                &format!("SELECT {CONTENT_COLUMNS} FROM content_items WHERE id = ?1"),
                params![id],
                content_from_row,
            )
            .optional()
            .context("Failed to get content item")?;

        Ok(item)
    }

    fn get_image(&self, id: &str) -> Result<Option<ImageAsset>> {
        let conn = self.conn()?;
        let image = conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM image_assets WHERE id = ?1"),
                params![id],
                image_from_row,
            )
            .optional()
            .context("Failed to get image asset")?;

        Ok(image)
    }

    fn record_content_usage(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE content_items SET usage_count = usage_count + 1, last_used_at = ?2 WHERE id = ?1",
            params![id, to_ts(&at)],
        )
        .context("Failed to record content usage")?;
        Ok(())
    }

    fn record_image_usage(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE image_assets SET usage_count = usage_count + 1, last_used_at = ?2 WHERE id = ?1",
            params![id, to_ts(&at)],
        )
        .context("Failed to record image usage")?;
        Ok(())
    }

    fn set_content_active(&self, id: &str, active: bool) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE content_items SET is_active = ?2 WHERE id = ?1",
                params![id, active],
            )
            .context("Failed to update content item")?;
        Ok(changed > 0)
    }

    fn count_active_content(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM content_items WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_active_images(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM image_assets WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl LedgerRepository for SqliteStore {
    fn append(&self, record: &NewDeliveryRecord, at: DateTime<Utc>) -> Result<DeliveryRecord> {
        let row = build_record(record, at);
        let conn = self.conn()?;

        conn.execute(
            r#"
                INSERT INTO delivery_records (id, platform, content, status, external_id, error,
                                              content_item_id, image_ref, schedule, created_at, posted_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            params![
                row.id,
                row.platform,
                row.content,
                row.status.as_str(),
                row.external_id,
                row.error,
                row.content_item_id,
                row.image_ref,
                row.schedule,
                to_ts(&row.created_at),
                row.posted_at.as_ref().map(to_ts),
            ],
        )
        .context("Failed to append delivery record")?;

        Ok(row)
    }

    fn history(&self, limit: usize) -> Result<Vec<DeliveryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM delivery_records ORDER BY rowid DESC LIMIT ?1"
            ))
            .context("Failed to prepare history query")?;

        let rows = stmt
            .query_map(params![limit as i64], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load delivery history")?;

        Ok(rows)
    }

    fn all_records(&self) -> Result<Vec<DeliveryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM delivery_records ORDER BY rowid"))
            .context("Failed to prepare ledger scan")?;

        let rows = stmt
            .query_map([], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to scan delivery records")?;

        Ok(rows)
    }

    fn posted_with_external_id(&self, offset: usize, limit: usize) -> Result<Vec<DeliveryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM delivery_records
                 WHERE status = 'posted' AND external_id IS NOT NULL AND external_id != ''
                 ORDER BY rowid LIMIT ?1 OFFSET ?2"
            ))
            .context("Failed to prepare posted-records query")?;

        let rows = stmt
            .query_map(params![limit as i64, offset as i64], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load posted records")?;

        Ok(rows)
    }

    fn update_metrics(&self, id: &str, metrics: &EngagementMetrics, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                r#"
                    UPDATE delivery_records
                    SET impressions = ?2, reach = ?3, clicks = ?4, likes = ?5, comments = ?6, shares = ?7,
                        metrics_updated_at = ?8
                    WHERE id = ?1
                    "#,
                params![
                    id,
                    to_i64(metrics.impressions),
                    to_i64(metrics.reach),
                    to_i64(metrics.clicks),
                    to_i64(metrics.likes),
                    to_i64(metrics.comments),
                    to_i64(metrics.shares),
                    to_ts(&at),
                ],
            )
            .context("Failed to update delivery metrics")?;

        Ok(changed > 0)
    }

    fn count_by_status(&self, status: DeliveryStatus) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM delivery_records WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl IntegrationRepository for SqliteStore {
    fn get_integration(&self, tenant_id: &str) -> Result<Option<ChannelIntegration>> {
        let conn = self.conn()?;
        let integration = conn
            .query_row(
                r#"
                    SELECT tenant_id, facebook_page_id, facebook_page_access_token, facebook_connected,
                           instagram_account_id, instagram_connected, x_access_token, x_connected, updated_at
                    FROM channel_integrations WHERE tenant_id = ?1
                    "#,
                params![tenant_id],
                |row| {
                    Ok(ChannelIntegration {
                        tenant_id: row.get(0)?,
                        facebook_page_id: row.get(1)?,
                        facebook_page_access_token: row.get(2)?,
                        facebook_connected: row.get(3)?,
                        instagram_account_id: row.get(4)?,
                        instagram_connected: row.get(5)?,
                        x_access_token: row.get(6)?,
                        x_connected: row.get(7)?,
                        updated_at: parse_opt_ts(row.get(8)?),
                    })
                },
            )
            .optional()
            .context("Failed to load channel integration")?;

        Ok(integration)
    }

    fn upsert_integration(&self, integration: &ChannelIntegration) -> Result<()> {
        let conn = self.conn()?;
        let updated_at = integration.updated_at.unwrap_or_else(Utc::now);

        conn.execute(
            r#"
                INSERT INTO channel_integrations (tenant_id, facebook_page_id, facebook_page_access_token,
                    facebook_connected, instagram_account_id, instagram_connected, x_access_token,
                    x_connected, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    facebook_page_id = excluded.facebook_page_id,
                    facebook_page_access_token = excluded.facebook_page_access_token,
                    facebook_connected = excluded.facebook_connected,
                    instagram_account_id = excluded.instagram_account_id,
                    instagram_connected = excluded.instagram_connected,
                    x_access_token = excluded.x_access_token,
                    x_connected = excluded.x_connected,
                    updated_at = excluded.updated_at
                "#,
            params![
                integration.tenant_id,
                integration.facebook_page_id,
                integration.facebook_page_access_token,
                integration.facebook_connected,
                integration.instagram_account_id,
                integration.instagram_connected,
                integration.x_access_token,
                integration.x_connected,
                to_ts(&updated_at),
            ],
        )
        .context("Failed to upsert channel integration")?;

        Ok(())
    }
}

// ============================================================================
// In-Memory Implementation (for testing)
// ============================================================================

/// In-memory store implementing every repository trait
///
/// Useful for testing without database dependencies.
#[derive(Default)]
pub struct MemoryStore {
    content: RwLock<Vec<ContentItem>>,
    images: RwLock<Vec<ImageAsset>>,
    records: RwLock<Vec<DeliveryRecord>>,
    integrations: RwLock<Vec<ChannelIntegration>>,
}

fn read<'a, T>(lock: &'a RwLock<T>, what: &str) -> Result<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| anyhow!("{what} lock poisoned"))
}

fn write<'a, T>(lock: &'a RwLock<T>, what: &str) -> Result<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| anyhow!("{what} lock poisoned"))
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledger rows
    pub fn record_count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }
}

impl PoolRepository for MemoryStore {
    fn insert_content(&self, item: &NewContentItem) -> Result<ContentItem> {
        let content = build_content(item, Utc::now());
        write(&self.content, "content")?.push(content.clone());
        Ok(content)
    }

    fn insert_image(&self, image: &NewImageAsset) -> Result<ImageAsset> {
        let asset = build_image(image, Utc::now());
        write(&self.images, "images")?.push(asset.clone());
        Ok(asset)
    }

    fn active_content(&self) -> Result<Vec<ContentItem>> {
        Ok(read(&self.content, "content")?
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    fn active_images(&self) -> Result<Vec<ImageAsset>> {
        Ok(read(&self.images, "images")?
            .iter()
            .filter(|i| i.is_active)
            .cloned()
            .collect())
    }

    fn get_content(&self, id: &str) -> Result<Option<ContentItem>> {
        Ok(read(&self.content, "content")?.iter().find(|c| c.id == id).cloned())
    }

    fn get_image(&self, id: &str) -> Result<Option<ImageAsset>> {
        Ok(read(&self.images, "images")?.iter().find(|i| i.id == id).cloned())
    }

    fn record_content_usage(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(item) = write(&self.content, "content")?.iter_mut().find(|c| c.id == id) {
            item.usage_count = item.usage_count.saturating_add(1);
            item.last_used_at = Some(at);
        }
        Ok(())
    }

    fn record_image_usage(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(image) = write(&self.images, "images")?.iter_mut().find(|i| i.id == id) {
            image.usage_count = image.usage_count.saturating_add(1);
            image.last_used_at = Some(at);
        }
        Ok(())
    }

    fn set_content_active(&self, id: &str, active: bool) -> Result<bool> {
        let mut content = write(&self.content, "content")?;
        match content.iter_mut().find(|c| c.id == id) {
            Some(item) => {
                item.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl LedgerRepository for MemoryStore {
    fn append(&self, record: &NewDeliveryRecord, at: DateTime<Utc>) -> Result<DeliveryRecord> {
        let row = build_record(record, at);
        write(&self.records, "records")?.push(row.clone());
        Ok(row)
    }

    fn history(&self, limit: usize) -> Result<Vec<DeliveryRecord>> {
        Ok(read(&self.records, "records")?
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn all_records(&self) -> Result<Vec<DeliveryRecord>> {
        Ok(read(&self.records, "records")?.clone())
    }

    fn posted_with_external_id(&self, offset: usize, limit: usize) -> Result<Vec<DeliveryRecord>> {
        Ok(read(&self.records, "records")?
            .iter()
            .filter(|r| r.status == DeliveryStatus::Posted)
            .filter(|r| r.external_id.as_deref().is_some_and(|id| !id.is_empty()))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_metrics(&self, id: &str, metrics: &EngagementMetrics, at: DateTime<Utc>) -> Result<bool> {
        let mut records = write(&self.records, "records")?;
        match records.iter_mut().find(|r| r.id == id) {
            Some(row) => {
                row.metrics = *metrics;
                row.metrics_updated_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count_by_status(&self, status: DeliveryStatus) -> Result<usize> {
        Ok(read(&self.records, "records")?
            .iter()
            .filter(|r| r.status == status)
            .count())
    }
}

impl IntegrationRepository for MemoryStore {
    fn get_integration(&self, tenant_id: &str) -> Result<Option<ChannelIntegration>> {
        Ok(read(&self.integrations, "integrations")?
            .iter()
            .find(|i| i.tenant_id == tenant_id)
            .cloned())
    }

    fn upsert_integration(&self, integration: &ChannelIntegration) -> Result<()> {
        let mut stored = integration.clone();
        stored.updated_at = Some(integration.updated_at.unwrap_or_else(Utc::now));

        let mut integrations = write(&self.integrations, "integrations")?;
        match integrations.iter_mut().find(|i| i.tenant_id == integration.tenant_id) {
            Some(existing) => *existing = stored,
            None => integrations.push(stored),
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Season;
    use chrono::Duration;

    // Each test runs against both implementations
    fn create_test_stores() -> Vec<Repositories> {
        vec![
            Repositories::from_store(Arc::new(SqliteStore::in_memory().unwrap())),
            Repositories::memory(),
        ]
    }

    #[test]
    fn test_insert_and_list_content_in_pool_order() {
        for repos in create_test_stores() {
            let a = repos
                .pool
                .insert_content(
                    &NewContentItem::new("first")
                        .with_hashtags(["GarageBot", "Deal"])
                        .with_season(Season::Winter),
                )
                .unwrap();
            let b = repos.pool.insert_content(&NewContentItem::new("second").with_platform("x")).unwrap();

            let active = repos.pool.active_content().unwrap();
            assert_eq!(active.len(), 2);
            assert_eq!(active[0].id, a.id);
            assert_eq!(active[1].id, b.id);
            assert_eq!(active[0].hashtags, vec!["GarageBot", "Deal"]);
            assert_eq!(active[0].season, Season::Winter);
            assert_eq!(active[1].platform, PlatformScope::Platform("x".to_string()));
            assert_eq!(active[0].usage_count, 0);
            assert!(active[0].last_used_at.is_none());
        }
    }

    #[test]
    fn test_inactive_content_hidden() {
        for repos in create_test_stores() {
            let a = repos.pool.insert_content(&NewContentItem::new("retired")).unwrap();
            repos.pool.insert_content(&NewContentItem::new("live")).unwrap();

            assert!(repos.pool.set_content_active(&a.id, false).unwrap());
            assert!(!repos.pool.set_content_active("missing", false).unwrap());

            let active = repos.pool.active_content().unwrap();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].body, "live");
            assert_eq!(repos.pool.count_active_content().unwrap(), 1);
        }
    }

    #[test]
    fn test_record_usage() {
        for repos in create_test_stores() {
            let item = repos.pool.insert_content(&NewContentItem::new("body")).unwrap();
            let image = repos.pool.insert_image(&NewImageAsset::new("brake_parts.png")).unwrap();
            assert_eq!(image.file_path, "/generated_images/brake_parts.png");

            let at = Utc::now();
            repos.pool.record_content_usage(&item.id, at).unwrap();
            repos.pool.record_content_usage(&item.id, at).unwrap();
            repos.pool.record_image_usage(&image.id, at).unwrap();

            let item = repos.pool.get_content(&item.id).unwrap().unwrap();
            assert_eq!(item.usage_count, 2);
            assert_eq!(item.last_used_at.map(|t| t.timestamp()), Some(at.timestamp()));

            let image = repos.pool.get_image(&image.id).unwrap().unwrap();
            assert_eq!(image.usage_count, 1);
        }
    }

    #[test]
    fn test_append_sets_posted_at_only_when_posted() {
        for repos in create_test_stores() {
            let at = Utc::now();
            let posted = repos
                .ledger
                .append(&NewDeliveryRecord::posted("x", "hello", Some("t1".to_string())), at)
                .unwrap();
            let failed = repos
                .ledger
                .append(&NewDeliveryRecord::failed("facebook", "hello", "token expired"), at)
                .unwrap();

            assert!(posted.posted_at.is_some());
            assert!(failed.posted_at.is_none());
            assert_eq!(failed.error.as_deref(), Some("token expired"));

            assert_eq!(repos.ledger.count_by_status(DeliveryStatus::Posted).unwrap(), 1);
            assert_eq!(repos.ledger.count_by_status(DeliveryStatus::Failed).unwrap(), 1);
        }
    }

    #[test]
    fn test_history_newest_first() {
        for repos in create_test_stores() {
            let base = Utc::now();
            for i in 0..5 {
                repos
                    .ledger
                    .append(
                        &NewDeliveryRecord::posted("x", format!("post {i}"), Some(format!("id{i}"))),
                        base + Duration::seconds(i),
                    )
                    .unwrap();
            }

            let history = repos.ledger.history(3).unwrap();
            assert_eq!(history.len(), 3);
            assert_eq!(history[0].content, "post 4");
            assert_eq!(history[2].content, "post 2");

            let all = repos.ledger.all_records().unwrap();
            assert_eq!(all.len(), 5);
            assert_eq!(all[0].content, "post 0");
        }
    }

    #[test]
    fn test_posted_with_external_id() {
        for repos in create_test_stores() {
            let at = Utc::now();
            repos.ledger.append(&NewDeliveryRecord::posted("x", "a", Some("1".into())), at).unwrap();
            repos.ledger.append(&NewDeliveryRecord::posted("webhook", "b", None), at).unwrap();
            repos.ledger.append(&NewDeliveryRecord::failed("facebook", "c", "boom"), at).unwrap();

            repos.ledger.append(&NewDeliveryRecord::posted("facebook", "d", Some("2".into())), at).unwrap();

            let rows = repos.ledger.posted_with_external_id(0, 100).unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].platform, "x");
            assert_eq!(rows[1].platform, "facebook");

            let rest = repos.ledger.posted_with_external_id(1, 100).unwrap();
            assert_eq!(rest.len(), 1);
            assert_eq!(rest[0].external_id.as_deref(), Some("2"));
            assert!(repos.ledger.posted_with_external_id(2, 100).unwrap().is_empty());
        }
    }

    #[test]
    fn test_update_metrics_overwrites() {
        for repos in create_test_stores() {
            let row = repos
                .ledger
                .append(&NewDeliveryRecord::posted("x", "a", Some("1".into())), Utc::now())
                .unwrap();

            let first = EngagementMetrics {
                likes: 5,
                ..Default::default()
            };
            let second = EngagementMetrics {
                likes: 3,
                comments: 1,
                impressions: 40,
                ..Default::default()
            };
            assert!(repos.ledger.update_metrics(&row.id, &first, Utc::now()).unwrap());
            assert!(repos.ledger.update_metrics(&row.id, &second, Utc::now()).unwrap());
            assert!(!repos.ledger.update_metrics("missing", &second, Utc::now()).unwrap());

            let stored = &repos.ledger.all_records().unwrap()[0];
            assert_eq!(stored.metrics, second);
            assert!(stored.metrics_updated_at.is_some());
        }
    }

    #[test]
    fn test_integration_upsert() {
        for repos in create_test_stores() {
            assert!(repos.integrations.get_integration("garagebot").unwrap().is_none());

            let mut integration = ChannelIntegration::for_tenant("garagebot");
            integration.x_access_token = Some("tok".to_string());
            integration.refresh_flags();
            repos.integrations.upsert_integration(&integration).unwrap();

            integration.facebook_page_id = Some("123".to_string());
            repos.integrations.upsert_integration(&integration).unwrap();

            let stored = repos.integrations.get_integration("garagebot").unwrap().unwrap();
            assert!(stored.x_connected);
            assert_eq!(stored.facebook_page_id.as_deref(), Some("123"));
            assert!(stored.updated_at.is_some());
        }
    }

    #[test]
    fn test_sqlite_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("promocast.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.insert_content(&NewContentItem::new("persisted")).unwrap();
        }

        let reopened = SqliteStore::new(&path).unwrap();
        let active = reopened.active_content().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].body, "persisted");
    }
}
