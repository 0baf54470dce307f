//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{PageRow, PersistedState, RootRow, SnapshotRow};
use crate::config::MonitorConfig;
use crate::domain::{Page, PageUrl, RootKey, RootSite, Snapshot};
use crate::error::MonitorError;

type SnapshotTuple = (
    i64,
    String,
    String,
    DateTime<Utc>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    i64,
    i64,
);

fn db_err(e: impl std::fmt::Display) -> MonitorError {
    MonitorError::PersistenceError(e.to_string())
}

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool from configuration and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(db_err)?;
        let persistence = Self::new(pool);
        persistence.migrate().await?;
        Ok(persistence)
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on migration failure.
    pub async fn migrate(&self) -> Result<(), MonitorError> {
        sqlx::migrate!().run(&self.pool).await.map_err(db_err)
    }

    /// Upserts a root site.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on database failure.
    pub async fn save_root(&self, root: &RootSite) -> Result<(), MonitorError> {
        let row = RootRow::from(root);
        sqlx::query(
            "INSERT INTO roots (root_key, interval_value, interval_unit, schedule_active, \
             master_summary, api_key, capture_screenshot, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (root_key) DO UPDATE SET interval_value = EXCLUDED.interval_value, \
             interval_unit = EXCLUDED.interval_unit, schedule_active = EXCLUDED.schedule_active, \
             master_summary = EXCLUDED.master_summary, api_key = EXCLUDED.api_key, \
             capture_screenshot = EXCLUDED.capture_screenshot",
        )
        .bind(&row.root_key)
        .bind(row.interval_value)
        .bind(&row.interval_unit)
        .bind(row.schedule_active)
        .bind(&row.master_summary)
        .bind(&row.api_key)
        .bind(row.capture_screenshot)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Upserts a page.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on database failure.
    pub async fn save_page(&self, page: &Page) -> Result<(), MonitorError> {
        let row = PageRow::from(page);
        sqlx::query(
            "INSERT INTO pages (url, root_key, last_scraped, summary, capture_screenshot, api_key, added_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (url) DO UPDATE SET root_key = EXCLUDED.root_key, \
             last_scraped = EXCLUDED.last_scraped, summary = EXCLUDED.summary, \
             capture_screenshot = EXCLUDED.capture_screenshot, api_key = EXCLUDED.api_key",
        )
        .bind(&row.url)
        .bind(&row.root_key)
        .bind(row.last_scraped)
        .bind(&row.summary)
        .bind(row.capture_screenshot)
        .bind(&row.api_key)
        .bind(row.added_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Inserts a snapshot. Snapshots are immutable, so a replayed insert
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on database failure.
    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), MonitorError> {
        let row = SnapshotRow::from(snapshot);
        sqlx::query(
            "INSERT INTO snapshots (seq, page_url, root_key, captured_at, status, error, content, \
             content_hash, summary, changed, duration_ms, bytes_fetched) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (seq) DO NOTHING",
        )
        .bind(row.seq)
        .bind(&row.page_url)
        .bind(&row.root_key)
        .bind(row.captured_at)
        .bind(&row.status)
        .bind(&row.error)
        .bind(&row.content)
        .bind(&row.content_hash)
        .bind(&row.summary)
        .bind(row.changed)
        .bind(row.duration_ms)
        .bind(row.bytes_fetched)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Deletes a root with its pages and snapshots in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on database failure.
    pub async fn delete_root(&self, key: &RootKey) -> Result<u64, MonitorError> {
        let key = key.to_string();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let snapshots = sqlx::query(
            "DELETE FROM snapshots WHERE root_key = $1 \
             OR page_url IN (SELECT url FROM pages WHERE root_key = $1)",
        )
        .bind(&key)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        for table in ["DELETE FROM pages WHERE root_key = $1", "DELETE FROM roots WHERE root_key = $1"] {
            sqlx::query(table)
                .bind(&key)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(snapshots.rows_affected())
    }

    /// Deletes a page and its snapshots.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on database failure.
    pub async fn delete_page(&self, url: &PageUrl) -> Result<u64, MonitorError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let snapshots = sqlx::query("DELETE FROM snapshots WHERE page_url = $1")
            .bind(url.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM pages WHERE url = $1")
            .bind(url.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(snapshots.rows_affected())
    }

    /// Deletes snapshots captured before `cutoff`, keeping the latest
    /// snapshot of every page.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on database failure.
    pub async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<u64, MonitorError> {
        let result = sqlx::query(
            "DELETE FROM snapshots WHERE captured_at < $1 \
             AND seq NOT IN (SELECT MAX(seq) FROM snapshots GROUP BY page_url)",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    /// Loads every root, page and snapshot.
    ///
    /// Rows that no longer parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on database failure.
    pub async fn load_state(&self) -> Result<PersistedState, MonitorError> {
        let roots = sqlx::query_as::<_, (String, Option<i32>, Option<String>, bool, Option<String>, Option<String>, bool, DateTime<Utc>)>(
            "SELECT root_key, interval_value, interval_unit, schedule_active, master_summary, \
             api_key, capture_screenshot, created_at FROM roots ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(
            |(root_key, interval_value, interval_unit, schedule_active, master_summary, api_key, capture_screenshot, created_at)| {
                RootRow {
                    root_key,
                    interval_value,
                    interval_unit,
                    schedule_active,
                    master_summary,
                    api_key,
                    capture_screenshot,
                    created_at,
                }
            },
        );

        let pages = sqlx::query_as::<_, (String, String, Option<DateTime<Utc>>, Option<String>, bool, Option<String>, DateTime<Utc>)>(
            "SELECT url, root_key, last_scraped, summary, capture_screenshot, api_key, added_at \
             FROM pages ORDER BY added_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(
            |(url, root_key, last_scraped, summary, capture_screenshot, api_key, added_at)| PageRow {
                url,
                root_key,
                last_scraped,
                summary,
                capture_screenshot,
                api_key,
                added_at,
            },
        );

        let snapshots = sqlx::query_as::<_, SnapshotTuple>(
            "SELECT seq, page_url, root_key, captured_at, status, error, content, content_hash, \
             summary, changed, duration_ms, bytes_fetched FROM snapshots ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(
            |(seq, page_url, root_key, captured_at, status, error, content, content_hash, summary, changed, duration_ms, bytes_fetched)| {
                SnapshotRow {
                    seq,
                    page_url,
                    root_key,
                    captured_at,
                    status,
                    error,
                    content,
                    content_hash,
                    summary,
                    changed,
                    duration_ms,
                    bytes_fetched,
                }
            },
        );

        Ok(PersistedState {
            roots: convert_rows(roots, "root"),
            pages: convert_rows(pages, "page"),
            snapshots: convert_rows(snapshots, "snapshot"),
        })
    }

    /// Appends an event to the event log.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError::PersistenceError`] on database failure.
    pub async fn save_event(
        &self,
        root_key: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64, MonitorError> {
        let row = sqlx::query_scalar::<_, i64>(
            "INSERT INTO events (root_key, event_type, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(root_key)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row)
    }
}

fn convert_rows<R, T>(rows: impl Iterator<Item = R>, what: &str) -> Vec<T>
where
    T: TryFrom<R, Error = MonitorError>,
{
    rows.filter_map(|row| match T::try_from(row) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "skipping unreadable {what} row");
            None
        }
    })
    .collect()
}
