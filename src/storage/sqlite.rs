use crate::models::{ClickEvent, ClickRow, Link, LinkRow};
use crate::storage::{EventStore, LinkStore, ListPage, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                short_code TEXT NOT NULL UNIQUE,
                original_url TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_created ON links(created_at DESC, id DESC)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id INTEGER NOT NULL REFERENCES links(id),
                accessed_at INTEGER NOT NULL,
                ip_address TEXT,
                browser TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_click_events_link ON click_events(link_id, accessed_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LinkStore for SqliteStorage {
    async fn insert_if_absent(
        &self,
        short_code: &str,
        original_url: &str,
    ) -> StorageResult<Link> {
        let created_at = Utc::now().timestamp_millis();

        // The UNIQUE constraint on short_code serializes competing inserts
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            INSERT INTO links (short_code, original_url, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(short_code) DO NOTHING
            RETURNING id, short_code, original_url, created_at
            "#,
        )
        .bind(short_code)
        .bind(original_url)
        .bind(created_at)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Link::from).ok_or(StorageError::Conflict)
    }

    async fn get(&self, short_code: &str) -> StorageResult<Option<Link>> {
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT id, short_code, original_url, created_at
            FROM links
            WHERE short_code = ?
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Link::from))
    }

    async fn list(&self, page: ListPage) -> StorageResult<Vec<Link>> {
        let limit = page.limit.unwrap_or(i64::MAX);

        let rows = if let Some(after) = page.after {
            sqlx::query_as::<_, LinkRow>(
                r#"
                SELECT id, short_code, original_url, created_at
                FROM links
                WHERE created_at < ? OR (created_at = ? AND id < ?)
                ORDER BY created_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .bind(after.created_at)
            .bind(after.created_at)
            .bind(after.id)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?
        } else {
            sqlx::query_as::<_, LinkRow>(
                r#"
                SELECT id, short_code, original_url, created_at
                FROM links
                ORDER BY created_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?
        };

        Ok(rows.into_iter().map(Link::from).collect())
    }
}

#[async_trait]
impl EventStore for SqliteStorage {
    async fn append(&self, events: &[ClickEvent]) -> StorageResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO click_events (link_id, accessed_at, ip_address, browser)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(event.link_id)
            .bind(event.accessed_at.timestamp_millis())
            .bind(event.ip_address.as_deref())
            .bind(event.browser.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn events_for_link(&self, link_id: i64) -> StorageResult<Vec<ClickEvent>> {
        let rows = sqlx::query_as::<_, ClickRow>(
            r#"
            SELECT link_id, accessed_at, ip_address, browser
            FROM click_events
            WHERE link_id = ?
            ORDER BY accessed_at DESC, id DESC
            "#,
        )
        .bind(link_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(ClickEvent::from).collect())
    }
}
