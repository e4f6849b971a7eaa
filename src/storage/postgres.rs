use crate::models::{ClickEvent, ClickRow, Link, LinkRow};
use crate::storage::{EventStore, LinkStore, ListPage, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id BIGSERIAL PRIMARY KEY,
                short_code TEXT NOT NULL UNIQUE,
                original_url TEXT NOT NULL,
                created_at BIGINT NOT NULL
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
                id BIGSERIAL PRIMARY KEY,
                link_id BIGINT NOT NULL REFERENCES links(id),
                accessed_at BIGINT NOT NULL,
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
impl LinkStore for PostgresStorage {
    async fn insert_if_absent(
        &self,
        short_code: &str,
        original_url: &str,
    ) -> StorageResult<Link> {
        let created_at = Utc::now().timestamp_millis();

        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            INSERT INTO links (short_code, original_url, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (short_code) DO NOTHING
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
            WHERE short_code = $1
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
                WHERE created_at < $1 OR (created_at = $1 AND id < $2)
                ORDER BY created_at DESC, id DESC
                LIMIT $3
                "#,
            )
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
                LIMIT $1
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
impl EventStore for PostgresStorage {
    async fn append(&self, events: &[ClickEvent]) -> StorageResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        // 4 binds per row; stay well below the 65535 parameter limit
        for chunk in events.chunks(1000) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO click_events (link_id, accessed_at, ip_address, browser) ",
            );
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(event.link_id)
                    .push_bind(event.accessed_at.timestamp_millis())
                    .push_bind(event.ip_address.clone())
                    .push_bind(event.browser.clone());
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn events_for_link(&self, link_id: i64) -> StorageResult<Vec<ClickEvent>> {
        let rows = sqlx::query_as::<_, ClickRow>(
            r#"
            SELECT link_id, accessed_at, ip_address, browser
            FROM click_events
            WHERE link_id = $1
            ORDER BY accessed_at DESC, id DESC
            "#,
        )
        .bind(link_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(ClickEvent::from).collect())
    }
}
