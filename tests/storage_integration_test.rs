//! Storage backend tests shared by every backend
//!
//! SQLite and the in-memory store always run. PostgreSQL runs too when
//! `TEST_POSTGRES_URL` points at a server; each call to `backends()` gets a
//! fresh schema there, so reruns never see earlier rows.

use chrono::{Duration, Utc};
use relink::config::{DatabaseBackend, DatabaseConfig};
use relink::models::ClickEvent;
use relink::storage::{self, ListPage, StorageError, Stores};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

static SCHEMA_SEQ: AtomicUsize = AtomicUsize::new(0);

async fn open(config: &DatabaseConfig) -> Stores {
    storage::open(config).await.unwrap()
}

fn config(backend: DatabaseBackend, url: &str) -> DatabaseConfig {
    DatabaseConfig {
        backend,
        url: url.to_string(),
        max_connections: 5,
    }
}

/// Create an empty schema and return a URL whose search_path points at it
async fn postgres_test_url(base: &str) -> String {
    let schema = format!(
        "relink_test_{}_{}_{}",
        std::process::id(),
        Utc::now().timestamp_micros(),
        SCHEMA_SEQ.fetch_add(1, Ordering::SeqCst)
    );

    let pool = sqlx::PgPool::connect(base).await.unwrap();
    sqlx::query(&format!("CREATE SCHEMA {schema}"))
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}options=-c%20search_path%3D{schema}")
}

async fn backends() -> Vec<DatabaseConfig> {
    let mut configs = vec![
        config(DatabaseBackend::Sqlite, "sqlite::memory:"),
        config(DatabaseBackend::Memory, ""),
    ];

    if let Ok(base) = std::env::var("TEST_POSTGRES_URL") {
        let url = postgres_test_url(&base).await;
        configs.push(config(DatabaseBackend::Postgres, &url));
    }

    configs
}

#[tokio::test]
async fn test_insert_if_absent_rejects_taken_code() {
    for config in backends().await {
        let backend = config.backend;
        let stores = open(&config).await;

        let link = stores
            .links
            .insert_if_absent("taken01", "https://example.com/a")
            .await
            .unwrap();
        assert_eq!(link.short_code, "taken01");

        let second = stores
            .links
            .insert_if_absent("taken01", "https://example.com/b")
            .await;
        assert!(matches!(second, Err(StorageError::Conflict)), "{backend:?}");

        // The first writer's link is untouched
        let stored = stores.links.get("taken01").await.unwrap().unwrap();
        assert_eq!(stored.original_url, "https://example.com/a");
        assert_eq!(stored.id, link.id);
    }
}

#[tokio::test]
async fn test_lookup_is_exact_match() {
    for config in backends().await {
        let backend = config.backend;
        let stores = open(&config).await;
        stores
            .links
            .insert_if_absent("AbC1234", "https://example.com")
            .await
            .unwrap();

        assert!(stores.links.get("AbC1234").await.unwrap().is_some());
        assert!(stores.links.get("abc1234").await.unwrap().is_none(), "{backend:?}");
        assert!(stores.links.get("AbC123").await.unwrap().is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_insert_single_winner() {
    for config in backends().await {
        let backend = config.backend;
        let stores = open(&config).await;

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let links = stores.links.clone();
                tokio::spawn(async move {
                    links
                        .insert_if_absent("race001", &format!("https://example.com/{i}"))
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(StorageError::Conflict) => {}
                Err(e) => panic!("{backend:?}: unexpected error {e}"),
            }
        }
        assert_eq!(winners, 1, "{backend:?}");
    }
}

#[tokio::test]
async fn test_list_newest_first_and_pages_are_disjoint() {
    for config in backends().await {
        let backend = config.backend;
        let stores = open(&config).await;
        for i in 0..7 {
            stores
                .links
                .insert_if_absent(&format!("page{i:03}"), "https://example.com")
                .await
                .unwrap();
        }

        let all = stores.links.list(ListPage::default()).await.unwrap();
        assert_eq!(all.len(), 7);
        assert!(all
            .windows(2)
            .all(|w| (w[0].created_at, w[0].id) > (w[1].created_at, w[1].id)));
        assert_eq!(all[0].short_code, "page006");

        let mut seen = HashSet::new();
        let mut page = ListPage {
            limit: Some(3),
            after: None,
        };
        loop {
            let links = stores.links.list(page).await.unwrap();
            for link in &links {
                assert!(seen.insert(link.id), "{backend:?}: link listed twice");
            }
            match links.last() {
                Some(last) if links.len() == 3 => page.after = Some(last.into()),
                _ => break,
            }
        }
        assert_eq!(seen.len(), 7);
    }
}

#[tokio::test]
async fn test_events_are_per_link_and_newest_first() {
    for config in backends().await {
        let backend = config.backend;
        let stores = open(&config).await;
        let a = stores
            .links
            .insert_if_absent("evtA001", "https://example.com/a")
            .await
            .unwrap();
        let b = stores
            .links
            .insert_if_absent("evtB001", "https://example.com/b")
            .await
            .unwrap();

        let now = Utc::now();
        let event = |link_id, minutes_ago, browser: &str| ClickEvent {
            link_id,
            accessed_at: now - Duration::minutes(minutes_ago),
            ip_address: Some("192.0.2.1".to_string()),
            browser: browser.to_string(),
        };

        stores
            .events
            .append(&[event(a.id, 10, "old"), event(b.id, 1, "other"), event(a.id, 2, "new")])
            .await
            .unwrap();

        let events = stores.events.events_for_link(a.id).await.unwrap();
        let order: Vec<&str> = events.iter().map(|e| e.browser.as_str()).collect();
        assert_eq!(order, vec!["new", "old"], "{backend:?}");

        assert_eq!(stores.events.events_for_link(b.id).await.unwrap().len(), 1);
        assert!(stores.events.events_for_link(i64::MAX).await.unwrap().is_empty());
    }
}
