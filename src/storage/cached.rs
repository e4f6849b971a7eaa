use crate::models::Link;
use crate::storage::{LinkStore, ListPage, LookupMetadata, LookupResult, StorageResult};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache in front of a link store for the redirect path.
///
/// Links never change after creation, so a cached hit cannot go stale.
/// Misses are not cached: a code created through another instance must
/// become resolvable immediately.
pub struct CachedStorage {
    inner: Arc<dyn LinkStore>,
    read_cache: Cache<String, Link>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn LinkStore>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, read_cache }
    }
}

#[async_trait]
impl LinkStore for CachedStorage {
    async fn insert_if_absent(
        &self,
        short_code: &str,
        original_url: &str,
    ) -> StorageResult<Link> {
        self.inner.insert_if_absent(short_code, original_url).await
    }

    async fn get(&self, short_code: &str) -> StorageResult<Option<Link>> {
        Ok(self.get_with_metadata(short_code).await?.link)
    }

    async fn get_with_metadata(&self, short_code: &str) -> StorageResult<LookupResult> {
        if let Some(cached) = self.read_cache.get(short_code).await {
            return Ok(LookupResult {
                link: Some(cached),
                metadata: LookupMetadata { cache_hit: true },
            });
        }

        let result = self.inner.get(short_code).await?;
        if let Some(ref link) = result {
            self.read_cache
                .insert(short_code.to_string(), link.clone())
                .await;
        }

        Ok(LookupResult {
            link: result,
            metadata: LookupMetadata { cache_hit: false },
        })
    }

    async fn list(&self, page: ListPage) -> StorageResult<Vec<Link>> {
        self.inner.list(page).await
    }
}
