use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::analytics::ClickRecorder;
use crate::error::{AppError, AppResult};
use crate::models::Link;
use crate::shortener::Generator;
use crate::storage::LinkStore;

/// Request metadata carried from the redirect into the click record
#[derive(Debug, Clone, Default)]
pub struct ClickContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub link: Link,
    pub cache_hit: bool,
}

/// Creates links and serves redirect lookups against the same key space
pub struct Resolver {
    generator: Arc<Generator>,
    links: Arc<dyn LinkStore>,
    recorder: ClickRecorder,
    timeout: Duration,
}

impl Resolver {
    pub fn new(
        generator: Arc<Generator>,
        links: Arc<dyn LinkStore>,
        recorder: ClickRecorder,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            links,
            recorder,
            timeout,
        }
    }

    /// Shorten `original_url`. Submitting the same URL twice yields two codes.
    pub async fn create(&self, original_url: &str) -> AppResult<String> {
        let link = self.generator.allocate(original_url).await?;
        Ok(link.short_code)
    }

    /// Look up `short_code` and schedule a click record on success.
    ///
    /// Malformed codes are reported as `NotFound` without touching the store.
    /// The lookup is bounded by the configured deadline; the click record is
    /// queued, not awaited.
    pub async fn resolve(&self, short_code: &str, ctx: ClickContext) -> AppResult<Resolved> {
        if !self.generator.is_well_formed(short_code) {
            debug!(short_code = %short_code, "rejecting malformed short code");
            return Err(AppError::NotFound);
        }

        let lookup = tokio::time::timeout(self.timeout, self.links.get_with_metadata(short_code))
            .await
            .map_err(|_| AppError::Timeout)??;

        let link = lookup.link.ok_or(AppError::NotFound)?;

        self.recorder
            .record(link.id, Utc::now(), ctx.ip_address, ctx.user_agent);

        Ok(Resolved {
            link,
            cache_hit: lookup.metadata.cache_hit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecorderConfig, ShortCodeConfig};
    use crate::storage::{ListPage, MemoryStorage, StorageResult};
    use async_trait::async_trait;

    /// A link store whose lookups hang well past any redirect budget
    struct SlowStore;

    #[async_trait]
    impl LinkStore for SlowStore {
        async fn insert_if_absent(&self, _: &str, _: &str) -> StorageResult<Link> {
            Err(crate::storage::StorageError::Conflict)
        }

        async fn get(&self, _: &str) -> StorageResult<Option<Link>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn list(&self, _: ListPage) -> StorageResult<Vec<Link>> {
            Ok(vec![])
        }
    }

    fn resolver_over(links: Arc<dyn LinkStore>, events: Arc<MemoryStorage>) -> Resolver {
        let generator = Arc::new(Generator::new(links.clone(), &ShortCodeConfig::default()).unwrap());
        let recorder = ClickRecorder::new(events, &RecorderConfig::default());
        Resolver::new(generator, links, recorder, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_create_then_resolve_is_stable() {
        let store = Arc::new(MemoryStorage::new());
        let resolver = resolver_over(store.clone(), store);

        let code = resolver.create("https://example.com/path").await.unwrap();
        for _ in 0..3 {
            let resolved = resolver.resolve(&code, ClickContext::default()).await.unwrap();
            assert_eq!(resolved.link.original_url, "https://example.com/path");
        }
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_are_both_not_found() {
        let store = Arc::new(MemoryStorage::new());
        let resolver = resolver_over(store.clone(), store);

        for code in ["zzzzzzz", "bad code", "x".repeat(64).as_str(), ""] {
            assert!(matches!(
                resolver.resolve(code, ClickContext::default()).await,
                Err(AppError::NotFound)
            ));
        }
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let resolver = resolver_over(Arc::new(SlowStore), Arc::new(MemoryStorage::new()));

        let started = std::time::Instant::now();
        let result = resolver.resolve("abc1234", ClickContext::default()).await;
        assert!(matches!(result, Err(AppError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
