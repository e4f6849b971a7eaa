use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::{ShortCodeConfig, MAX_CODE_LENGTH};
use crate::error::{AppError, AppResult};
use crate::models::Link;
use crate::shortener::{validate_url, CodeAlphabet};
use crate::storage::{LinkStore, StorageError};

/// Issues short codes that are unique across all persisted links
pub struct Generator {
    links: Arc<dyn LinkStore>,
    alphabet: CodeAlphabet,
    /// Length of freshly drawn codes; only ever grows
    length: AtomicUsize,
    max_length: usize,
    max_attempts: u32,
}

impl Generator {
    pub fn new(links: Arc<dyn LinkStore>, config: &ShortCodeConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            config.length >= 1 && config.length.max(config.max_length) <= MAX_CODE_LENGTH,
            "short code length must be within 1..={MAX_CODE_LENGTH}"
        );

        Ok(Self {
            links,
            alphabet: CodeAlphabet::from_config(config)?,
            length: AtomicUsize::new(config.length),
            max_length: config.max_length.max(config.length),
            max_attempts: config.max_attempts.max(1),
        })
    }

    pub fn current_length(&self) -> usize {
        self.length.load(Ordering::Relaxed)
    }

    /// Whether `code` could have been issued by this generator.
    ///
    /// Codes shorter than the current length stay valid: they may have been
    /// issued before the length was raised.
    pub fn is_well_formed(&self, code: &str) -> bool {
        let len = code.chars().count();
        (1..=self.max_length).contains(&len)
            && code.chars().all(|c| self.alphabet.contains(c))
    }

    /// Validate `original_url` and persist it under a freshly drawn code
    pub async fn allocate(&self, original_url: &str) -> AppResult<Link> {
        let original_url = validate_url(original_url)?;
        let length = self.current_length();

        for attempt in 1..=self.max_attempts {
            let code = self.alphabet.draw(length);

            match self.links.insert_if_absent(&code, original_url).await {
                Ok(link) => {
                    debug!(short_code = %link.short_code, attempt, "allocated short code");
                    return Ok(link);
                }
                Err(StorageError::Conflict) => {
                    debug!(short_code = %code, attempt, "short code collision, redrawing");
                }
                Err(StorageError::Unavailable(e)) => {
                    return Err(AppError::StoreUnavailable(e));
                }
            }
        }

        self.grow(length);
        Err(AppError::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// Lengthen future codes after an exhausted allocation at `from`
    fn grow(&self, from: usize) {
        if from >= self.max_length {
            error!(
                length = from,
                capacity = %self.alphabet.capacity(from),
                "short code space exhausted at maximum length; raise SHORT_CODE_MAX_LENGTH or widen the alphabet"
            );
            return;
        }

        // Concurrent exhausted allocations at the same length grow it once
        if self
            .length
            .compare_exchange(from, from + 1, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            warn!(
                from,
                to = from + 1,
                "short code collisions exhausted retry budget, growing code length"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ListPage, MemoryStorage, StorageResult};
    use async_trait::async_trait;

    /// Every code is already taken
    struct SaturatedStore;

    #[async_trait]
    impl LinkStore for SaturatedStore {
        async fn insert_if_absent(&self, _: &str, _: &str) -> StorageResult<Link> {
            Err(StorageError::Conflict)
        }

        async fn get(&self, _: &str) -> StorageResult<Option<Link>> {
            Ok(None)
        }

        async fn list(&self, _: ListPage) -> StorageResult<Vec<Link>> {
            Ok(vec![])
        }
    }

    struct DownStore;

    #[async_trait]
    impl LinkStore for DownStore {
        async fn insert_if_absent(&self, _: &str, _: &str) -> StorageResult<Link> {
            Err(StorageError::Unavailable(anyhow::anyhow!("connection refused")))
        }

        async fn get(&self, _: &str) -> StorageResult<Option<Link>> {
            Err(StorageError::Unavailable(anyhow::anyhow!("connection refused")))
        }

        async fn list(&self, _: ListPage) -> StorageResult<Vec<Link>> {
            Err(StorageError::Unavailable(anyhow::anyhow!("connection refused")))
        }
    }

    fn config(length: usize, max_length: usize) -> ShortCodeConfig {
        ShortCodeConfig {
            length,
            max_length,
            ..ShortCodeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_allocate_persists_link() {
        let store = Arc::new(MemoryStorage::new());
        let generator = Generator::new(store.clone(), &config(7, 12)).unwrap();

        let link = generator.allocate("https://example.com/path").await.unwrap();
        assert_eq!(link.original_url, "https://example.com/path");
        assert!(generator.is_well_formed(&link.short_code));

        let stored = store.get(&link.short_code).await.unwrap().unwrap();
        assert_eq!(stored, link);
    }

    #[tokio::test]
    async fn test_allocate_rejects_invalid_url_without_touching_store() {
        let generator = Generator::new(Arc::new(DownStore), &config(7, 12)).unwrap();

        assert!(matches!(
            generator.allocate("").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            generator.allocate("not-a-url").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_exhaustion_fails_and_grows_length() {
        let generator = Generator::new(Arc::new(SaturatedStore), &config(6, 8)).unwrap();

        let result = generator.allocate("https://example.com").await;
        assert!(matches!(result, Err(AppError::Exhausted { attempts: 5 })));
        assert_eq!(generator.current_length(), 7);

        let _ = generator.allocate("https://example.com").await;
        let _ = generator.allocate("https://example.com").await;
        assert_eq!(generator.current_length(), 8, "growth stops at max length");
    }

    #[tokio::test]
    async fn test_store_outage_is_surfaced() {
        let generator = Generator::new(Arc::new(DownStore), &config(7, 12)).unwrap();
        assert!(matches!(
            generator.allocate("https://example.com").await,
            Err(AppError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_well_formed_codes() {
        let generator = Generator::new(Arc::new(SaturatedStore), &config(6, 8)).unwrap();
        assert!(generator.is_well_formed("abc123"));
        assert!(generator.is_well_formed("abc12345"));
        assert!(generator.is_well_formed("abc12"));
        assert!(!generator.is_well_formed(""));
        assert!(!generator.is_well_formed("abc123456"));
        assert!(!generator.is_well_formed("abc-12"));
        assert!(!generator.is_well_formed("../etc"));
    }

    #[test]
    fn test_rejects_unbounded_length() {
        assert!(Generator::new(Arc::new(SaturatedStore), &config(7, MAX_CODE_LENGTH)).is_ok());
        assert!(Generator::new(Arc::new(SaturatedStore), &config(7, MAX_CODE_LENGTH + 1)).is_err());
        assert!(Generator::new(Arc::new(SaturatedStore), &config(1_000_000, 12)).is_err());
        assert!(Generator::new(Arc::new(SaturatedStore), &config(0, 12)).is_err());
    }
}
