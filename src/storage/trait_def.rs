use crate::cursor::CursorData;
use crate::models::{ClickEvent, Link};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Unavailable(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Copy, Default)]
pub struct LookupMetadata {
    pub cache_hit: bool,
}

#[derive(Debug, Clone)]
pub struct LookupResult {
    pub link: Option<Link>,
    pub metadata: LookupMetadata,
}

/// Window into the newest-first link listing
#[derive(Debug, Clone, Copy, Default)]
pub struct ListPage {
    /// None returns every remaining link
    pub limit: Option<i64>,
    /// Only links strictly older than this position
    pub after: Option<CursorData>,
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Persist a new link unless `short_code` is taken. Must be atomic with
    /// respect to concurrent callers using the same code.
    async fn insert_if_absent(&self, short_code: &str, original_url: &str)
        -> StorageResult<Link>;

    /// Exact-match lookup by short code
    async fn get(&self, short_code: &str) -> StorageResult<Option<Link>>;

    /// Lookup that also reports where the answer came from
    async fn get_with_metadata(&self, short_code: &str) -> StorageResult<LookupResult> {
        Ok(LookupResult {
            link: self.get(short_code).await?,
            metadata: LookupMetadata::default(),
        })
    }

    /// Links ordered by creation time, most recent first (ties: higher id first)
    async fn list(&self, page: ListPage) -> StorageResult<Vec<Link>>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append click events. Each record is appended atomically; records are
    /// never updated or removed afterwards.
    async fn append(&self, events: &[ClickEvent]) -> StorageResult<()>;

    /// All events of a link, newest `accessed_at` first (ties: latest arrival first)
    async fn events_for_link(&self, link_id: i64) -> StorageResult<Vec<ClickEvent>>;
}

/// A backend that holds both links and click events
#[async_trait]
pub trait Storage: LinkStore + EventStore {
    /// Initialize the storage (create tables, indexes)
    async fn init(&self) -> Result<()>;
}
