pub mod cached;
pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{
    EventStore, LinkStore, ListPage, LookupMetadata, LookupResult, Storage, StorageError,
    StorageResult,
};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{DatabaseBackend, DatabaseConfig};

/// The two stores the service runs against. Usually backed by one database.
#[derive(Clone)]
pub struct Stores {
    pub links: Arc<dyn LinkStore>,
    pub events: Arc<dyn EventStore>,
}

impl Stores {
    pub fn from_storage<S: Storage + 'static>(storage: Arc<S>) -> Self {
        Self {
            links: storage.clone(),
            events: storage,
        }
    }
}

/// Connect to the configured backend and make sure its schema exists
pub async fn open(config: &DatabaseConfig) -> Result<Stores> {
    let stores = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            let storage = Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?);
            storage.init().await?;
            Stores::from_storage(storage)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.url);
            let storage =
                Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?);
            storage.init().await?;
            Stores::from_storage(storage)
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart");
            Stores::from_storage(Arc::new(MemoryStorage::new()))
        }
    };

    Ok(stores)
}
