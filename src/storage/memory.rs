use crate::models::{ClickEvent, Link};
use crate::storage::{EventStore, LinkStore, ListPage, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Process-local storage for development and tests.
///
/// Uniqueness comes from the shard lock DashMap holds while an entry is
/// vacant-checked and filled, so two inserts for one code cannot both win.
pub struct MemoryStorage {
    links: DashMap<String, Link>,
    next_id: AtomicI64,
    /// Per-link event streams in arrival order
    events: DashMap<i64, Vec<ClickEvent>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            links: DashMap::new(),
            next_id: AtomicI64::new(1),
            events: DashMap::new(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LinkStore for MemoryStorage {
    async fn insert_if_absent(
        &self,
        short_code: &str,
        original_url: &str,
    ) -> StorageResult<Link> {
        match self.links.entry(short_code.to_string()) {
            Entry::Occupied(_) => Err(StorageError::Conflict),
            Entry::Vacant(slot) => {
                let link = Link {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    short_code: short_code.to_string(),
                    original_url: original_url.to_string(),
                    created_at: Utc::now(),
                };
                slot.insert(link.clone());
                Ok(link)
            }
        }
    }

    async fn get(&self, short_code: &str) -> StorageResult<Option<Link>> {
        Ok(self.links.get(short_code).map(|entry| entry.value().clone()))
    }

    async fn list(&self, page: ListPage) -> StorageResult<Vec<Link>> {
        let mut links: Vec<Link> = self
            .links
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|link| match page.after {
                Some(after) => {
                    let at = link.created_at.timestamp_millis();
                    at < after.created_at || (at == after.created_at && link.id < after.id)
                }
                None => true,
            })
            .collect();

        links.sort_by(|a, b| {
            b.created_at
                .timestamp_millis()
                .cmp(&a.created_at.timestamp_millis())
                .then(b.id.cmp(&a.id))
        });

        if let Some(limit) = page.limit {
            links.truncate(limit.max(0) as usize);
        }

        Ok(links)
    }
}

#[async_trait]
impl EventStore for MemoryStorage {
    async fn append(&self, events: &[ClickEvent]) -> StorageResult<()> {
        for event in events {
            self.events
                .entry(event.link_id)
                .or_default()
                .push(event.clone());
        }
        Ok(())
    }

    async fn events_for_link(&self, link_id: i64) -> StorageResult<Vec<ClickEvent>> {
        let mut events: Vec<ClickEvent> = self
            .events
            .get(&link_id)
            .map(|entry| entry.value().iter().rev().cloned().collect())
            .unwrap_or_default();

        // Stable sort keeps latest arrival first among equal timestamps
        events.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_inserts_single_winner() {
        let storage = Arc::new(MemoryStorage::new());

        let mut handles = vec![];
        for i in 0..20 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .insert_if_absent("samecode", &format!("https://example.com/{i}"))
                    .await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(StorageError::Conflict) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let storage = MemoryStorage::new();
        storage.insert_if_absent("one0001", "https://a.example").await.unwrap();
        storage.insert_if_absent("two0002", "https://b.example").await.unwrap();

        let links = storage.list(ListPage::default()).await.unwrap();
        assert_eq!(links[0].short_code, "two0002");
        assert_eq!(links[1].short_code, "one0001");
    }
}
