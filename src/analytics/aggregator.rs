use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{AnalyticsResponse, ClickLog, Link};
use crate::storage::{EventStore, LinkStore, ListPage};

/// Read-only views over links and their click streams
pub struct Aggregator {
    links: Arc<dyn LinkStore>,
    events: Arc<dyn EventStore>,
}

impl Aggregator {
    pub fn new(links: Arc<dyn LinkStore>, events: Arc<dyn EventStore>) -> Self {
        Self { links, events }
    }

    /// Links, most recently created first
    pub async fn list_links(&self, page: ListPage) -> AppResult<Vec<Link>> {
        Ok(self.links.list(page).await?)
    }

    /// Click count and logs for a short code, newest first.
    ///
    /// The count is derived from the same read as the logs, so the two can
    /// never disagree.
    pub async fn get_analytics(&self, short_code: &str) -> AppResult<AnalyticsResponse> {
        let link = self.links.get(short_code).await?.ok_or(AppError::NotFound)?;

        let logs: Vec<ClickLog> = self
            .events
            .events_for_link(link.id)
            .await?
            .into_iter()
            .map(ClickLog::from)
            .collect();

        Ok(AnalyticsResponse {
            click_count: logs.len() as u64,
            logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClickEvent;
    use crate::storage::MemoryStorage;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_analytics_for_unknown_code() {
        let store = Arc::new(MemoryStorage::new());
        let aggregator = Aggregator::new(store.clone(), store);

        assert!(matches!(
            aggregator.get_analytics("doesnotexist").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_analytics_counts_and_orders_logs() {
        let store = Arc::new(MemoryStorage::new());
        let link = store
            .insert_if_absent("agg0001", "https://example.com")
            .await
            .unwrap();
        let aggregator = Aggregator::new(store.clone(), store.clone());

        let empty = aggregator.get_analytics("agg0001").await.unwrap();
        assert_eq!(empty.click_count, 0);
        assert!(empty.logs.is_empty());

        let now = Utc::now();
        let clicks: Vec<ClickEvent> = [3, 1, 2]
            .into_iter()
            .map(|minutes| ClickEvent {
                link_id: link.id,
                accessed_at: now - Duration::minutes(minutes),
                ip_address: None,
                browser: format!("{minutes}m ago"),
            })
            .collect();
        store.append(&clicks).await.unwrap();

        let report = aggregator.get_analytics("agg0001").await.unwrap();
        assert_eq!(report.click_count, 3);
        assert_eq!(report.logs.len(), 3);
        let order: Vec<&str> = report.logs.iter().map(|l| l.browser.as_str()).collect();
        assert_eq!(order, vec!["1m ago", "2m ago", "3m ago"]);
    }
}
