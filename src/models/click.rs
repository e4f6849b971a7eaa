use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A click as handed to the recorder, before the user agent is summarised
#[derive(Debug, Clone)]
pub struct NewClickEvent {
    pub link_id: i64,
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub raw_user_agent: Option<String>,
}

/// One recorded redirect. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub link_id: i64,
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub browser: String,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ClickRow {
    pub link_id: i64,
    pub accessed_at: i64,
    pub ip_address: Option<String>,
    pub browser: String,
}

impl From<ClickRow> for ClickEvent {
    fn from(row: ClickRow) -> Self {
        Self {
            link_id: row.link_id,
            accessed_at: DateTime::from_timestamp_millis(row.accessed_at).unwrap_or_default(),
            ip_address: row.ip_address,
            browser: row.browser,
        }
    }
}

/// Wire shape of a single log entry in the analytics response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickLog {
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub browser: String,
}

impl From<ClickEvent> for ClickLog {
    fn from(event: ClickEvent) -> Self {
        Self {
            accessed_at: event.accessed_at,
            ip_address: event.ip_address,
            browser: event.browser,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub click_count: u64,
    pub logs: Vec<ClickLog>,
}
