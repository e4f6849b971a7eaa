use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A short code bound to its destination. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub short_code: String,
    pub original_url: String,
    pub created_at: DateTime<Utc>,
}

/// Row shape shared by the SQL backends; timestamps are unix milliseconds
#[derive(Debug, Clone, FromRow)]
pub struct LinkRow {
    pub id: i64,
    pub short_code: String,
    pub original_url: String,
    pub created_at: i64,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Self {
            id: row.id,
            short_code: row.short_code,
            original_url: row.original_url,
            created_at: DateTime::from_timestamp_millis(row.created_at).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenResponse {
    pub short_code: String,
}
