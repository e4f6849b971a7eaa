use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, HeaderValue},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::cursor::CursorData;
use crate::error::{AppError, AppResult};
use crate::models::{AnalyticsResponse, Link, ShortenRequest, ShortenResponse};
use crate::storage::ListPage;

pub const NEXT_CURSOR_HEADER: &str = "x-next-cursor";

const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Absent means the whole list
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

/// POST /api/shorten
pub async fn shorten(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ShortenRequest>, JsonRejection>,
) -> AppResult<Json<ShortenResponse>> {
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    let url = payload
        .url
        .ok_or_else(|| AppError::Validation("URL is required".to_string()))?;

    let short_code = state.resolver.create(&url).await?;
    tracing::info!(short_code = %short_code, "created short link");

    Ok(Json(ShortenResponse { short_code }))
}

/// GET /api/admin/links
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<(HeaderMap, Json<Vec<Link>>)> {
    let limit = query.limit.map(|l| l.clamp(1, MAX_PAGE_SIZE));
    let after = query
        .cursor
        .as_deref()
        .map(|c| state.cursors.decode(c))
        .transpose()
        .map_err(|_| AppError::Validation("Invalid cursor".to_string()))?;

    let links = state.aggregator.list_links(ListPage { limit, after }).await?;

    let mut headers = HeaderMap::new();
    if let (Some(limit), Some(last)) = (limit, links.last()) {
        if links.len() as i64 == limit {
            match state.cursors.encode(&CursorData::from(last)) {
                Ok(cursor) => {
                    if let Ok(value) = HeaderValue::from_str(&cursor) {
                        headers.insert(NEXT_CURSOR_HEADER, value);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to sign next-page cursor"),
            }
        }
    }

    Ok((headers, Json(links)))
}

/// GET /api/analytics/{short_code}
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(short_code): Path<String>,
) -> AppResult<Json<AnalyticsResponse>> {
    Ok(Json(state.aggregator.get_analytics(&short_code).await?))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
