use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

use super::handlers::{get_analytics, health_check, list_links, shorten};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/shorten", post(shorten))
        .route("/api/admin/links", get(list_links))
        .route("/api/analytics/{short_code}", get(get_analytics))
        .with_state(state)
}
