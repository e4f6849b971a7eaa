use axum::{middleware, routing::get, Router};
use std::sync::Arc;

use crate::app::AppState;

use super::handlers::redirect_url;
use super::middleware::start_redirect_timer;

pub fn create_redirect_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{code}", get(redirect_url))
        .layer(middleware::from_fn(start_redirect_timer))
        .with_state(state)
}
