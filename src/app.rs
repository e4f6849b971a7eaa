use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::analytics::{Aggregator, ClickRecorder};
use crate::config::{AnalyticsConfig, Config, RedirectStatus};
use crate::cursor::CursorCodec;
use crate::resolver::Resolver;
use crate::shortener::Generator;
use crate::storage::{CachedStorage, LinkStore, Stores};
use crate::{api, redirect};

/// Shared state handed to every handler
pub struct AppState {
    pub resolver: Resolver,
    pub aggregator: Aggregator,
    pub recorder: ClickRecorder,
    pub cursors: CursorCodec,
    pub analytics: AnalyticsConfig,
    pub redirect_status: RedirectStatus,
}

impl AppState {
    /// Wire the components over the given stores. Spawns the click recorder,
    /// so it must run inside a tokio runtime.
    pub fn build(config: &Config, stores: Stores) -> Result<Arc<Self>> {
        let links: Arc<dyn LinkStore> = Arc::new(CachedStorage::new(
            stores.links,
            config.cache.max_entries,
            config.cache.ttl_secs,
        ));

        let generator = Arc::new(Generator::new(Arc::clone(&links), &config.short_code)?);
        let recorder = ClickRecorder::new(Arc::clone(&stores.events), &config.recorder);
        let resolver = Resolver::new(
            generator,
            Arc::clone(&links),
            recorder.clone(),
            config.resolve.timeout(),
        );
        let aggregator = Aggregator::new(links, stores.events);

        Ok(Arc::new(Self {
            resolver,
            aggregator,
            recorder,
            cursors: CursorCodec::new(config.pagination.cursor_hmac_secret.as_deref()),
            analytics: config.analytics.clone(),
            redirect_status: config.resolve.redirect_status,
        }))
    }
}

/// `/api/...` plus the bare `/{code}` redirect on one router
pub fn create_router(state: Arc<AppState>) -> Router {
    api::routes::create_api_router(Arc::clone(&state))
        .merge(redirect::routes::create_redirect_router(state))
        .layer(TraceLayer::new_for_http())
}
