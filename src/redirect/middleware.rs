use axum::{extract::Request, middleware::Next, response::Response};
use std::time::{Duration, Instant};

/// When a redirect request entered the router
#[derive(Debug, Clone, Copy)]
pub struct RedirectTimer(Instant);

impl RedirectTimer {
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

/// Stamp each redirect request so the handler can report total latency
pub async fn start_redirect_timer(mut request: Request, next: Next) -> Response {
    request
        .extensions_mut()
        .insert(RedirectTimer(Instant::now()));
    next.run(request).await
}
