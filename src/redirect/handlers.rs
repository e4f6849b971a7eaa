use axum::{
    extract::{ConnectInfo, Path, State},
    http::{
        header::{self, HeaderMap, HeaderValue},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Extension,
};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use url::Url;

use super::middleware::RedirectTimer;
use crate::analytics::client_ip;
use crate::app::AppState;
use crate::config::RedirectStatus;
use crate::error::AppError;
use crate::resolver::ClickContext;

pub const CACHE_HIT_HEADER: &str = "x-relink-cache-hit";
pub const TIMING_HEADER: &str = "x-relink-timing-total-ms";

/// GET /{code}
///
/// Resolves the code and answers with a 302 (or 301) to the destination.
/// The click is queued for the recorder and not awaited.
pub async fn redirect_url(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Extension(timer): Extension<RedirectTimer>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = ClickContext {
        ip_address: client_ip(&headers, addr.ip(), &state.analytics),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    };

    let resolved = match state.resolver.resolve(&code, ctx).await {
        Ok(resolved) => resolved,
        Err(err) => return err.into_response(),
    };

    let location = match location_header(&resolved.link.original_url) {
        Ok(location) => location,
        Err(err) => return err.into_response(),
    };

    let status = match state.redirect_status {
        RedirectStatus::Found => StatusCode::FOUND,
        RedirectStatus::MovedPermanently => StatusCode::MOVED_PERMANENTLY,
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::LOCATION, location);
    response_headers.insert(
        CACHE_HIT_HEADER,
        HeaderValue::from_static(if resolved.cache_hit { "true" } else { "false" }),
    );
    response_headers.insert(
        TIMING_HEADER,
        HeaderValue::from(timer.elapsed().as_millis() as u64),
    );

    (status, response_headers).into_response()
}

/// Stored URLs are kept as submitted; anything beyond visible ASCII is sent
/// in its percent-encoded serialization instead.
fn location_header(original_url: &str) -> Result<HeaderValue, AppError> {
    let value: Cow<'_, str> = if original_url.bytes().all(|b| b.is_ascii_graphic()) {
        Cow::Borrowed(original_url)
    } else {
        let url = Url::parse(original_url).map_err(|e| {
            AppError::StoreUnavailable(anyhow::anyhow!("stored destination is not a URL: {e}"))
        })?;
        Cow::Owned(url.into())
    };

    HeaderValue::from_str(&value).map_err(|e| {
        AppError::StoreUnavailable(anyhow::anyhow!(
            "stored destination cannot be used as a Location header: {e}"
        ))
    })
}
