use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

/// Failures surfaced by the shortener, resolver and aggregator
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid url: {0}")]
    Validation(String),

    /// Unknown or malformed short code. Both cases share this variant.
    #[error("short link not found")]
    NotFound,

    #[error("no free short code after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("lookup exceeded its deadline")]
    Timeout,
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            // Conflicts are consumed by the generator; reaching here means an
            // insert raced somewhere it should not have.
            StorageError::Conflict => {
                AppError::StoreUnavailable(anyhow::anyhow!("unexpected short code conflict"))
            }
            StorageError::Unavailable(e) => AppError::StoreUnavailable(e),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Exhausted { .. } | AppError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound => "Short link not found".to_string(),
            AppError::Exhausted { .. } => "Could not allocate a short code, try again".to_string(),
            AppError::StoreUnavailable(_) => "Storage temporarily unavailable".to_string(),
            AppError::Timeout => "Lookup timed out".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
