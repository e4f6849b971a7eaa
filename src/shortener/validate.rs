use url::Url;

use crate::error::AppError;

pub const MAX_URL_LENGTH: usize = 2048;

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Check a submitted destination and return the form that will be stored.
///
/// The returned string is the trimmed input, not the parser's normalized
/// serialization, so a link resolves to exactly what was submitted.
pub fn validate_url(raw: &str) -> Result<&str, AppError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(AppError::Validation("URL cannot be empty".to_string()));
    }

    if trimmed.len() > MAX_URL_LENGTH {
        return Err(AppError::Validation(format!(
            "URL exceeds {MAX_URL_LENGTH} bytes"
        )));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| AppError::Validation(format!("Invalid URL format: {e}")))?;

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(AppError::Validation(format!(
            "Unsupported scheme '{}', only http and https are allowed",
            parsed.scheme()
        )));
    }

    Ok(trimmed)
}
