use thiserror::Error;

use super::models::CreateTaskRequest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("urls must contain at least one entry")]
    NoUrls,
    #[error("url at index {0} is empty")]
    EmptyUrl(usize),
    #[error("urls must contain at most {limit} entries, got {actual}")]
    TooManyUrls { actual: usize, limit: usize },
}

/// Accept a non-empty list of non-empty URLs, at most `max_urls` long.
///
/// URLs are otherwise taken as given; a malformed one fails when fetched and
/// is recorded on its file.
pub fn validate_create_request(
    request: &CreateTaskRequest,
    max_urls: usize,
) -> Result<(), UrlValidationError> {
    if request.urls.is_empty() {
        return Err(UrlValidationError::NoUrls);
    }

    if request.urls.len() > max_urls {
        return Err(UrlValidationError::TooManyUrls {
            actual: request.urls.len(),
            limit: max_urls,
        });
    }

    if let Some(index) = request.urls.iter().position(|url| url.trim().is_empty()) {
        return Err(UrlValidationError::EmptyUrl(index));
    }

    Ok(())
}
