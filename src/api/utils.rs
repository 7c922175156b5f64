//! Stateless helpers for request handling

use axum::http::{HeaderMap, header};
use uuid::Uuid;

use crate::api::error::ApiError;

/// Require an `application/json` Content-Type (parameters such as charset allowed)
pub fn require_json(headers: &HeaderMap) -> Result<mime::Mime, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;

    parse_content_type(content_type)
}

/// Parses and validates a Content-Type value for application/json
///
/// Rejects `application/jsonp`, `application/json-patch+json`, `text/json`
/// and malformed media types.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("invalid Content-Type: {content_type}")))?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(())
}

/// A malformed id cannot name a stored task, so it is reported as not found
pub fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("task {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_require_json_needs_header() {
        let mut headers = HeaderMap::new();
        assert!(matches!(require_json(&headers), Err(ApiError::InvalidPayload(_))));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(require_json(&headers).is_ok());
    }

    #[test]
    fn test_validate_body_size() {
        let data = vec![0u8; 1000];
        assert!(validate_body_size(&data, 1000).is_ok());
        assert!(matches!(
            validate_body_size(&data, 999),
            Err(ApiError::PayloadTooLarge(1000))
        ));
    }

    #[test]
    fn test_parse_task_id() {
        let id = Uuid::now_v7();
        assert_eq!(parse_task_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_task_id("not-a-uuid"), Err(ApiError::NotFound(_))));
    }
}
