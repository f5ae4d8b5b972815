//! Authentication middleware
//!
//! Provides API key authentication for protected endpoints.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::ApiError;
use crate::server::AppState;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Key presented by the client, from `X-API-Key` or `Authorization: Bearer`
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
        })
}

/// API key authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = extract_api_key(request.headers());
    let expected = state.config.api.key.as_deref();

    if !validate_api_key(provided, expected) {
        debug!(path = %request.uri().path(), "Rejected request with missing or invalid API key");
        return Err(ApiError::AuthFailed);
    }

    Ok(next.run(request).await)
}

/// Simple API key validation (for use in handlers)
pub fn validate_api_key(provided: Option<&str>, expected: Option<&str>) -> bool {
    match (provided, expected) {
        (Some(p), Some(e)) => p == e,
        (_, None) => true, // No key configured, allow
        (None, Some(_)) => false, // Key required but not provided
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_validate_api_key_no_key_configured() {
        assert!(validate_api_key(None, None));
        assert!(validate_api_key(Some("any"), None));
    }

    #[test]
    fn test_validate_api_key_with_key_configured() {
        assert!(!validate_api_key(None, Some("secret")));
        assert!(!validate_api_key(Some("wrong"), Some("secret")));
        assert!(validate_api_key(Some("secret"), Some("secret")));
    }

    #[test]
    fn test_extract_api_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer token-1"));
        assert_eq!(extract_api_key(&headers), Some("token-1"));

        // X-API-Key takes precedence
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("key-2"));
        assert_eq!(extract_api_key(&headers), Some("key-2"));
    }

    #[test]
    fn test_extract_api_key_ignores_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_api_key(&headers), None);
    }
}
