//! Shared-secret API key checks.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::{ServiceError, ServiceResult};

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Verifies presented keys against the configured secret.
#[derive(Clone)]
pub struct ApiKeyGuard {
    expected: [u8; 32],
}

impl ApiKeyGuard {
    pub fn new(api_key: &str) -> Self {
        Self {
            expected: digest(api_key),
        }
    }

    /// Keys are compared by digest so the comparison does not depend on
    /// where the first differing byte is.
    pub fn verify(&self, presented: Option<&str>) -> ServiceResult<()> {
        match presented {
            Some(key) if digest(key) == self.expected => Ok(()),
            _ => Err(ServiceError::Unauthorized),
        }
    }

    pub fn verify_headers(&self, headers: &HeaderMap) -> ServiceResult<()> {
        self.verify(header_key(headers))
    }
}

pub fn header_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

fn digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

/// Middleware rejecting requests without a valid `x-api-key` header.
pub async fn require_api_key(
    State(guard): State<Arc<ApiKeyGuard>>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    guard.verify_headers(request.headers())?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_verify() {
        let guard = ApiKeyGuard::new("secret");
        assert!(guard.verify(Some("secret")).is_ok());
        assert!(matches!(
            guard.verify(Some("Secret")),
            Err(ServiceError::Unauthorized)
        ));
        assert!(guard.verify(None).is_err());
    }

    #[test]
    fn test_verify_headers() {
        let guard = ApiKeyGuard::new("secret");
        let mut headers = HeaderMap::new();
        assert!(guard.verify_headers(&headers).is_err());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        assert!(guard.verify_headers(&headers).is_ok());
    }
}
