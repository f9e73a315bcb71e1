/*!
 * Shared-Secret Authentication
 *
 * Producers authenticate with the `X-Pulse-API-Key` header (or an
 * `Authorization: Bearer <token>` fallback) carrying the server-held
 * secret. Comparison is constant-time.
 */

use axum::http::HeaderMap;

use crate::error::ApiError;

const API_KEY_HEADER: &str = "X-Pulse-API-Key";

/// Validate the request's API key against the configured secret.
pub fn check_auth(headers: &HeaderMap, api_key: &str) -> Result<(), ApiError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .ok_or(ApiError::MissingApiKey)?;

    if !constant_time_eq(provided, api_key) {
        return Err(ApiError::InvalidApiKey);
    }

    Ok(())
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.as_bytes()
            .iter()
            .zip(b.as_bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_api_key_header_accepted() {
        let h = headers(&[("X-Pulse-API-Key", "secret_123")]);
        assert!(check_auth(&h, "secret_123").is_ok());
    }

    #[test]
    fn test_bearer_fallback_accepted() {
        let h = headers(&[("Authorization", "Bearer secret_123")]);
        assert!(check_auth(&h, "secret_123").is_ok());
    }

    #[test]
    fn test_missing_header_rejected() {
        let h = headers(&[]);
        assert!(matches!(
            check_auth(&h, "secret_123"),
            Err(ApiError::MissingApiKey)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let h = headers(&[("X-Pulse-API-Key", "wrong")]);
        assert!(matches!(
            check_auth(&h, "secret_123"),
            Err(ApiError::InvalidApiKey)
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
