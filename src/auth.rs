/// Authentication extractors and utilities
///
/// Administrators authenticate with an HS256 bearer token whose `role`
/// claim is `admin`. Everything else about identity lives outside this
/// service.
use crate::{context::AppContext, error::CmsError, error::CmsResult};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Role claim granting access to management endpoints
pub const ADMIN_ROLE: &str = "admin";

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Sign a token for `subject` with `role`
pub fn issue_token(secret: &str, subject: &str, role: &str, ttl: Duration) -> CmsResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        role: role.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| CmsError::Internal(format!("Failed to sign token: {}", e)))
}

/// Verify signature and expiry of a token
pub fn validate_token(secret: &str, token: &str) -> CmsResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| CmsError::Authentication(format!("Invalid token: {}", e)))
}

/// Admin authentication context - requires a valid token with the admin role
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub subject: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = CmsError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| CmsError::Authentication("Missing authorization header".to_string()))?;

        let claims = validate_token(&state.config.authentication.jwt_secret, &token)?;

        if claims.role != ADMIN_ROLE {
            tracing::warn!(subject = %claims.sub, role = %claims.role, "Non-admin token rejected");
            return Err(CmsError::Authorization(
                "Administrator access required".to_string(),
            ));
        }

        Ok(AdminAuthContext {
            subject: claims.sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc123token"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123token".to_string()));

        headers.insert("authorization", HeaderValue::from_static("abc123token"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_issue_and_validate() {
        let token = issue_token(SECRET, "editor@example.com", ADMIN_ROLE, Duration::hours(1)).unwrap();
        let claims = validate_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "editor@example.com");
        assert_eq!(claims.role, ADMIN_ROLE);
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let token = issue_token(SECRET, "a", ADMIN_ROLE, Duration::hours(1)).unwrap();
        assert!(matches!(
            validate_token("another-secret-that-is-at-least-32-chars", &token),
            Err(CmsError::Authentication(_))
        ));

        let expired = issue_token(SECRET, "a", ADMIN_ROLE, Duration::hours(-2)).unwrap();
        assert!(matches!(
            validate_token(SECRET, &expired),
            Err(CmsError::Authentication(_))
        ));
    }
}
