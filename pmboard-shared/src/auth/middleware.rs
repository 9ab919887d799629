/// Bearer authentication for Axum
///
/// Requests carry an access token in the `Authorization: Bearer <token>`
/// header. [`authenticate`] validates it and produces an [`AuthContext`],
/// which the API's middleware stores in the request extensions. Handlers then
/// take `AuthContext` as an extractor; if the middleware did not run, the
/// extractor rejects with 401.
///
/// # Example
///
/// ```no_run
/// use axum::{Router, routing::get};
/// use pmboard_shared::auth::middleware::AuthContext;
///
/// async fn protected_handler(auth: AuthContext) -> String {
///     format!("Hello, {}!", auth.email)
/// }
///
/// let app: Router = Router::new().route("/protected", get(protected_handler));
/// ```

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};

/// Authenticated caller, added to request extensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,

    pub email: String,
}

/// Error type for bearer authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing authorization header
    MissingCredentials,

    /// Header present but not `Bearer <token>`
    InvalidFormat,

    /// Token validation failed
    InvalidToken(String),
}

impl AuthError {
    pub fn message(&self) -> String {
        match self {
            AuthError::MissingCredentials => "Missing authorization header".to_string(),
            AuthError::InvalidFormat => "Expected Bearer token".to_string(),
            AuthError::InvalidToken(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": "unauthorized",
            "message": self.message(),
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Extracts the raw bearer token from request headers
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

/// Validates the bearer access token in `headers`
///
/// Refresh tokens are rejected here; they are only accepted by the refresh
/// endpoint.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthContext, AuthError> {
    let token = bearer_token(headers)?;

    let claims = validate_access_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
        JwtError::WrongType { expected } => {
            AuthError::InvalidToken(format!("Expected {} token", expected))
        }
        _ => AuthError::InvalidToken("Invalid token".to_string()),
    })?;

    Ok(AuthContext {
        user_id: claims.id,
        email: claims.email,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{issue_access_token, issue_refresh_token};
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")).unwrap(), "abc");
        assert_eq!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        );
        assert_eq!(
            bearer_token(&headers_with("Basic abc")),
            Err(AuthError::InvalidFormat)
        );
        assert_eq!(
            bearer_token(&headers_with("Bearer ")),
            Err(AuthError::InvalidFormat)
        );
    }

    #[test]
    fn test_authenticate_access_token() {
        let user_id = Uuid::new_v4();
        let token = issue_access_token(user_id, "ada@example.com", SECRET).unwrap();

        let auth = authenticate(&headers_with(&format!("Bearer {}", token)), SECRET).unwrap();
        assert_eq!(auth.user_id, user_id);
        assert_eq!(auth.email, "ada@example.com");
    }

    #[test]
    fn test_authenticate_rejects_refresh_token() {
        let token = issue_refresh_token(Uuid::new_v4(), "ada@example.com", SECRET).unwrap();

        let err = authenticate(&headers_with(&format!("Bearer {}", token)), SECRET).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn test_authenticate_rejects_wrong_secret() {
        let token = issue_access_token(Uuid::new_v4(), "ada@example.com", SECRET).unwrap();

        let err = authenticate(
            &headers_with(&format!("Bearer {}", token)),
            "another-secret-key-at-least-32-characters",
        )
        .unwrap_err();
        assert_eq!(err, AuthError::InvalidToken("Invalid token".to_string()));
    }

    #[test]
    fn test_auth_error_into_response() {
        let response = AuthError::MissingCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::InvalidFormat.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
