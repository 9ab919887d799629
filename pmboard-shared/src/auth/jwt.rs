/// JWT access and refresh tokens
///
/// Tokens are signed with HS256 and carry the user's id and email so the
/// refresh flow can re-resolve the account.
///
/// # Token Types
///
/// - **Access Token**: 1 hour, sent as `Authorization: Bearer <token>`
/// - **Refresh Token**: 30 days, exchanged for a new access token. Refreshing
///   does not rotate or invalidate the refresh token.
///
/// # Example
///
/// ```
/// use pmboard_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let claims = Claims::new(user_id, "ada@example.com", TokenType::Access);
/// let token = create_token(&claims, "a-secret-key-that-is-long-enough!")?;
///
/// let validated = validate_access_token(&token, "a-secret-key-that-is-long-enough!")?;
/// assert_eq!(validated.id, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issuer claim written into and required on every token
pub const ISSUER: &str = "pmboard";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature, format or claim validation failed
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Issuer claim is not ours
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// Token is valid but of the other type
    #[error("Expected {expected} token")]
    WrongType { expected: &'static str },
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token for API calls
    Access,

    /// Long-lived token for obtaining access tokens
    Refresh,
}

impl TokenType {
    /// Lifetime of a freshly issued token of this type
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(1),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims
///
/// Serialized in camelCase (`tokenType`) next to the registered claims
/// `iss`, `iat`, `nbf` and `exp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// User ID
    pub id: Uuid,

    /// User email at issue time
    pub email: String,

    /// Access or refresh
    pub token_type: TokenType,

    /// Issuer, always [`ISSUER`]
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Creates claims with the default lifetime for `token_type`
    pub fn new(user_id: Uuid, email: impl Into<String>, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, email, token_type, token_type.default_expiration())
    }

    /// Creates claims expiring `expires_in` from now
    ///
    /// A negative duration yields already-expired claims, which is handy in tests.
    pub fn with_expiration(
        user_id: Uuid,
        email: impl Into<String>,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: user_id,
            email: email.into(),
            token_type,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + expires_in).timestamp(),
        }
    }

    /// Checks if token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Access and refresh token issued together at sign-in and sign-up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs claims with HS256
///
/// # Errors
///
/// Returns `JwtError::CreateError` if encoding fails
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Issues an access token (1 hour)
pub fn issue_access_token(user_id: Uuid, email: &str, secret: &str) -> Result<String, JwtError> {
    create_token(&Claims::new(user_id, email, TokenType::Access), secret)
}

/// Issues a refresh token (30 days)
pub fn issue_refresh_token(user_id: Uuid, email: &str, secret: &str) -> Result<String, JwtError> {
    create_token(&Claims::new(user_id, email, TokenType::Refresh), secret)
}

/// Issues both tokens for a freshly authenticated user
pub fn issue_token_pair(user_id: Uuid, email: &str, secret: &str) -> Result<TokenPair, JwtError> {
    Ok(TokenPair {
        access_token: issue_access_token(user_id, email, secret)?,
        refresh_token: issue_refresh_token(user_id, email, secret)?,
    })
}

/// Validates a token of either type and extracts its claims
///
/// Verifies the signature, `exp`, `nbf` and the issuer.
///
/// # Errors
///
/// - `JwtError::Expired` when `exp` has passed
/// - `JwtError::InvalidIssuer` when `iss` is not [`ISSUER`]
/// - `JwtError::ValidationError` for any other failure (bad signature, malformed token)
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

/// Validates a token and requires it to be an access token
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Access)
}

/// Validates a token and requires it to be a refresh token
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Refresh)
}

fn validate_typed(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongType {
            expected: expected.as_str(),
        });
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_token_type_expiration() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::hours(1));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
    }

    #[test]
    fn test_claims_creation() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "ada@example.com", TokenType::Access);

        assert_eq!(claims.id, user_id);
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_claims_serialize_token_type_in_camel_case() {
        let claims = Claims::new(Uuid::new_v4(), "ada@example.com", TokenType::Refresh);
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["tokenType"], "refresh");
        assert!(json.get("token_type").is_none());
        assert_eq!(json["email"], "ada@example.com");
    }

    #[test]
    fn test_create_and_validate_token() {
        let user_id = Uuid::new_v4();
        let token = issue_access_token(user_id, "ada@example.com", SECRET).unwrap();

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.id, user_id);
        assert_eq!(validated.email, "ada@example.com");
        assert_eq!(validated.token_type, TokenType::Access);
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let token = issue_access_token(Uuid::new_v4(), "ada@example.com", SECRET).unwrap();

        let result = validate_token(&token, "another-secret-key-at-least-32-bytes");
        assert!(matches!(result, Err(JwtError::ValidationError(_))));
    }

    #[test]
    fn test_validate_expired_token() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            "ada@example.com",
            TokenType::Access,
            Duration::seconds(-3600),
        );
        assert!(claims.is_expired());

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_validate_foreign_issuer() {
        let mut claims = Claims::new(Uuid::new_v4(), "ada@example.com", TokenType::Access);
        claims.iss = "someone-else".to_string();

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(
            validate_token(&token, SECRET),
            Err(JwtError::InvalidIssuer)
        ));
    }

    #[test]
    fn test_access_and_refresh_are_not_interchangeable() {
        let pair = issue_token_pair(Uuid::new_v4(), "ada@example.com", SECRET).unwrap();

        assert!(validate_access_token(&pair.access_token, SECRET).is_ok());
        assert!(validate_refresh_token(&pair.refresh_token, SECRET).is_ok());

        assert!(matches!(
            validate_access_token(&pair.refresh_token, SECRET),
            Err(JwtError::WrongType { expected: "access" })
        ));
        assert!(matches!(
            validate_refresh_token(&pair.access_token, SECRET),
            Err(JwtError::WrongType { expected: "refresh" })
        ));
    }

    #[test]
    fn test_refresh_token_lifetime() {
        let token = issue_refresh_token(Uuid::new_v4(), "ada@example.com", SECRET).unwrap();
        let claims = validate_refresh_token(&token, SECRET).unwrap();

        assert_eq!(claims.exp - claims.iat, 30 * 24 * 3600);
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(validate_token("not-a-jwt", SECRET).is_err());
    }
}
