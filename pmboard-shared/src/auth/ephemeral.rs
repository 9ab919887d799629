/// Ephemeral token generation and policy
///
/// Ephemeral tokens are short, random, single-use codes emailed to a user to
/// confirm account activation, deactivation, password reset, account deletion
/// or an MFA challenge. They are unrelated to the signed JWTs in [`super::jwt`].
///
/// # Format
///
/// 32 base62 characters (`[A-Za-z0-9]`). Only the SHA-256 hex digest is
/// persisted; the plaintext exists in the outgoing email and nowhere else.
///
/// # Lifetime
///
/// Five minutes from issue. A user holds at most one live token: issuing a new
/// one deletes the previous one (see [`crate::models::token::Token::issue`]).
///
/// # Example
///
/// ```
/// use pmboard_shared::auth::ephemeral::{generate_token, hash_token, validate_token_format};
///
/// let (token, hash) = generate_token();
/// assert!(validate_token_format(&token));
/// assert_eq!(hash_token(&token), hash);
/// ```

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a plaintext token
pub const TOKEN_LENGTH: usize = 32;

/// Minutes an ephemeral token stays valid
pub const TOKEN_TTL_MINUTES: i64 = 5;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// What an emailed token is meant to confirm
///
/// The purpose only selects the email wording; any live token is accepted by
/// any consuming flow, matching the single-token-per-user rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenPurpose {
    Activate,
    Deactivate,
    PasswordReset,
    DeleteAccount,
    Mfa,
}

impl TokenPurpose {
    /// Email subject line
    pub fn subject(&self) -> &'static str {
        match self {
            TokenPurpose::Activate => "Activate your PMBoard account",
            TokenPurpose::Deactivate => "Confirm deactivation of your PMBoard account",
            TokenPurpose::PasswordReset => "Reset your PMBoard password",
            TokenPurpose::DeleteAccount => "Confirm deletion of your PMBoard account",
            TokenPurpose::Mfa => "Your PMBoard verification code",
        }
    }

    /// Sentence describing the action the token confirms
    pub fn action(&self) -> &'static str {
        match self {
            TokenPurpose::Activate => "activate your account",
            TokenPurpose::Deactivate => "deactivate your account",
            TokenPurpose::PasswordReset => "reset your password",
            TokenPurpose::DeleteAccount => "permanently delete your account",
            TokenPurpose::Mfa => "finish signing in",
        }
    }
}

/// Generates a new token
///
/// # Returns
///
/// Tuple of (plaintext_token, sha256_hex)
pub fn generate_token() -> (String, String) {
    let mut rng = rand::thread_rng();
    let token: String = (0..TOKEN_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    let hash = hash_token(&token);

    (token, hash)
}

/// Hex-encoded SHA-256 of a plaintext token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Checks that a presented token could have been issued by [`generate_token`]
///
/// Lets callers reject garbage before touching the database.
pub fn validate_token_format(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Expiry for a token issued at `issued_at`
pub fn expires_at(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + Duration::minutes(TOKEN_TTL_MINUTES)
}

/// Whether a token with `expires_at` is expired at `now`
///
/// The expiry instant itself is still valid; only `now > expires_at` fails.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now > expires_at
}
