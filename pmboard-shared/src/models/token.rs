/// Ephemeral token persistence
///
/// A user holds at most one live token (`UNIQUE (user_id)`). Tokens are looked
/// up by the SHA-256 of the presented plaintext and are deleted in the same
/// transaction as the action they confirm, which makes them single-use even
/// under concurrent requests: the row lock taken by [`Token::consume`] makes a
/// racing second consumer wait, after which it finds nothing.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tokens (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
///     token_hash TEXT NOT NULL UNIQUE,
///     expires_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::auth::ephemeral;
use crate::error::{DomainError, DomainResult};

/// Stored ephemeral token
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Token {
    pub id: Uuid,

    pub user_id: Uuid,

    /// SHA-256 hex of the plaintext
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl Token {
    /// Issues a new token for a user, replacing any previous one
    ///
    /// # Returns
    ///
    /// The plaintext token. It is not stored and cannot be recovered later.
    pub async fn issue(pool: &PgPool, user_id: Uuid) -> Result<String, sqlx::Error> {
        let (token, token_hash) = ephemeral::generate_token();
        let expires_at = ephemeral::expires_at(Utc::now());

        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(user_id = %user_id, expires_at = %expires_at, "Ephemeral token issued");
        Ok(token)
    }

    /// Locks the live token matching `token` and deletes it
    ///
    /// Must run inside the caller's transaction, together with the action the
    /// token confirms. If the caller rolls back, the token survives.
    ///
    /// # Errors
    ///
    /// - `DomainError::TokenNotFound` if no token matches (malformed, replaced or consumed)
    /// - `DomainError::TokenExpired` if the token is past its expiry
    pub async fn consume(conn: &mut PgConnection, token: &str) -> DomainResult<Self> {
        if !ephemeral::validate_token_format(token) {
            return Err(DomainError::TokenNotFound);
        }

        let stored = sqlx::query_as::<_, Token>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at
            FROM tokens
            WHERE token_hash = $1
            FOR UPDATE
            "#,
        )
        .bind(ephemeral::hash_token(token))
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DomainError::TokenNotFound)?;

        if ephemeral::is_expired(stored.expires_at, Utc::now()) {
            return Err(DomainError::TokenExpired);
        }

        sqlx::query("DELETE FROM tokens WHERE id = $1")
            .bind(stored.id)
            .execute(&mut *conn)
            .await?;

        Ok(stored)
    }

    /// Consumes a token that must belong to `user_id`
    ///
    /// Used for MFA, where the user is already authenticated. A token issued
    /// to someone else is reported as not found and left untouched.
    pub async fn verify_for_user(pool: &PgPool, user_id: Uuid, token: &str) -> DomainResult<()> {
        let mut tx = pool.begin().await?;

        let stored = Token::consume(&mut *tx, token).await?;
        if stored.user_id != user_id {
            return Err(DomainError::TokenNotFound);
        }

        tx.commit().await?;

        debug!(user_id = %user_id, "Ephemeral token verified");
        Ok(())
    }
}
