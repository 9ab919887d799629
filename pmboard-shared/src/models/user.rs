/// User model and database operations
///
/// Users sign up with an email and password and start inactive with a FREE
/// membership. Account state changes that need email confirmation (activate,
/// deactivate, password reset, deletion) consume an ephemeral token in the
/// same transaction as the change.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email TEXT NOT NULL,                 -- unique on lower(email)
///     password_hash TEXT NOT NULL,
///     name TEXT NOT NULL,
///     is_active BOOLEAN NOT NULL DEFAULT FALSE,
///     settings JSONB NOT NULL DEFAULT '{}'::jsonb,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use pmboard_shared::models::user::{CreateUser, User};
/// # use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let (user, membership) = User::create_with_membership(&pool, CreateUser {
///     email: "ada@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     name: "Ada".to_string(),
/// })
/// .await?;
///
/// let found = User::find_by_email(&pool, "ADA@example.com").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use super::membership::Membership;
use super::token::Token;
use crate::error::{DomainError, DomainResult};

/// User account
///
/// The password hash is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,

    /// Stored lowercase; unique case-insensitively
    pub email: String,

    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub name: String,

    /// False until the account is activated with an emailed token
    pub is_active: bool,

    /// Free-form client settings (always a JSON object)
    pub settings: JsonValue,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,

    /// Argon2id hash, never the plaintext password
    pub password_hash: String,

    pub name: String,
}

/// Name and email of a user, for embedding in other resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Canonical form of an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Checks that settings are a JSON object
pub fn validate_settings(settings: &JsonValue) -> DomainResult<()> {
    if !settings.is_object() {
        return Err(DomainError::InvalidInput(
            "Invalid settings parameter".to_string(),
        ));
    }

    Ok(())
}

const USER_COLUMNS: &str =
    "id, email, password_hash, name, is_active, settings, created_at, updated_at";

impl User {
    /// Creates a user together with their FREE membership
    ///
    /// Both rows are written in one transaction.
    ///
    /// # Errors
    ///
    /// `DomainError::Conflict` if the email is already registered
    pub async fn create_with_membership(
        pool: &PgPool,
        data: CreateUser,
    ) -> DomainResult<(Self, Membership)> {
        let mut tx = pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, name)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(normalize_email(&data.email))
        .bind(data.password_hash)
        .bind(data.name.trim())
        .fetch_one(&mut *tx)
        .await?;

        let membership = Membership::create_free(&mut *tx, user.id).await?;

        tx.commit().await?;

        info!(user_id = %user.id, "User signed up");
        Ok((user, membership))
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email, ignoring case and surrounding whitespace
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
    }

    /// Replaces the settings document
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidInput` if `settings` is not a JSON object
    /// - `DomainError::NotFound` if the user does not exist
    pub async fn update_settings(
        pool: &PgPool,
        id: Uuid,
        settings: JsonValue,
    ) -> DomainResult<Self> {
        validate_settings(&settings)?;

        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET settings = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(settings)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DomainError::NotFound("User not found".to_string()))
    }

    /// Activates (`true`) or deactivates (`false`) the account owning `token`
    ///
    /// # Errors
    ///
    /// `DomainError::TokenNotFound` or `DomainError::TokenExpired`
    pub async fn set_active_with_token(
        pool: &PgPool,
        token: &str,
        is_active: bool,
    ) -> DomainResult<Self> {
        let mut tx = pool.begin().await?;

        let stored = Token::consume(&mut *tx, token).await?;
        let user = Self::set_active(&mut *tx, stored.user_id, is_active).await?;

        tx.commit().await?;

        info!(user_id = %user.id, is_active, "Account activation state changed");
        Ok(user)
    }

    async fn set_active(conn: &mut PgConnection, id: Uuid, is_active: bool) -> DomainResult<Self> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DomainError::NotFound("User not found".to_string()))
    }

    /// Replaces the password of the account owning `token`
    ///
    /// The caller must also know the account email. On a mismatch the token is
    /// kept, so the rightful owner can still use it.
    ///
    /// # Errors
    ///
    /// - `DomainError::TokenNotFound` or `DomainError::TokenExpired`
    /// - `DomainError::InvalidInput` if `email` does not belong to the token's user
    pub async fn reset_password_with_token(
        pool: &PgPool,
        token: &str,
        email: &str,
        new_password_hash: String,
    ) -> DomainResult<Self> {
        let mut tx = pool.begin().await?;

        let stored = Token::consume(&mut *tx, token).await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $3, updated_at = NOW()
            WHERE id = $1 AND lower(email) = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(stored.user_id)
        .bind(normalize_email(email))
        .bind(new_password_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::InvalidInput("Token does not match the email".to_string()))?;

        tx.commit().await?;

        info!(user_id = %user.id, "Password reset");
        Ok(user)
    }

    /// Deletes the account owning `token`
    ///
    /// Foreign keys cascade to the user's memberships, project memberships,
    /// tokens and owned projects (with their features, tickets and members).
    ///
    /// # Returns
    ///
    /// The deleted user's ID
    pub async fn delete_with_token(pool: &PgPool, token: &str) -> DomainResult<Uuid> {
        let mut tx = pool.begin().await?;

        let stored = Token::consume(&mut *tx, token).await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(stored.user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound("User not found".to_string()));
        }

        tx.commit().await?;

        info!(user_id = %stored.user_id, "User deleted");
        Ok(stored.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_validate_settings() {
        assert!(validate_settings(&json!({ "theme": "dark" })).is_ok());
        assert!(validate_settings(&json!({})).is_ok());

        for invalid in [json!("dark"), json!([1, 2]), json!(null), json!(42)] {
            assert!(matches!(
                validate_settings(&invalid),
                Err(DomainError::InvalidInput(ref m)) if m == "Invalid settings parameter"
            ));
        }
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            name: "Ada".to_string(),
            is_active: false,
            settings: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("passwordHash").is_none());
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["isActive"], false);
    }
}
