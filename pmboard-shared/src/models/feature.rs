/// Feature model and database operations
///
/// Features group tickets inside a project. Every project owns exactly one
/// feature titled `BASE`, created with the project; the title is reserved
/// (trimmed, case-insensitive) and that feature can never be deleted. A
/// feature that still has tickets cannot be deleted either.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE features (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     title TEXT NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE UNIQUE INDEX features_project_title_key ON features (project_id, lower(title));
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use super::required_text;
use crate::error::{DomainError, DomainResult};

/// Title of the feature every project starts with
pub const BASE_FEATURE_TITLE: &str = "BASE";

/// Description of the BASE feature
pub const BASE_FEATURE_DESCRIPTION: &str = "Default feature for project management";

/// Whether `title` collides with the reserved BASE title
pub fn is_reserved_title(title: &str) -> bool {
    title.trim().eq_ignore_ascii_case(BASE_FEATURE_TITLE)
}

/// Feature row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: Uuid,

    pub project_id: Uuid,

    pub title: String,

    pub description: String,

    pub created_at: DateTime<Utc>,
}

impl Feature {
    pub fn is_base(&self) -> bool {
        is_reserved_title(&self.title)
    }

    /// Creates the BASE feature of a new project
    pub async fn create_base(conn: &mut PgConnection, project_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Feature>(
            r#"
            INSERT INTO features (project_id, title, description)
            VALUES ($1, $2, $3)
            RETURNING id, project_id, title, description, created_at
            "#,
        )
        .bind(project_id)
        .bind(BASE_FEATURE_TITLE)
        .bind(BASE_FEATURE_DESCRIPTION)
        .fetch_one(conn)
        .await
    }

    /// Adds a feature to a project
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidInput` if the title is empty or reserved
    /// - `DomainError::Conflict` if the project already has a feature with this title
    pub async fn add(
        pool: &PgPool,
        project_id: Uuid,
        title: &str,
        description: Option<&str>,
    ) -> DomainResult<Self> {
        let title = required_text("title", title)?;
        if is_reserved_title(&title) {
            return Err(DomainError::InvalidInput(format!(
                "\"{}\" is a reserved feature title",
                BASE_FEATURE_TITLE
            )));
        }

        let feature = sqlx::query_as::<_, Feature>(
            r#"
            INSERT INTO features (project_id, title, description)
            VALUES ($1, $2, $3)
            RETURNING id, project_id, title, description, created_at
            "#,
        )
        .bind(project_id)
        .bind(&title)
        .bind(description.unwrap_or_default())
        .fetch_one(pool)
        .await?;

        info!(project_id = %project_id, feature_id = %feature.id, "Feature added");
        Ok(feature)
    }

    /// Lists the features of a project, BASE first
    pub async fn list_by_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Feature>(
            r#"
            SELECT id, project_id, title, description, created_at
            FROM features
            WHERE project_id = $1
            ORDER BY (upper(title) = 'BASE') DESC, created_at ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Deletes a feature from a project
    ///
    /// The feature row is locked first, so a ticket cannot be attached to it
    /// between the ticket check and the delete.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if the feature is not in the project
    /// - `DomainError::Conflict` for the BASE feature or a feature with tickets
    pub async fn delete(pool: &PgPool, project_id: Uuid, feature_id: Uuid) -> DomainResult<()> {
        let mut tx = pool.begin().await?;

        let feature = sqlx::query_as::<_, Feature>(
            r#"
            SELECT id, project_id, title, description, created_at
            FROM features
            WHERE id = $1 AND project_id = $2
            FOR UPDATE
            "#,
        )
        .bind(feature_id)
        .bind(project_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::NotFound("Feature not found".to_string()))?;

        if feature.is_base() {
            return Err(DomainError::Conflict(
                "The BASE feature cannot be deleted".to_string(),
            ));
        }

        let ticket_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE feature_id = $1")
                .bind(feature_id)
                .fetch_one(&mut *tx)
                .await?;

        if ticket_count > 0 {
            return Err(DomainError::Conflict(format!(
                "Feature has {} ticket(s) and cannot be deleted",
                ticket_count
            )));
        }

        sqlx::query("DELETE FROM features WHERE id = $1")
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(project_id = %project_id, feature_id = %feature_id, "Feature deleted");
        Ok(())
    }
}
