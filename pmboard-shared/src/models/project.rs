/// Project model and database operations
///
/// Creating a project writes three rows in one transaction: the project, its
/// BASE feature and an ADMIN, ACTIVE member row for the creator. Deleting a
/// project is only allowed once it is ARCHIVED and removes everything under it
/// in one transaction.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE project_type AS ENUM ('KANBAN', 'SCRUM', 'WATERFALL');
/// CREATE TYPE project_status AS ENUM ('ACTIVE', 'ARCHIVED');
///
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name TEXT NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     project_type project_type NOT NULL DEFAULT 'KANBAN',
///     status project_status NOT NULL DEFAULT 'ACTIVE',
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (owner_id, name)
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use pmboard_shared::models::project::{CreateProject, Project, ProjectStatus};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, owner_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let details = Project::create(&pool, CreateProject {
///     owner_id,
///     name: "Website".to_string(),
///     description: None,
///     project_type: None,
/// })
/// .await?;
/// let project_id = details.project.id;
///
/// Project::update_status(&pool, project_id, ProjectStatus::Archived).await?;
/// Project::delete(&pool, project_id).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::feature::Feature;
use super::project_member::{MemberRole, MemberStatus, ProjectMember, ProjectMemberDetails};
use super::required_text;
use super::user::UserSummary;
use crate::error::{DomainError, DomainResult};

/// Board layout of a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectType {
    #[default]
    Kanban,
    Scrum,
    Waterfall,
}

/// Whether a project is in use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    #[default]
    Active,

    /// Read-only; the only state from which a project can be deleted
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "ACTIVE",
            ProjectStatus::Archived => "ARCHIVED",
        }
    }
}

/// Project row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,

    pub name: String,

    pub description: String,

    pub project_type: ProjectType,

    pub status: ProjectStatus,

    pub owner_id: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a project
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub owner_id: Uuid,

    pub name: String,

    pub description: Option<String>,

    /// Defaults to KANBAN
    pub project_type: Option<ProjectType>,
}

/// Project with its owner, features and members
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetails {
    #[serde(flatten)]
    pub project: Project,

    pub owner: UserSummary,

    pub features: Vec<Feature>,

    pub members: Vec<ProjectMemberDetails>,
}

/// A project the user belongs to without owning it
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JoinedProject {
    pub project_id: Uuid,

    pub name: String,

    pub owner_id: Uuid,

    pub member_id: Uuid,

    pub role: MemberRole,

    pub member_status: MemberStatus,
}

/// Rejects deletion of a project that has not been archived
pub fn ensure_deletable(status: ProjectStatus) -> DomainResult<()> {
    if status != ProjectStatus::Archived {
        return Err(DomainError::Conflict(
            "Project must be archived before deleting".to_string(),
        ));
    }

    Ok(())
}

const PROJECT_COLUMNS: &str =
    "id, name, description, project_type, status, owner_id, created_at, updated_at";

impl Project {
    /// Creates a project with its BASE feature and owner membership
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidInput` if the name is empty
    /// - `DomainError::Conflict` if the owner already has a project with this name
    /// - `DomainError::NotFound` if the owner does not exist
    pub async fn create(pool: &PgPool, data: CreateProject) -> DomainResult<ProjectDetails> {
        let name = required_text("name", &data.name)?;
        let description = data.description.as_deref().map(str::trim).unwrap_or_default();

        let mut tx = pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (name, description, project_type, owner_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(&name)
        .bind(description)
        .bind(data.project_type.unwrap_or_default())
        .bind(data.owner_id)
        .fetch_one(&mut *tx)
        .await?;

        let base = Feature::create_base(&mut *tx, project.id).await?;
        let owner_member = ProjectMember::create_owner(&mut *tx, project.id, data.owner_id).await?;

        let owner = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, email FROM users WHERE id = $1",
        )
        .bind(data.owner_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(project_id = %project.id, owner_id = %project.owner_id, "Project created");

        let members = vec![ProjectMemberDetails {
            id: owner_member.id,
            project_id: owner_member.project_id,
            user_id: owner_member.user_id,
            name: owner.name.clone(),
            email: owner.email.clone(),
            role: owner_member.role,
            member_status: owner_member.member_status,
            created_at: owner_member.created_at,
        }];

        Ok(ProjectDetails {
            project,
            owner,
            features: vec![base],
            members,
        })
    }

    /// Finds a project by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Loads a project with its owner, features and members
    ///
    /// # Errors
    ///
    /// `DomainError::NotFound` if the project does not exist
    pub async fn details(pool: &PgPool, id: Uuid) -> DomainResult<ProjectDetails> {
        let project = Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Project not found".to_string()))?;

        let owner = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, email FROM users WHERE id = $1",
        )
        .bind(project.owner_id)
        .fetch_one(pool)
        .await?;

        let features = Feature::list_by_project(pool, id).await?;
        let members = ProjectMember::list_by_project(pool, id).await?;

        Ok(ProjectDetails {
            project,
            owner,
            features,
            members,
        })
    }

    /// Replaces the description
    pub async fn update_description(
        pool: &PgPool,
        id: Uuid,
        description: &str,
    ) -> DomainResult<Self> {
        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
            SET description = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(description.trim())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DomainError::NotFound("Project not found".to_string()))?;

        info!(project_id = %id, "Project description updated");
        Ok(project)
    }

    /// Changes the status (ACTIVE or ARCHIVED)
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: ProjectStatus,
    ) -> DomainResult<Self> {
        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DomainError::NotFound("Project not found".to_string()))?;

        info!(project_id = %id, status = status.as_str(), "Project status updated");
        Ok(project)
    }

    /// Deletes an archived project and everything under it
    ///
    /// Assignees, tickets, features, members and the project row are removed
    /// in that order inside one transaction. The project row is locked first,
    /// so a concurrent status change cannot slip in between the check and the
    /// delete.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if the project does not exist
    /// - `DomainError::Conflict` if the project is not ARCHIVED
    pub async fn delete(pool: &PgPool, id: Uuid) -> DomainResult<()> {
        let mut tx = pool.begin().await?;

        let status: ProjectStatus =
            sqlx::query_scalar("SELECT status FROM projects WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| DomainError::NotFound("Project not found".to_string()))?;

        ensure_deletable(status)?;

        sqlx::query(
            r#"
            DELETE FROM ticket_assignees
            WHERE ticket_id IN (
                SELECT t.id FROM tickets t
                JOIN features f ON f.id = t.feature_id
                WHERE f.project_id = $1
            )
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let tickets = sqlx::query(
            r#"
            DELETE FROM tickets
            WHERE feature_id IN (SELECT id FROM features WHERE project_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM features WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM project_members WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            project_id = %id,
            tickets_deleted = tickets.rows_affected(),
            "Project deleted"
        );
        Ok(())
    }

    /// Projects owned by a user, newest first
    pub async fn list_owned(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            SELECT {PROJECT_COLUMNS}
            FROM projects
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner_id)
        .fetch_all(pool)
        .await
    }

    /// Projects a user is a member of but does not own, whatever the member status
    pub async fn list_joined(pool: &PgPool, user_id: Uuid) -> Result<Vec<JoinedProject>, sqlx::Error> {
        sqlx::query_as::<_, JoinedProject>(
            r#"
            SELECT p.id AS project_id, p.name, p.owner_id,
                   pm.id AS member_id, pm.role, pm.member_status
            FROM project_members pm
            JOIN projects p ON p.id = pm.project_id
            WHERE pm.user_id = $1 AND p.owner_id <> $1
            ORDER BY pm.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
