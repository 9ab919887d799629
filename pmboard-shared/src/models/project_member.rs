/// Project member model and database operations
///
/// A project member links a user to a project with a role and a status. New
/// members start PENDING; only ACTIVE members gain access through the
/// authorization guard and can be assigned to tickets. The project creator
/// gets an ADMIN, ACTIVE row when the project is created.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE member_role AS ENUM ('ADMIN', 'MEMBER');
/// CREATE TYPE member_status AS ENUM ('PENDING', 'ACTIVE', 'INACTIVE');
///
/// CREATE TABLE project_members (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role member_role NOT NULL DEFAULT 'MEMBER',
///     member_status member_status NOT NULL DEFAULT 'PENDING',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (project_id, user_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Role of a member inside a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    /// Manages features and members
    Admin,

    /// Works on tickets
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "ADMIN",
            MemberRole::Member => "MEMBER",
        }
    }
}

/// Lifecycle state of a membership
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    /// Invited, grants nothing yet
    #[default]
    Pending,

    /// Grants project access
    Active,

    /// Suspended, grants nothing
    Inactive,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Pending => "PENDING",
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Inactive => "INACTIVE",
        }
    }
}

/// Project member row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    pub id: Uuid,

    pub project_id: Uuid,

    pub user_id: Uuid,

    pub role: MemberRole,

    pub member_status: MemberStatus,

    pub created_at: DateTime<Utc>,
}

/// Project member joined with the user's name and email
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMemberDetails {
    pub id: Uuid,

    pub project_id: Uuid,

    pub user_id: Uuid,

    pub name: String,

    pub email: String,

    pub role: MemberRole,

    pub member_status: MemberStatus,

    pub created_at: DateTime<Utc>,
}

impl ProjectMember {
    pub fn is_active(&self) -> bool {
        self.member_status == MemberStatus::Active
    }

    /// Adds the project creator as an ADMIN, ACTIVE member
    pub async fn create_owner(
        conn: &mut PgConnection,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            r#"
            INSERT INTO project_members (project_id, user_id, role, member_status)
            VALUES ($1, $2, 'ADMIN', 'ACTIVE')
            RETURNING id, project_id, user_id, role, member_status, created_at
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(conn)
        .await
    }

    /// Adds a user to a project as PENDING
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if the user does not exist
    /// - `DomainError::Conflict` if the user is already a member
    pub async fn add(
        pool: &PgPool,
        project_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> DomainResult<Self> {
        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        if !user_exists {
            return Err(DomainError::NotFound("User not found".to_string()));
        }

        if Self::find(pool, project_id, user_id).await?.is_some() {
            return Err(DomainError::Conflict(
                "User is already a member of the project.".to_string(),
            ));
        }

        // The unique constraint still guards against a concurrent insert.
        let member = sqlx::query_as::<_, ProjectMember>(
            r#"
            INSERT INTO project_members (project_id, user_id, role, member_status)
            VALUES ($1, $2, $3, 'PENDING')
            RETURNING id, project_id, user_id, role, member_status, created_at
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(pool)
        .await?;

        info!(
            project_id = %project_id,
            user_id = %user_id,
            role = role.as_str(),
            "Project member added"
        );
        Ok(member)
    }

    /// Finds the membership of a user in a project, whatever its status
    pub async fn find(
        pool: &PgPool,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            r#"
            SELECT id, project_id, user_id, role, member_status, created_at
            FROM project_members
            WHERE project_id = $1 AND user_id = $2
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists members of a project with their names, oldest first
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMemberDetails>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMemberDetails>(
            r#"
            SELECT pm.id, pm.project_id, pm.user_id, u.name, u.email,
                   pm.role, pm.member_status, pm.created_at
            FROM project_members pm
            JOIN users u ON u.id = pm.user_id
            WHERE pm.project_id = $1
            ORDER BY pm.created_at ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Locks a member row and returns `(user_id, owner_id)` for it
    async fn lock_with_owner(
        conn: &mut PgConnection,
        project_id: Uuid,
        member_id: Uuid,
    ) -> DomainResult<(Uuid, Uuid)> {
        let row: Option<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT pm.user_id, p.owner_id
            FROM project_members pm
            JOIN projects p ON p.id = pm.project_id
            WHERE pm.project_id = $1 AND pm.id = $2
            FOR UPDATE OF pm
            "#,
        )
        .bind(project_id)
        .bind(member_id)
        .fetch_optional(conn)
        .await?;

        row.ok_or_else(|| DomainError::NotFound("Project member not found".to_string()))
    }

    /// Changes the role of a member
    ///
    /// The owner's row stays ADMIN.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if `member_id` is not a member of `project_id`
    /// - `DomainError::Conflict` if the owner would lose the ADMIN role
    pub async fn update_role(
        pool: &PgPool,
        project_id: Uuid,
        member_id: Uuid,
        role: MemberRole,
    ) -> DomainResult<Self> {
        let mut tx = pool.begin().await?;

        let (user_id, owner_id) = Self::lock_with_owner(&mut tx, project_id, member_id).await?;
        if user_id == owner_id && role != MemberRole::Admin {
            return Err(DomainError::Conflict(
                "The project owner must remain an ADMIN".to_string(),
            ));
        }

        let member = sqlx::query_as::<_, ProjectMember>(
            r#"
            UPDATE project_members
            SET role = $2
            WHERE id = $1
            RETURNING id, project_id, user_id, role, member_status, created_at
            "#,
        )
        .bind(member_id)
        .bind(role)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(member_id = %member_id, role = role.as_str(), "Project member role updated");
        Ok(member)
    }

    /// Changes the status of a member
    ///
    /// The owner's row stays ACTIVE.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if `member_id` is not a member of `project_id`
    /// - `DomainError::Conflict` if the owner would stop being ACTIVE
    pub async fn update_status(
        pool: &PgPool,
        project_id: Uuid,
        member_id: Uuid,
        status: MemberStatus,
    ) -> DomainResult<Self> {
        let mut tx = pool.begin().await?;

        let (user_id, owner_id) = Self::lock_with_owner(&mut tx, project_id, member_id).await?;
        if user_id == owner_id && status != MemberStatus::Active {
            return Err(DomainError::Conflict(
                "The project owner must remain ACTIVE".to_string(),
            ));
        }

        let member = sqlx::query_as::<_, ProjectMember>(
            r#"
            UPDATE project_members
            SET member_status = $2
            WHERE id = $1
            RETURNING id, project_id, user_id, role, member_status, created_at
            "#,
        )
        .bind(member_id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            member_id = %member_id,
            member_status = status.as_str(),
            "Project member status updated"
        );
        Ok(member)
    }

    /// Removes a member from a project
    ///
    /// Their ticket assignments go with them.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if `member_id` is not a member of `project_id`
    /// - `DomainError::Conflict` if the member is the project owner
    pub async fn remove(pool: &PgPool, project_id: Uuid, member_id: Uuid) -> DomainResult<()> {
        let mut tx = pool.begin().await?;

        let (user_id, owner_id) = Self::lock_with_owner(&mut tx, project_id, member_id).await?;
        if user_id == owner_id {
            return Err(DomainError::Conflict(
                "The project owner cannot be removed from the project".to_string(),
            ));
        }

        sqlx::query("DELETE FROM project_members WHERE id = $1")
            .bind(member_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(project_id = %project_id, member_id = %member_id, "Project member removed");
        Ok(())
    }
}
