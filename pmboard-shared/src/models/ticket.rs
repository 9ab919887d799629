/// Ticket model and database operations
///
/// Tickets belong to a feature and, through it, to a project. Every lookup is
/// scoped by project, so a ticket ID from another project is reported as not
/// found. Assignees are project members: adding one requires an ACTIVE member,
/// removing one only requires that a member row still exists.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tickets (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     feature_id UUID NOT NULL REFERENCES features(id) ON DELETE CASCADE,
///     title TEXT NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     status ticket_status NOT NULL DEFAULT 'UNASSIGNED',
///     priority ticket_priority NOT NULL DEFAULT 'NONE',
///     section ticket_section NOT NULL DEFAULT 'ACTIVE',
///     time_log INTEGER NOT NULL DEFAULT 0 CHECK (time_log >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE ticket_assignees (
///     ticket_id UUID NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
///     project_member_id UUID NOT NULL REFERENCES project_members(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (ticket_id, project_member_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::project_member::{MemberStatus, ProjectMember};
use super::required_text;
use crate::error::{DomainError, DomainResult};

/// Workflow state of a ticket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    #[default]
    Unassigned,
    InProgress,
    InReview,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_priority", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    #[default]
    None,
    Low,
    Moderate,
    High,
    Urgent,
}

/// Board section a ticket is shown in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_section", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketSection {
    #[default]
    Active,
    Archived,
    Backlog,
}

/// Ticket row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,

    pub feature_id: Uuid,

    pub title: String,

    pub description: String,

    pub status: TicketStatus,

    pub priority: TicketPriority,

    pub section: TicketSection,

    /// Logged time in minutes
    pub time_log: i32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Member assigned to a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    pub project_member_id: Uuid,

    pub user_id: Uuid,

    pub name: String,

    pub email: String,

    pub member_status: MemberStatus,
}

/// Ticket with its assignees
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketWithAssignees {
    #[serde(flatten)]
    pub ticket: Ticket,

    pub assignees: Vec<Assignee>,
}

/// Input for creating a ticket
#[derive(Debug, Clone, Default)]
pub struct CreateTicket {
    pub feature_id: Uuid,

    pub title: String,

    pub description: Option<String>,

    pub status: Option<TicketStatus>,

    pub priority: Option<TicketPriority>,

    pub section: Option<TicketSection>,
}

/// Partial ticket update; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateTicket {
    pub title: Option<String>,

    pub description: Option<String>,

    pub status: Option<TicketStatus>,

    pub priority: Option<TicketPriority>,

    pub section: Option<TicketSection>,
}

/// Returns the member ID to link when `member` may be assigned
pub fn check_assignable(member: Option<&ProjectMember>) -> DomainResult<Uuid> {
    match member {
        Some(m) if m.is_active() => Ok(m.id),
        _ => Err(DomainError::UserNotAMember(
            "User is not an active member of this project".to_string(),
        )),
    }
}

/// Returns the member ID to unlink; any member status is accepted
pub fn check_removable(member: Option<&ProjectMember>) -> DomainResult<Uuid> {
    member.map(|m| m.id).ok_or_else(|| {
        DomainError::UserNotAMember("User is not a member of this project".to_string())
    })
}

/// Rejects negative time logs
pub fn validate_time_log(minutes: i32) -> DomainResult<()> {
    if minutes < 0 {
        return Err(DomainError::InvalidInput(
            "timeLog must be a non-negative number of minutes".to_string(),
        ));
    }

    Ok(())
}

const TICKET_COLUMNS: &str = "t.id, t.feature_id, t.title, t.description, t.status, t.priority, \
     t.section, t.time_log, t.created_at, t.updated_at";

fn ticket_not_found() -> DomainError {
    DomainError::NotFound("Ticket not found".to_string())
}

impl Ticket {
    /// Creates a ticket under a feature of the project
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidInput` if the title is empty
    /// - `DomainError::NotFound` if the feature is not in the project
    pub async fn create(pool: &PgPool, project_id: Uuid, data: CreateTicket) -> DomainResult<Self> {
        let title = required_text("title", &data.title)?;

        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            INSERT INTO tickets AS t (feature_id, title, description, status, priority, section)
            SELECT f.id, $3, $4, $5, $6, $7
            FROM features f
            WHERE f.id = $1 AND f.project_id = $2
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(data.feature_id)
        .bind(project_id)
        .bind(&title)
        .bind(data.description.as_deref().map(str::trim).unwrap_or_default())
        .bind(data.status.unwrap_or_default())
        .bind(data.priority.unwrap_or_default())
        .bind(data.section.unwrap_or_default())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DomainError::NotFound("Feature not found".to_string()))?;

        info!(project_id = %project_id, ticket_id = %ticket.id, "Ticket created");
        Ok(ticket)
    }

    /// Lists the tickets of a project, newest first
    pub async fn list_by_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ticket>(&format!(
            r#"
            SELECT {TICKET_COLUMNS}
            FROM tickets t
            JOIN features f ON f.id = t.feature_id
            WHERE f.project_id = $1
            ORDER BY t.created_at DESC
            "#
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Finds a ticket inside a project
    pub async fn find_in_project(
        pool: &PgPool,
        project_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ticket>(&format!(
            r#"
            SELECT {TICKET_COLUMNS}
            FROM tickets t
            JOIN features f ON f.id = t.feature_id
            WHERE t.id = $1 AND f.project_id = $2
            "#
        ))
        .bind(ticket_id)
        .bind(project_id)
        .fetch_optional(pool)
        .await
    }

    /// Loads a ticket inside a project together with its assignees
    pub async fn with_assignees(
        pool: &PgPool,
        project_id: Uuid,
        ticket_id: Uuid,
    ) -> DomainResult<TicketWithAssignees> {
        let ticket = Self::find_in_project(pool, project_id, ticket_id)
            .await?
            .ok_or_else(ticket_not_found)?;
        let assignees = Self::assignees(pool, ticket.id).await?;

        Ok(TicketWithAssignees { ticket, assignees })
    }

    /// Members assigned to a ticket
    pub async fn assignees(pool: &PgPool, ticket_id: Uuid) -> Result<Vec<Assignee>, sqlx::Error> {
        sqlx::query_as::<_, Assignee>(
            r#"
            SELECT pm.id AS project_member_id, pm.user_id, u.name, u.email, pm.member_status
            FROM ticket_assignees ta
            JOIN project_members pm ON pm.id = ta.project_member_id
            JOIN users u ON u.id = pm.user_id
            WHERE ta.ticket_id = $1
            ORDER BY ta.created_at ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(pool)
        .await
    }

    /// Applies a partial update
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidInput` if a provided title is empty
    /// - `DomainError::NotFound` if the ticket is not in the project
    pub async fn update(
        pool: &PgPool,
        project_id: Uuid,
        ticket_id: Uuid,
        changes: UpdateTicket,
    ) -> DomainResult<Self> {
        let title = changes
            .title
            .as_deref()
            .map(|t| required_text("title", t))
            .transpose()?;

        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            UPDATE tickets AS t
            SET title = COALESCE($3, t.title),
                description = COALESCE($4, t.description),
                status = COALESCE($5, t.status),
                priority = COALESCE($6, t.priority),
                section = COALESCE($7, t.section),
                updated_at = NOW()
            FROM features f
            WHERE t.id = $1 AND f.id = t.feature_id AND f.project_id = $2
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(project_id)
        .bind(title)
        .bind(changes.description.as_deref().map(str::trim))
        .bind(changes.status)
        .bind(changes.priority)
        .bind(changes.section)
        .fetch_optional(pool)
        .await?
        .ok_or_else(ticket_not_found)?;

        info!(ticket_id = %ticket_id, "Ticket updated");
        Ok(ticket)
    }

    /// Deletes a ticket; its assignee links go with it
    pub async fn delete(pool: &PgPool, project_id: Uuid, ticket_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM tickets t
            USING features f
            WHERE t.id = $1 AND f.id = t.feature_id AND f.project_id = $2
            "#,
        )
        .bind(ticket_id)
        .bind(project_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ticket_not_found());
        }

        info!(project_id = %project_id, ticket_id = %ticket_id, "Ticket deleted");
        Ok(())
    }

    /// Sets the logged time in minutes
    ///
    /// # Errors
    ///
    /// `DomainError::InvalidInput` if `minutes` is negative
    pub async fn set_time_log(
        pool: &PgPool,
        project_id: Uuid,
        ticket_id: Uuid,
        minutes: i32,
    ) -> DomainResult<Self> {
        validate_time_log(minutes)?;

        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            UPDATE tickets AS t
            SET time_log = $3, updated_at = NOW()
            FROM features f
            WHERE t.id = $1 AND f.id = t.feature_id AND f.project_id = $2
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(project_id)
        .bind(minutes)
        .fetch_optional(pool)
        .await?
        .ok_or_else(ticket_not_found)?;

        info!(ticket_id = %ticket_id, time_log = minutes, "Ticket time log set");
        Ok(ticket)
    }

    /// Resets the logged time to zero
    pub async fn clear_time_log(
        pool: &PgPool,
        project_id: Uuid,
        ticket_id: Uuid,
    ) -> DomainResult<Self> {
        Self::set_time_log(pool, project_id, ticket_id, 0).await
    }

    /// Assigns a user to a ticket
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if the ticket is not in the project
    /// - `DomainError::UserNotAMember` unless the user is an ACTIVE member
    /// - `DomainError::AlreadyAssigned` if the user is already assigned
    pub async fn add_assignee(
        pool: &PgPool,
        project_id: Uuid,
        ticket_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<TicketWithAssignees> {
        let ticket = Self::find_in_project(pool, project_id, ticket_id)
            .await?
            .ok_or_else(ticket_not_found)?;

        let mut tx = pool.begin().await?;

        // Holds the member row so its status cannot change before the insert
        let member = sqlx::query_as::<_, ProjectMember>(
            r#"
            SELECT id, project_id, user_id, role, member_status, created_at
            FROM project_members
            WHERE project_id = $1 AND user_id = $2
            FOR SHARE
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let member_id = check_assignable(member.as_ref())?;

        let result = sqlx::query(
            r#"
            INSERT INTO ticket_assignees (ticket_id, project_member_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(ticket.id)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AlreadyAssigned);
        }

        tx.commit().await?;

        info!(ticket_id = %ticket.id, user_id = %user_id, "Assignee added");

        let assignees = Self::assignees(pool, ticket.id).await?;
        Ok(TicketWithAssignees { ticket, assignees })
    }

    /// Unassigns a user from a ticket
    ///
    /// # Returns
    ///
    /// Whether an assignment was removed
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if the ticket is not in the project
    /// - `DomainError::UserNotAMember` if the user has no member row in the project
    pub async fn remove_assignee(
        pool: &PgPool,
        project_id: Uuid,
        ticket_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<bool> {
        let ticket = Self::find_in_project(pool, project_id, ticket_id)
            .await?
            .ok_or_else(ticket_not_found)?;

        let member = ProjectMember::find(pool, project_id, user_id).await?;
        let member_id = check_removable(member.as_ref())?;

        let result = sqlx::query(
            "DELETE FROM ticket_assignees WHERE ticket_id = $1 AND project_member_id = $2",
        )
        .bind(ticket.id)
        .bind(member_id)
        .execute(pool)
        .await?;

        let removed = result.rows_affected() > 0;
        info!(ticket_id = %ticket.id, user_id = %user_id, removed, "Assignee removed");
        Ok(removed)
    }
}
