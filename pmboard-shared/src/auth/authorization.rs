/// Project authorization guard
///
/// Every project-scoped operation requires one of three capabilities:
///
/// 1. **Owner**: the user created the project
/// 2. **AdminOrOwner**: the owner, or an ACTIVE member with the ADMIN role
/// 3. **MemberOrOwner**: the owner, or any ACTIVE member
///
/// Ownership grants every capability. A member row only counts while its
/// status is ACTIVE; PENDING and INACTIVE members are treated like strangers.
///
/// The decision itself is pure ([`ProjectAccess::allows`], [`decide`]); the
/// async wrappers load a [`ProjectAccess`] snapshot with a single query.
///
/// # Example
///
/// ```no_run
/// use pmboard_shared::auth::authorization::{authorize, Capability};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// async fn delete_feature(pool: &PgPool, user_id: Uuid, project_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
///     authorize(pool, Some(user_id), project_id, Capability::AdminOrOwner).await?;
///     // ... perform the change
///     Ok(())
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::project_member::{MemberRole, MemberStatus};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// No authenticated user
    #[error("Authentication required")]
    Unauthenticated,

    /// The project does not exist
    #[error("Project not found")]
    ProjectNotFound,

    /// The user lacks the required capability
    #[error("You do not have permission to perform this action")]
    Forbidden,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Capability required by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Owner,
    AdminOrOwner,
    MemberOrOwner,
}

/// A user's relationship to a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectAccess {
    pub project_id: Uuid,

    pub user_id: Uuid,

    pub owner_id: Uuid,

    /// Role and status of the user's member row, if any
    pub member: Option<(MemberRole, MemberStatus)>,
}

#[derive(sqlx::FromRow)]
struct AccessRow {
    owner_id: Uuid,
    role: Option<MemberRole>,
    member_status: Option<MemberStatus>,
}

impl ProjectAccess {
    /// Loads the snapshot, or `None` when the project does not exist
    pub async fn load(
        pool: &PgPool,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, AccessRow>(
            r#"
            SELECT p.owner_id, pm.role, pm.member_status
            FROM projects p
            LEFT JOIN project_members pm
                ON pm.project_id = p.id AND pm.user_id = $2
            WHERE p.id = $1
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|row| ProjectAccess {
            project_id,
            user_id,
            owner_id: row.owner_id,
            member: row.role.zip(row.member_status),
        }))
    }

    pub fn is_owner(&self) -> bool {
        self.user_id == self.owner_id
    }

    fn active_role(&self) -> Option<MemberRole> {
        match self.member {
            Some((role, MemberStatus::Active)) => Some(role),
            _ => None,
        }
    }

    pub fn is_member_or_owner(&self) -> bool {
        self.is_owner() || self.active_role().is_some()
    }

    pub fn is_admin_or_owner(&self) -> bool {
        self.is_owner() || self.active_role() == Some(MemberRole::Admin)
    }

    /// Whether this relationship grants `capability`
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Owner => self.is_owner(),
            Capability::AdminOrOwner => self.is_admin_or_owner(),
            Capability::MemberOrOwner => self.is_member_or_owner(),
        }
    }
}

/// Decides an authorization request from an already loaded snapshot
///
/// `access` is `None` when the project does not exist. Authentication is
/// checked before the project, so anonymous callers cannot discover which
/// project IDs exist.
pub fn decide(
    user_id: Option<Uuid>,
    access: Option<&ProjectAccess>,
    capability: Capability,
) -> Result<(), AuthzError> {
    if user_id.is_none() {
        return Err(AuthzError::Unauthenticated);
    }

    let access = access.ok_or(AuthzError::ProjectNotFound)?;
    if !access.allows(capability) {
        return Err(AuthzError::Forbidden);
    }

    Ok(())
}

/// Checks that `user_id` holds `capability` on `project_id`
///
/// # Errors
///
/// - `AuthzError::Unauthenticated` if `user_id` is `None`
/// - `AuthzError::ProjectNotFound` if the project does not exist
/// - `AuthzError::Forbidden` if the capability is not granted
pub async fn authorize(
    pool: &PgPool,
    user_id: Option<Uuid>,
    project_id: Uuid,
    capability: Capability,
) -> Result<ProjectAccess, AuthzError> {
    let user_id = user_id.ok_or(AuthzError::Unauthenticated)?;
    let access = ProjectAccess::load(pool, project_id, user_id).await?;

    decide(Some(user_id), access.as_ref(), capability)?;
    access.ok_or(AuthzError::ProjectNotFound)
}

pub async fn is_owner(
    pool: &PgPool,
    user_id: Option<Uuid>,
    project_id: Uuid,
) -> Result<ProjectAccess, AuthzError> {
    authorize(pool, user_id, project_id, Capability::Owner).await
}

pub async fn is_member_or_owner(
    pool: &PgPool,
    user_id: Option<Uuid>,
    project_id: Uuid,
) -> Result<ProjectAccess, AuthzError> {
    authorize(pool, user_id, project_id, Capability::MemberOrOwner).await
}

pub async fn is_admin_or_owner(
    pool: &PgPool,
    user_id: Option<Uuid>,
    project_id: Uuid,
) -> Result<ProjectAccess, AuthzError> {
    authorize(pool, user_id, project_id, Capability::AdminOrOwner).await
}
