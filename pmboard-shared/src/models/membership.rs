/// Membership tiers and their lifecycle
///
/// Every user has exactly one current [`Membership`] and at most one scheduled
/// change, modelled as [`PendingMembership`]. A scheduled change is applied
/// lazily: nothing runs in the background, the change is promoted the next time
/// [`Membership::reconcile`] is called after its start date.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE membership_status AS ENUM ('FREE', 'STARTUP', 'TEAM', 'ENTERPRISE');
///
/// CREATE TABLE memberships (
///     user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     status membership_status NOT NULL DEFAULT 'FREE',
///     started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     ends_at TIMESTAMPTZ
/// );
///
/// CREATE TABLE next_memberships (
///     user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     status membership_status NOT NULL,
///     starts_at TIMESTAMPTZ NOT NULL,
///     ends_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use pmboard_shared::models::membership::{DurationUnit, Membership, MembershipStatus};
/// use chrono::{Duration, Utc};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// // Upgrade now, for a month
/// Membership::set(&pool, user_id, MembershipStatus::Team, DurationUnit::Month).await?;
///
/// // Switch to a yearly enterprise plan next week
/// let starts_at = Utc::now() + Duration::days(7);
/// Membership::schedule_next(&pool, user_id, MembershipStatus::Enterprise, starts_at, DurationUnit::Year)
///     .await?;
///
/// // Later: promote the scheduled change if it is due
/// let outcome = Membership::reconcile(&pool, user_id).await?;
/// println!("applied: {}", outcome.applied);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Membership tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipStatus {
    Free,
    Startup,
    Team,
    Enterprise,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Free => "FREE",
            MembershipStatus::Startup => "STARTUP",
            MembershipStatus::Team => "TEAM",
            MembershipStatus::Enterprise => "ENTERPRISE",
        }
    }
}

/// Length of a paid membership term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationUnit {
    Month,
    Year,
}

impl DurationUnit {
    fn months(&self) -> Months {
        match self {
            DurationUnit::Month => Months::new(1),
            DurationUnit::Year => Months::new(12),
        }
    }
}

/// Current membership of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user_id: Uuid,

    pub status: MembershipStatus,

    pub started_at: DateTime<Utc>,

    /// `None` means the tier never expires (the FREE tier at sign-up)
    pub ends_at: Option<DateTime<Utc>>,
}

/// Scheduled membership change
///
/// The single-row-per-user rule lives in the type: a user either has no
/// pending change or exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PendingMembership {
    None,
    Scheduled {
        status: MembershipStatus,
        #[serde(rename = "startsAt")]
        starts_at: DateTime<Utc>,
        #[serde(rename = "endsAt")]
        ends_at: DateTime<Utc>,
    },
}

#[derive(sqlx::FromRow)]
struct NextMembershipRow {
    status: MembershipStatus,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl From<Option<NextMembershipRow>> for PendingMembership {
    fn from(row: Option<NextMembershipRow>) -> Self {
        match row {
            Some(row) => PendingMembership::Scheduled {
                status: row.status,
                starts_at: row.starts_at,
                ends_at: row.ends_at,
            },
            None => PendingMembership::None,
        }
    }
}

impl PendingMembership {
    /// Whether the change should replace the current membership at `now`
    ///
    /// The start date is not re-validated here: a change scheduled for
    /// tomorrow is legitimately due once tomorrow arrives.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            PendingMembership::Scheduled { starts_at, .. } => *starts_at <= now,
            PendingMembership::None => false,
        }
    }

    /// Loads the pending change for a user
    pub async fn find(pool: &PgPool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, NextMembershipRow>(
            r#"
            SELECT status, starts_at, ends_at
            FROM next_memberships
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.into())
    }
}

/// Result of [`Membership::reconcile`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Whether a scheduled change was promoted by this call
    pub applied: bool,

    pub membership: Membership,

    pub next_membership: PendingMembership,
}

/// End of a term of `unit` starting at `anchor`
///
/// Calendar arithmetic: Jan 31 + 1 month is Feb 28 (or 29).
///
/// # Errors
///
/// `DomainError::InvalidInput` if the result overflows the supported date range
pub fn end_of_term(anchor: DateTime<Utc>, unit: DurationUnit) -> DomainResult<DateTime<Utc>> {
    anchor
        .checked_add_months(unit.months())
        .ok_or_else(|| DomainError::InvalidInput("Membership end date is out of range".to_string()))
}

/// Validates the start date of a scheduled change
///
/// # Errors
///
/// `DomainError::InvalidInput` unless `starts_at` is strictly after `now`
pub fn validate_starts_at(starts_at: DateTime<Utc>, now: DateTime<Utc>) -> DomainResult<()> {
    if starts_at <= now {
        return Err(DomainError::InvalidInput(
            "startsAt must be a future date".to_string(),
        ));
    }

    Ok(())
}

/// Computes the membership that results from promoting `pending` at `now`
///
/// Returns `None` when nothing is due, in which case `current` stays as is.
pub fn promote_if_due(
    current: &Membership,
    pending: &PendingMembership,
    now: DateTime<Utc>,
) -> Option<Membership> {
    match pending {
        PendingMembership::Scheduled {
            status,
            starts_at,
            ends_at,
        } if *starts_at <= now => Some(Membership {
            user_id: current.user_id,
            status: *status,
            started_at: *starts_at,
            ends_at: Some(*ends_at),
        }),
        _ => None,
    }
}

impl Membership {
    /// Creates the FREE, non-expiring membership for a new user
    ///
    /// Takes a connection so sign-up can run it in the same transaction as
    /// the user insert.
    pub async fn create_free(conn: &mut PgConnection, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (user_id, status, started_at, ends_at)
            VALUES ($1, 'FREE', NOW(), NULL)
            RETURNING user_id, status, started_at, ends_at
            "#,
        )
        .bind(user_id)
        .fetch_one(conn)
        .await
    }

    /// Finds the current membership of a user
    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT user_id, status, started_at, ends_at
            FROM memberships
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Replaces the current membership immediately
    ///
    /// Starts now and ends one month or one year from now. The status is
    /// overwritten unconditionally, even if it is unchanged.
    ///
    /// # Errors
    ///
    /// `DomainError::NotFound` if the user has no membership row
    pub async fn set(
        pool: &PgPool,
        user_id: Uuid,
        status: MembershipStatus,
        unit: DurationUnit,
    ) -> DomainResult<Self> {
        let now = Utc::now();
        let ends_at = end_of_term(now, unit)?;

        let membership = sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships
            SET status = $2, started_at = $3, ends_at = $4
            WHERE user_id = $1
            RETURNING user_id, status, started_at, ends_at
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(now)
        .bind(ends_at)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DomainError::NotFound("Membership not found".to_string()))?;

        info!(user_id = %user_id, status = status.as_str(), "Membership updated");
        Ok(membership)
    }

    /// Creates or replaces the scheduled membership change
    ///
    /// The term is anchored to `starts_at`, not to now.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidInput` if `starts_at` is not in the future
    /// - `DomainError::NotFound` if the user does not exist
    pub async fn schedule_next(
        pool: &PgPool,
        user_id: Uuid,
        status: MembershipStatus,
        starts_at: DateTime<Utc>,
        unit: DurationUnit,
    ) -> DomainResult<PendingMembership> {
        validate_starts_at(starts_at, Utc::now())?;
        let ends_at = end_of_term(starts_at, unit)?;

        let row = sqlx::query_as::<_, NextMembershipRow>(
            r#"
            INSERT INTO next_memberships (user_id, status, starts_at, ends_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET status = EXCLUDED.status,
                starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at,
                created_at = NOW()
            RETURNING status, starts_at, ends_at
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(starts_at)
        .bind(ends_at)
        .fetch_one(pool)
        .await?;

        info!(
            user_id = %user_id,
            status = status.as_str(),
            starts_at = %starts_at,
            "Next membership scheduled"
        );
        Ok(Some(row).into())
    }

    /// Drops the scheduled change, if any
    ///
    /// # Returns
    ///
    /// True if a scheduled change existed
    pub async fn cancel_next(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM next_memberships WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Promotes the scheduled change if its start date has passed
    ///
    /// Runs in one transaction holding row locks on both rows, so two racing
    /// calls promote at most once: the second one finds the scheduled row
    /// already deleted and reports `applied = false`. Calling it again when
    /// nothing is due is a no-op.
    ///
    /// # Errors
    ///
    /// `DomainError::NotFound` if the user has no membership row
    pub async fn reconcile(pool: &PgPool, user_id: Uuid) -> DomainResult<ReconcileOutcome> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, Membership>(
            r#"
            SELECT user_id, status, started_at, ends_at
            FROM memberships
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::NotFound("Membership not found".to_string()))?;

        let pending: PendingMembership = sqlx::query_as::<_, NextMembershipRow>(
            r#"
            SELECT status, starts_at, ends_at
            FROM next_memberships
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .into();

        let Some(promoted) = promote_if_due(&current, &pending, Utc::now()) else {
            tx.commit().await?;
            debug!(user_id = %user_id, "No membership update needed");
            return Ok(ReconcileOutcome {
                applied: false,
                membership: current,
                next_membership: pending,
            });
        };

        let membership = sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships
            SET status = $2, started_at = $3, ends_at = $4
            WHERE user_id = $1
            RETURNING user_id, status, started_at, ends_at
            "#,
        )
        .bind(user_id)
        .bind(promoted.status)
        .bind(promoted.started_at)
        .bind(promoted.ends_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM next_memberships WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            user_id = %user_id,
            status = membership.status.as_str(),
            "Scheduled membership applied"
        );

        Ok(ReconcileOutcome {
            applied: true,
            membership,
            next_membership: PendingMembership::None,
        })
    }
}
