/// Domain error type shared by the model layer
///
/// Model operations that enforce business rules (reserved feature titles,
/// archived-before-delete, single-use tokens, assignment membership) return
/// `DomainError` instead of a bare `sqlx::Error`, so the HTTP layer can map each
/// failure kind to its own status code.
///
/// # Example
///
/// ```
/// use pmboard_shared::error::DomainError;
///
/// let err = DomainError::Conflict("Feature has tickets".to_string());
/// assert_eq!(err.to_string(), "Conflict: Feature has tickets");
/// ```

/// PostgreSQL SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL SQLSTATE for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Failure kinds produced by model operations
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request value is malformed or outside its allowed range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation clashes with current state (duplicates, undeletable rows)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Target user has no qualifying project membership
    #[error("{0}")]
    UserNotAMember(String),

    /// Project member is already linked to the ticket
    #[error("User is already assigned to this ticket")]
    AlreadyAssigned,

    /// Ephemeral token does not exist (never issued, replaced or consumed)
    #[error("Token not found")]
    TokenNotFound,

    /// Ephemeral token exists but its expiry has passed
    #[error("Token has expired")]
    TokenExpired,

    /// Underlying store failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return DomainError::Conflict(conflict_message(&constraint));
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    return DomainError::NotFound(format!(
                        "Referenced record does not exist ({})",
                        constraint
                    ));
                }
                _ => {}
            }
        }

        DomainError::Database(err)
    }
}

/// Maps a unique constraint name to a client-facing message
fn conflict_message(constraint: &str) -> String {
    match constraint {
        "users_email_key" => "Email already exists".to_string(),
        "projects_owner_name_key" => "A project with this name already exists".to_string(),
        "project_members_project_user_key" => {
            "User is already a member of the project.".to_string()
        }
        "features_project_title_key" => {
            "A feature with this title already exists in the project".to_string()
        }
        other => format!("Constraint violation: {}", other),
    }
}

/// Result alias for model operations
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_known_constraints() {
        assert_eq!(conflict_message("users_email_key"), "Email already exists");
        assert_eq!(
            conflict_message("project_members_project_user_key"),
            "User is already a member of the project."
        );
        assert_eq!(
            conflict_message("features_project_title_key"),
            "A feature with this title already exists in the project"
        );
    }

    #[test]
    fn test_conflict_message_unknown_constraint() {
        assert_eq!(
            conflict_message("some_other_key"),
            "Constraint violation: some_other_key"
        );
    }

    #[test]
    fn test_row_not_found_stays_database_error() {
        let err = DomainError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DomainError::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_display() {
        assert_eq!(DomainError::TokenExpired.to_string(), "Token has expired");
        assert_eq!(
            DomainError::UserNotAMember("User is not a member of this project".to_string())
                .to_string(),
            "User is not a member of this project"
        );
    }
}
