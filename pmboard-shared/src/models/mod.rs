/// Database models for PMBoard
///
/// Each model owns its queries. Operations that change several rows at once
/// (sign-up, project creation and deletion, token consumption, membership
/// reconciliation) open their own transaction.
///
/// # Models
///
/// - `user`: accounts, settings, and the flows confirmed by ephemeral tokens
/// - `membership`: current tier and scheduled tier change
/// - `token`: single-use ephemeral tokens
/// - `project`: projects and their transactional create/delete
/// - `project_member`: user-to-project links with role and status
/// - `feature`: feature buckets, including the reserved BASE feature
/// - `ticket`: tickets, time log and assignees

pub mod feature;
pub mod membership;
pub mod project;
pub mod project_member;
pub mod ticket;
pub mod token;
pub mod user;

use crate::error::{DomainError, DomainResult};

/// Trims a required text field and rejects it when empty
pub(crate) fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidInput(format!("{} is required", field)));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("title", "  Login page ").unwrap(), "Login page");
        assert!(matches!(
            required_text("title", "   "),
            Err(DomainError::InvalidInput(ref m)) if m == "title is required"
        ));
    }
}
