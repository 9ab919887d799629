/// API route handlers
///
/// Handlers are grouped by resource:
///
/// - `health`: health check
/// - `auth`: access token refresh
/// - `users`: sign-up, sign-in, profile, settings, membership and the
///   ephemeral-token account flows
/// - `mfa`: emailed second-factor codes
/// - `projects`: projects
/// - `members`: project members
/// - `features`: project features
/// - `tickets`: tickets, time log and assignees
///
/// Project-scoped handlers call the authorization guard first, with the
/// capability the route requires.

pub mod auth;
pub mod features;
pub mod health;
pub mod members;
pub mod mfa;
pub mod projects;
pub mod tickets;
pub mod users;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// JSON body that has passed `validator` checks
///
/// Malformed JSON is rejected with 400; a body that parses but fails
/// validation is rejected with 422 and per-field details.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}
