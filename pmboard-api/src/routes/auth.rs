/// Token refresh
///
/// # Endpoints
///
/// - `POST /v1/auth/refresh` - exchange a refresh token for a new access token

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::ValidatedJson,
};
use axum::{extract::State, Json};
use pmboard_shared::{auth::jwt, models::user::User};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Refresh token request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refreshToken is required"))]
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// New access token (1h)
    pub access_token: String,
}

/// Issues a new access token
///
/// The account is looked up again by the email in the refresh token, so a
/// deleted account cannot keep refreshing. The refresh token itself is not
/// rotated.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/refresh
/// Content-Type: application/json
///
/// { "refreshToken": "eyJ..." }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: invalid, expired, or access (not refresh) token
/// - `404 Not Found`: the account no longer exists
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_by_email(&state.db, &claims.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let access_token = jwt::issue_access_token(user.id, &user.email, state.jwt_secret())?;

    tracing::debug!(user_id = %user.id, "Access token refreshed");
    Ok(Json(RefreshResponse { access_token }))
}
