/// User endpoints
///
/// # Endpoints
///
/// Public:
/// - `POST /v1/users/signup` - create an account (FREE membership, inactive)
/// - `POST /v1/users/signin` - exchange credentials for tokens
/// - `POST /v1/users/request-token` - email an ephemeral token
/// - `POST /v1/users/activate` - activate the account owning a token
/// - `POST /v1/users/deactivate` - deactivate the account owning a token
/// - `POST /v1/users/reset-password` - set a new password with a token
/// - `POST /v1/users/delete` - delete the account owning a token
///
/// Authenticated:
/// - `GET /v1/users/me` - profile with membership and projects
/// - `PATCH /v1/users/me/settings` - replace the settings document
/// - `GET /v1/users/me/membership` - current and scheduled membership
/// - `PUT /v1/users/me/membership` - change membership now
/// - `PUT /v1/users/me/next-membership` - schedule a membership change
/// - `DELETE /v1/users/me/next-membership` - cancel the scheduled change
/// - `POST /v1/users/me/membership/reconcile` - apply a due scheduled change

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::ValidatedJson,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use pmboard_shared::{
    auth::{
        ephemeral::{TokenPurpose, TOKEN_TTL_MINUTES},
        jwt,
        middleware::AuthContext,
        password,
    },
    models::{
        membership::{DurationUnit, Membership, MembershipStatus, PendingMembership, ReconcileOutcome},
        project::{JoinedProject, Project},
        token::Token,
        user::{CreateUser, User},
    },
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

/// Sign-up request
#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
}

/// Sign-in request
#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Response to sign-up and sign-in
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,

    pub membership: Option<Membership>,

    pub access_token: String,

    pub refresh_token: String,
}

/// Profile of the authenticated user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,

    pub membership: Option<Membership>,

    pub next_membership: PendingMembership,

    pub owned_projects: Vec<Project>,

    pub joined_projects: Vec<JoinedProject>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SettingsRequest {
    pub settings: JsonValue,
}

/// Current and scheduled membership
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub membership: Membership,

    pub next_membership: PendingMembership,
}

/// Membership change; enum values are checked by the handler so a bad value
/// gets a precise message
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetMembershipRequest {
    pub status: String,

    pub duration_unit: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NextMembershipRequest {
    pub status: String,

    pub starts_at: DateTime<Utc>,

    pub duration_unit: String,
}

/// Request for an emailed token
#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub purpose: TokenPurpose,
}

/// Result of sending an ephemeral token
///
/// `delivered` is false when the mail provider failed; the token was still
/// issued and a new request replaces it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSentResponse {
    pub delivered: bool,

    pub expires_in_minutes: i64,
}

/// Body carrying only an ephemeral token
#[derive(Debug, Deserialize, Validate)]
pub struct EphemeralTokenRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResponse {
    pub deleted: bool,

    pub user_id: Uuid,
}

fn parse_enum<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(JsonValue::String(raw.trim().to_ascii_uppercase())).ok()
}

/// Parses a tier and term length, or fails with `message`
fn parse_plan(status: &str, unit: &str, message: &str) -> ApiResult<(MembershipStatus, DurationUnit)> {
    parse_enum::<MembershipStatus>(status)
        .zip(parse_enum::<DurationUnit>(unit))
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

async fn current_user(state: &AppState, auth: &AuthContext) -> ApiResult<User> {
    User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Creates an account
///
/// The account starts inactive with a FREE membership, and tokens are issued
/// right away.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: invalid email, password or name
/// - `409 Conflict`: email already registered
pub async fn sign_up(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    password::validate_password(&req.password)
        .map_err(|e| ApiError::invalid_field("password", e))?;

    if req.name.trim().is_empty() {
        return Err(ApiError::invalid_field("name", "Name is required"));
    }

    let password_hash = password::hash_password(&req.password)?;

    let (user, membership) = User::create_with_membership(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
            name: req.name,
        },
    )
    .await?;

    let tokens = jwt::issue_token_pair(user.id, &user.email, state.jwt_secret())?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            membership: Some(membership),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

/// Signs in with email and password
///
/// # Errors
///
/// - `404 Not Found`: no account with this email
/// - `401 Unauthorized`: wrong password
pub async fn sign_in(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignInRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Sign-in rejected: wrong password");
        return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
    }

    let membership = Membership::find_by_user(&state.db, user.id).await?;
    let tokens = jwt::issue_token_pair(user.id, &user.email, state.jwt_secret())?;

    tracing::info!(user_id = %user.id, "User signed in");
    Ok(Json(AuthResponse {
        user,
        membership,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

/// Profile of the authenticated user
pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<ProfileResponse>> {
    let user = current_user(&state, &auth).await?;

    let membership = Membership::find_by_user(&state.db, user.id).await?;
    let next_membership = PendingMembership::find(&state.db, user.id).await?;
    let owned_projects = Project::list_owned(&state.db, user.id).await?;
    let joined_projects = Project::list_joined(&state.db, user.id).await?;

    Ok(Json(ProfileResponse {
        user,
        membership,
        next_membership,
        owned_projects,
        joined_projects,
    }))
}

/// Replaces the settings document
///
/// # Errors
///
/// `400 Bad Request` if `settings` is not a JSON object
pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<SettingsRequest>,
) -> ApiResult<Json<User>> {
    let user = User::update_settings(&state.db, auth.user_id, req.settings).await?;
    Ok(Json(user))
}

pub async fn get_membership(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<MembershipResponse>> {
    let membership = Membership::find_by_user(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Membership not found".to_string()))?;
    let next_membership = PendingMembership::find(&state.db, auth.user_id).await?;

    Ok(Json(MembershipResponse {
        membership,
        next_membership,
    }))
}

/// Changes the membership immediately, for one month or one year
pub async fn set_membership(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<SetMembershipRequest>,
) -> ApiResult<Json<Membership>> {
    let (status, unit) = parse_plan(
        &req.status,
        &req.duration_unit,
        "Invalid membership status or expiry parameter",
    )?;

    let membership = Membership::set(&state.db, auth.user_id, status, unit).await?;
    Ok(Json(membership))
}

/// Schedules a membership change
///
/// # Errors
///
/// `400 Bad Request` for an unknown status or unit, or a start date that is
/// not in the future
pub async fn schedule_next_membership(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<NextMembershipRequest>,
) -> ApiResult<Json<PendingMembership>> {
    let (status, unit) = parse_plan(
        &req.status,
        &req.duration_unit,
        "Invalid nextMembership status or expiry parameter",
    )?;

    let pending =
        Membership::schedule_next(&state.db, auth.user_id, status, req.starts_at, unit).await?;
    Ok(Json(pending))
}

/// Cancels the scheduled change
///
/// # Errors
///
/// `404 Not Found` if nothing is scheduled
pub async fn cancel_next_membership(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<StatusCode> {
    if !Membership::cancel_next(&state.db, auth.user_id).await? {
        return Err(ApiError::NotFound(
            "No scheduled membership change".to_string(),
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Applies the scheduled change if its start date has passed
pub async fn reconcile_membership(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<ReconcileOutcome>> {
    let outcome = Membership::reconcile(&state.db, auth.user_id).await?;
    Ok(Json(outcome))
}

/// Emails an ephemeral token for an account flow
///
/// # Errors
///
/// - `400 Bad Request`: MFA codes are requested through `/v1/mfa/email-token`
/// - `404 Not Found`: no account with this email
pub async fn request_token(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<TokenRequest>,
) -> ApiResult<Json<TokenSentResponse>> {
    if req.purpose == TokenPurpose::Mfa {
        return Err(ApiError::BadRequest(
            "MFA codes are requested through /v1/mfa/email-token".to_string(),
        ));
    }

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let token = Token::issue(&state.db, user.id).await?;
    let delivered = state.send_token(&user.email, req.purpose, &token).await;

    Ok(Json(TokenSentResponse {
        delivered,
        expires_in_minutes: TOKEN_TTL_MINUTES,
    }))
}

pub async fn activate(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EphemeralTokenRequest>,
) -> ApiResult<Json<User>> {
    let user = User::set_active_with_token(&state.db, &req.token, true).await?;
    Ok(Json(user))
}

pub async fn deactivate(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EphemeralTokenRequest>,
) -> ApiResult<Json<User>> {
    let user = User::set_active_with_token(&state.db, &req.token, false).await?;
    Ok(Json(user))
}

/// Sets a new password
///
/// # Errors
///
/// - `404 Not Found`: unknown token
/// - `400 Bad Request`: expired token, or the email does not own the token
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<Json<User>> {
    password::validate_password(&req.new_password)
        .map_err(|e| ApiError::invalid_field("newPassword", e))?;

    let password_hash = password::hash_password(&req.new_password)?;
    let user =
        User::reset_password_with_token(&state.db, &req.token, &req.email, password_hash).await?;

    Ok(Json(user))
}

/// Deletes the account owning the token, with everything it owns
pub async fn delete_account(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EphemeralTokenRequest>,
) -> ApiResult<Json<DeletedResponse>> {
    let user_id = User::delete_with_token(&state.db, &req.token).await?;

    Ok(Json(DeletedResponse {
        deleted: true,
        user_id,
    }))
}
