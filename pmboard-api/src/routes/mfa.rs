/// Email-based second factor
///
/// # Endpoints
///
/// - `POST /v1/mfa/email-token` - email a code to the authenticated user
/// - `POST /v1/mfa/verify` - consume a code issued to the authenticated user
///
/// Codes share the single ephemeral token slot with the account flows:
/// requesting one replaces any other live token of the user.

use crate::{
    app::AppState,
    error::ApiResult,
    routes::{users::{EphemeralTokenRequest, TokenSentResponse}, ValidatedJson},
};
use axum::{extract::State, Json};
use pmboard_shared::{
    auth::{
        ephemeral::{TokenPurpose, TOKEN_TTL_MINUTES},
        middleware::AuthContext,
    },
    models::token::Token,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
}

/// Issues and emails a code to the authenticated user
pub async fn email_token(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<TokenSentResponse>> {
    let token = Token::issue(&state.db, auth.user_id).await?;
    let delivered = state.send_token(&auth.email, TokenPurpose::Mfa, &token).await;

    Ok(Json(TokenSentResponse {
        delivered,
        expires_in_minutes: TOKEN_TTL_MINUTES,
    }))
}

/// Verifies a code
///
/// # Errors
///
/// - `404 Not Found`: unknown code, or a code issued to another user
/// - `400 Bad Request`: expired code
pub async fn verify(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<EphemeralTokenRequest>,
) -> ApiResult<Json<VerifyResponse>> {
    Token::verify_for_user(&state.db, auth.user_id, &req.token).await?;

    tracing::info!(user_id = %auth.user_id, "MFA code verified");
    Ok(Json(VerifyResponse { verified: true }))
}
