/// Project member endpoints
///
/// # Endpoints
///
/// - `GET /v1/projects/:project_id/members` - (member or owner)
/// - `POST /v1/projects/:project_id/members` - invite a user as PENDING (admin or owner)
/// - `DELETE /v1/projects/:project_id/members/:member_id` - (admin or owner)
/// - `PATCH /v1/projects/:project_id/members/:member_id/role` - (admin or owner)
/// - `PATCH /v1/projects/:project_id/members/:member_id/status` - (admin or owner)

use crate::{app::AppState, error::ApiResult, routes::ValidatedJson};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use pmboard_shared::{
    auth::{
        authorization::{authorize, Capability},
        middleware::AuthContext,
    },
    models::project_member::{MemberRole, MemberStatus, ProjectMember, ProjectMemberDetails},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: Uuid,

    /// Defaults to MEMBER
    pub role: Option<MemberRole>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleRequest {
    pub role: MemberRole,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatusRequest {
    pub member_status: MemberStatus,
}

pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ProjectMemberDetails>>> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::MemberOrOwner).await?;

    let members = ProjectMember::list_by_project(&state.db, project_id).await?;
    Ok(Json(members))
}

/// Adds a user to the project as PENDING
///
/// # Errors
///
/// - `404 Not Found`: the user does not exist
/// - `409 Conflict`: the user is already a member
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<ProjectMember>)> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::AdminOrOwner).await?;

    let member = ProjectMember::add(
        &state.db,
        project_id,
        req.user_id,
        req.role.unwrap_or(MemberRole::Member),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(member)))
}

/// Removes a member
///
/// # Errors
///
/// - `404 Not Found`: no such member in this project
/// - `409 Conflict`: the member is the project owner
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::AdminOrOwner).await?;

    ProjectMember::remove(&state.db, project_id, member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<RoleRequest>,
) -> ApiResult<Json<ProjectMember>> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::AdminOrOwner).await?;

    let member = ProjectMember::update_role(&state.db, project_id, member_id, req.role).await?;
    Ok(Json(member))
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<MemberStatusRequest>,
) -> ApiResult<Json<ProjectMember>> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::AdminOrOwner).await?;

    let member =
        ProjectMember::update_status(&state.db, project_id, member_id, req.member_status).await?;
    Ok(Json(member))
}
