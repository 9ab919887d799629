/// Project endpoints
///
/// # Endpoints
///
/// - `POST /v1/projects` - create a project (any authenticated user)
/// - `GET /v1/projects/:project_id` - project with owner, features and members (member or owner)
/// - `DELETE /v1/projects/:project_id` - delete an archived project (owner)
/// - `PATCH /v1/projects/:project_id/description` - (admin or owner)
/// - `PATCH /v1/projects/:project_id/status` - archive or reactivate (owner)

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
    models::project::{CreateProject, Project, ProjectDetails, ProjectStatus, ProjectType},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    pub project_type: Option<ProjectType>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DescriptionRequest {
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    pub status: ProjectStatus,
}

/// Creates a project owned by the caller
///
/// The project starts with its BASE feature and the caller as an ADMIN,
/// ACTIVE member.
///
/// # Errors
///
/// - `400 Bad Request`: blank name
/// - `409 Conflict`: the caller already owns a project with this name
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectDetails>)> {
    let details = Project::create(
        &state.db,
        CreateProject {
            owner_id: auth.user_id,
            name: req.name,
            description: req.description,
            project_type: req.project_type,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(details)))
}

pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectDetails>> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::MemberOrOwner).await?;

    let details = Project::details(&state.db, project_id).await?;
    Ok(Json(details))
}

/// Deletes a project
///
/// # Errors
///
/// `409 Conflict` unless the project is ARCHIVED
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::Owner).await?;

    Project::delete(&state.db, project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_description(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<DescriptionRequest>,
) -> ApiResult<Json<Project>> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::AdminOrOwner).await?;

    let project = Project::update_description(&state.db, project_id, &req.description).await?;
    Ok(Json(project))
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<StatusRequest>,
) -> ApiResult<Json<Project>> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::Owner).await?;

    let project = Project::update_status(&state.db, project_id, req.status).await?;
    Ok(Json(project))
}
