/// Feature endpoints
///
/// # Endpoints
///
/// - `POST /v1/projects/:project_id/features` - (admin or owner)
/// - `DELETE /v1/projects/:project_id/features/:feature_id` - (admin or owner)

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
    models::feature::Feature,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AddFeatureRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
}

/// Adds a feature
///
/// # Errors
///
/// - `400 Bad Request`: blank or reserved (`BASE`) title
/// - `409 Conflict`: the project already has a feature with this title
pub async fn add_feature(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AddFeatureRequest>,
) -> ApiResult<(StatusCode, Json<Feature>)> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::AdminOrOwner).await?;

    let feature =
        Feature::add(&state.db, project_id, &req.title, req.description.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(feature)))
}

/// Deletes a feature
///
/// # Errors
///
/// - `404 Not Found`: the feature is not in this project
/// - `409 Conflict`: BASE feature, or the feature still has tickets
pub async fn delete_feature(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, feature_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::AdminOrOwner).await?;

    Feature::delete(&state.db, project_id, feature_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
