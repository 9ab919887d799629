/// Ticket endpoints
///
/// Every route here requires the caller to be the project owner or an
/// ACTIVE member. Tickets are addressed through their project, so a ticket
/// ID belonging to another project is reported as not found.
///
/// # Endpoints
///
/// - `GET|POST /v1/projects/:project_id/tickets`
/// - `GET|PATCH|DELETE /v1/projects/:project_id/tickets/:ticket_id`
/// - `GET|PUT|DELETE /v1/projects/:project_id/tickets/:ticket_id/timelog`
/// - `POST /v1/projects/:project_id/tickets/:ticket_id/assignees`
/// - `DELETE /v1/projects/:project_id/tickets/:ticket_id/assignees/:user_id`

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
    error::DomainError,
    models::ticket::{
        CreateTicket, Ticket, TicketPriority, TicketSection, TicketStatus, TicketWithAssignees,
        UpdateTicket,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    pub feature_id: Uuid,

    #[validate(length(min = 1, max = 500, message = "Title must be between 1 and 500 characters"))]
    pub title: String,

    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    pub status: Option<TicketStatus>,

    pub priority: Option<TicketPriority>,

    pub section: Option<TicketSection>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTicketRequest {
    #[validate(length(min = 1, max = 500, message = "Title must be between 1 and 500 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    pub status: Option<TicketStatus>,

    pub priority: Option<TicketPriority>,

    pub section: Option<TicketSection>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TimeLogRequest {
    /// Minutes; negative values are rejected by the model with 400
    pub time_log: i32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLogResponse {
    pub ticket_id: Uuid,

    pub time_log: i32,
}

impl From<Ticket> for TimeLogResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            ticket_id: ticket.id,
            time_log: ticket.time_log,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeRequest {
    pub user_id: Uuid,
}

async fn guard(state: &AppState, auth: &AuthContext, project_id: Uuid) -> ApiResult<()> {
    authorize(&state.db, Some(auth.user_id), project_id, Capability::MemberOrOwner).await?;
    Ok(())
}

pub async fn list_tickets(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Ticket>>> {
    guard(&state, &auth, project_id).await?;

    let tickets = Ticket::list_by_project(&state.db, project_id).await?;
    Ok(Json(tickets))
}

/// Creates a ticket
///
/// # Errors
///
/// - `400 Bad Request`: blank title
/// - `404 Not Found`: the feature is not in this project
pub async fn create_ticket(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<Ticket>)> {
    guard(&state, &auth, project_id).await?;

    let ticket = Ticket::create(
        &state.db,
        project_id,
        CreateTicket {
            feature_id: req.feature_id,
            title: req.title,
            description: req.description,
            status: req.status,
            priority: req.priority,
            section: req.section,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, ticket_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<TicketWithAssignees>> {
    guard(&state, &auth, project_id).await?;

    let ticket = Ticket::with_assignees(&state.db, project_id, ticket_id).await?;
    Ok(Json(ticket))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, ticket_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdateTicketRequest>,
) -> ApiResult<Json<Ticket>> {
    guard(&state, &auth, project_id).await?;

    let ticket = Ticket::update(
        &state.db,
        project_id,
        ticket_id,
        UpdateTicket {
            title: req.title,
            description: req.description,
            status: req.status,
            priority: req.priority,
            section: req.section,
        },
    )
    .await?;

    Ok(Json(ticket))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, ticket_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    guard(&state, &auth, project_id).await?;

    Ticket::delete(&state.db, project_id, ticket_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_time_log(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, ticket_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<TimeLogResponse>> {
    guard(&state, &auth, project_id).await?;

    let ticket = Ticket::find_in_project(&state.db, project_id, ticket_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Ticket not found".to_string()))?;
    Ok(Json(ticket.into()))
}

pub async fn set_time_log(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, ticket_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<TimeLogRequest>,
) -> ApiResult<Json<TimeLogResponse>> {
    guard(&state, &auth, project_id).await?;

    let ticket = Ticket::set_time_log(&state.db, project_id, ticket_id, req.time_log).await?;
    Ok(Json(ticket.into()))
}

pub async fn clear_time_log(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, ticket_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<TimeLogResponse>> {
    guard(&state, &auth, project_id).await?;

    let ticket = Ticket::clear_time_log(&state.db, project_id, ticket_id).await?;
    Ok(Json(ticket.into()))
}

/// Assigns a project member to the ticket
///
/// # Errors
///
/// - `404 Not Found`: unknown ticket, or the user is not an ACTIVE member
/// - `409 Conflict`: already assigned
pub async fn add_assignee(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, ticket_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<AssigneeRequest>,
) -> ApiResult<(StatusCode, Json<TicketWithAssignees>)> {
    guard(&state, &auth, project_id).await?;

    let ticket = Ticket::add_assignee(&state.db, project_id, ticket_id, req.user_id).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Unassigns a user
///
/// Inactive and pending members can still be unassigned. Removing a user who
/// is a member but not assigned succeeds without change.
pub async fn remove_assignee(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((project_id, ticket_id, user_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<Json<TicketWithAssignees>> {
    guard(&state, &auth, project_id).await?;

    Ticket::remove_assignee(&state.db, project_id, ticket_id, user_id).await?;
    let ticket = Ticket::with_assignees(&state.db, project_id, ticket_id).await?;
    Ok(Json(ticket))
}
