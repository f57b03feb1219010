use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::message::MessageRow;
use crate::models::project::{DeploymentRequirements, ProjectRow, ProjectType};
use crate::models::turn::{ChatTurnRow, TurnStatus};
use crate::projects::actions::{
    self, ActionOutcome, CreateProjectInput, RenameProjectInput, UpdateConfigInput,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    #[serde(rename = "type")]
    pub project_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    pub project: ProjectRow,
    pub messages: Vec<MessageRow>,
    /// Turns still waiting for a reply.
    pub open_turns: Vec<ChatTurnRow>,
}

/// GET /api/projects?type=
pub async fn handle_list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListProjectsQuery>,
) -> Result<Json<Vec<ProjectRow>>, AppError> {
    let filter = match query.project_type.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<ProjectType>()
                .map_err(|e| AppError::Validation(format!("Invalid project type: {e}")))?,
        ),
    };
    let projects = state.projects.list_projects(&user.owner(), filter).await?;
    Ok(Json(projects))
}

/// GET /api/projects/:id
pub async fn handle_get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectDetail>, AppError> {
    let owner = user.owner();
    let project = state
        .projects
        .find_project(&owner, id)
        .await?
        .ok_or_else(|| AppError::project_not_found(id))?;
    let messages = state.projects.list_messages(&owner, id).await?;
    let open_turns = state
        .projects
        .list_turns(&owner, id, Some(TurnStatus::Pending))
        .await?;

    Ok(Json(ProjectDetail {
        project,
        messages,
        open_turns,
    }))
}

/// POST /api/projects
pub async fn handle_create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateProjectInput>,
) -> Result<Json<ActionOutcome>, AppError> {
    Ok(Json(
        actions::create_project(&state, &user.owner(), input).await?,
    ))
}

/// PATCH /api/projects/:id
pub async fn handle_rename_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RenameProjectInput>,
) -> Result<Json<ActionOutcome>, AppError> {
    Ok(Json(
        actions::rename_project(&state, &user.owner(), id, input).await?,
    ))
}

/// DELETE /api/projects/:id
pub async fn handle_delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionOutcome>, AppError> {
    Ok(Json(actions::delete_project(&state, &user.owner(), id).await?))
}

/// PUT /api/projects/:id/config
pub async fn handle_update_config(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateConfigInput>,
) -> Result<Json<ActionOutcome>, AppError> {
    Ok(Json(
        actions::update_project_config(&state, &user.owner(), id, input).await?,
    ))
}

/// POST /api/projects/:id/requirements
pub async fn handle_submit_requirements(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(requirements): Json<DeploymentRequirements>,
) -> Result<Json<ActionOutcome>, AppError> {
    Ok(Json(
        actions::submit_requirements(&state, &user.owner(), id, requirements).await?,
    ))
}
