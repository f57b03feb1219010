use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::chat::orchestrator::{latest_user_input, run_turn, ChatResponse};
use crate::composer::{nutrition_system_prompt, system_prompt_for};
use crate::errors::AppError;
use crate::models::message::ChatMessage;
use crate::models::project::{BmiData, NewProject, ProjectType};
use crate::state::AppState;

const MAX_DERIVED_NAME_CHARS: usize = 50;
const DEFAULT_NUTRITION_NAME: &str = "Nutrition chat";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionChatRequest {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub bmi_data: Option<BmiData>,
}

/// POST /api/chat
pub async fn handle_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChatRequest>,
) -> Result<ChatResponse, AppError> {
    let owner = user.owner();
    let project_id = Uuid::parse_str(req.id.trim())
        .map_err(|_| AppError::project_not_found(&req.id))?;

    let project = state
        .projects
        .find_project(&owner, project_id)
        .await?
        .ok_or_else(|| AppError::project_not_found(project_id))?;

    let system = system_prompt_for(&project);
    run_turn(&state, &owner, project_id, system, req.messages).await
}

/// POST /api/nutrition-chat
///
/// The client picks the chat id; the project is created on the first turn.
pub async fn handle_nutrition_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NutritionChatRequest>,
) -> Result<ChatResponse, AppError> {
    let owner = user.owner();
    let project_id = Uuid::parse_str(req.id.trim())
        .map_err(|_| AppError::Validation(format!("Invalid chat id '{}'", req.id)))?;

    let existing = state.projects.find_project(&owner, project_id).await?;
    let project = match existing {
        Some(project) => project,
        None => {
            let latest = latest_user_input(&req.messages)?;
            let new_project = NewProject {
                id: project_id,
                name: derive_project_name(&latest.text()),
                project_type: ProjectType::NutritionChat,
                cloud_provider: None,
                additional_notes: None,
                configuration_type: None,
            };
            // `None` means another user already holds this id.
            state
                .projects
                .create_project_if_absent(&owner, new_project)
                .await?
                .ok_or_else(|| AppError::project_not_found(project_id))?
        }
    };

    if project.kind() != Some(ProjectType::NutritionChat) {
        warn!(
            "Nutrition chat requested on {} project {project_id}",
            project.project_type
        );
        return Err(AppError::project_not_found(project_id));
    }

    let system = nutrition_system_prompt(req.bmi_data.as_ref());
    run_turn(&state, &owner, project_id, system, req.messages).await
}

/// Project name for an auto-created chat: the start of the first message.
fn derive_project_name(first_message: &str) -> String {
    let collapsed = first_message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_NUTRITION_NAME.to_string();
    }
    if collapsed.chars().count() <= MAX_DERIVED_NAME_CHARS {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(MAX_DERIVED_NAME_CHARS).collect();
    format!("{}...", truncated.trim_end())
}
