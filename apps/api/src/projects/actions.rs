//! Project mutations triggered from the dashboard forms. Each action validates
//! its input, runs under the caller's [`Owner`], and answers with the page the
//! client should navigate to next.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Owner;
use crate::composer::{
    compose_for_type_name, deployment_guide_prompt, ComposerContext, GuideContext,
    FALLBACK_ASSISTANT_MESSAGE, GUIDE_SYSTEM,
};
use crate::errors::AppError;
use crate::llm_client::LlmError;
use crate::models::message::{ChatMessage, NewMessage, Role};
use crate::models::project::{
    ConfigurationType, DeploymentRequirements, NewProject, OptimizationType, ProjectRow,
    ProjectType,
};
use crate::state::AppState;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 5_000;
pub const MAX_CONFIG_LEN: usize = 200_000;
const MAX_FIELD_LEN: usize = 10_000;

pub const PROJECTS_PAGE: &str = "/projects";

/// Where the client goes after an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub redirect: String,
}

impl ActionOutcome {
    fn to(path: impl Into<String>) -> Self {
        Self {
            redirect: path.into(),
        }
    }
}

pub fn project_page(id: Uuid) -> String {
    format!("{PROJECTS_PAGE}/{id}")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectInput {
    pub name: String,
    #[serde(rename = "type")]
    pub project_type: String,
    #[serde(default)]
    pub cloud_provider: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    #[serde(default)]
    pub configuration_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameProjectInput {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigInput {
    pub config_content: String,
    pub optimization_type: String,
}

/// createProject
///
/// Chat-style projects get their opening exchange right away; form-driven
/// projects are sent to their form first.
pub async fn create_project(
    state: &AppState,
    owner: &Owner,
    input: CreateProjectInput,
) -> Result<ActionOutcome, AppError> {
    let new_project = validate_new_project(input)?;
    let project_type = new_project.project_type;
    let project = state.projects.create_project(owner, new_project).await?;

    let redirect = match project_type {
        ProjectType::NewDeploymentGuide
        | ProjectType::ExistingDeploymentGuide
        | ProjectType::NutritionChat => {
            seed_initial_exchange(state, owner, &project).await?;
            project_page(project.id)
        }
        ProjectType::SubmitRequirementsToGetDeploymentGuide => {
            format!("{}/requirements", project_page(project.id))
        }
        ProjectType::UploadConfigToGetRecommendations => {
            format!("{}/upload-config", project_page(project.id))
        }
    };

    Ok(ActionOutcome::to(redirect))
}

/// renameProject
pub async fn rename_project(
    state: &AppState,
    owner: &Owner,
    project_id: Uuid,
    input: RenameProjectInput,
) -> Result<ActionOutcome, AppError> {
    let name = validate_name(&input.name)?;
    state.projects.rename_project(owner, project_id, &name).await?;
    Ok(ActionOutcome::to(PROJECTS_PAGE))
}

/// deleteProject
pub async fn delete_project(
    state: &AppState,
    owner: &Owner,
    project_id: Uuid,
) -> Result<ActionOutcome, AppError> {
    state.projects.delete_project(owner, project_id).await?;
    Ok(ActionOutcome::to(PROJECTS_PAGE))
}

/// updateProjectConfig
///
/// Stores the uploaded configuration and, the first time, opens the
/// conversation about it.
pub async fn update_project_config(
    state: &AppState,
    owner: &Owner,
    project_id: Uuid,
    input: UpdateConfigInput,
) -> Result<ActionOutcome, AppError> {
    let optimization = input
        .optimization_type
        .trim()
        .parse::<OptimizationType>()
        .map_err(|e| AppError::Validation(format!("Invalid optimization type: {e}")))?;

    if input.config_content.trim().is_empty() {
        return Err(AppError::Validation("Configuration content is required".into()));
    }
    if input.config_content.len() > MAX_CONFIG_LEN {
        return Err(AppError::Validation(format!(
            "Configuration must be at most {MAX_CONFIG_LEN} bytes"
        )));
    }

    let project = state
        .projects
        .update_config(owner, project_id, &input.config_content, optimization)
        .await?;

    if state.projects.list_messages(owner, project_id).await?.is_empty() {
        seed_initial_exchange(state, owner, &project).await?;
    }

    Ok(ActionOutcome::to(project_page(project_id)))
}

/// submitDeploymentRequirements
///
/// The guide is generated before anything is written: a failed generation or
/// a project of another type leaves the row untouched.
pub async fn submit_requirements(
    state: &AppState,
    owner: &Owner,
    project_id: Uuid,
    requirements: DeploymentRequirements,
) -> Result<ActionOutcome, AppError> {
    validate_requirements(&requirements)?;

    let project = state
        .projects
        .find_project(owner, project_id)
        .await?
        .filter(|p| p.kind() == Some(ProjectType::SubmitRequirementsToGetDeploymentGuide))
        .ok_or_else(|| AppError::project_not_found(project_id))?;

    let prompt = deployment_guide_prompt(
        &requirements,
        GuideContext {
            project_name: &project.name,
            cloud_provider: project.cloud_provider.as_deref(),
        },
    );

    let guide = complete_within(state, GUIDE_SYSTEM, prompt).await?;

    state
        .projects
        .update_requirements(owner, project_id, &requirements, &guide)
        .await?;

    Ok(ActionOutcome::to(project_page(project_id)))
}

/// Persists the composed opening message and a first reply as one completed
/// turn. A failed completion is replaced by the fallback reply.
pub async fn seed_initial_exchange(
    state: &AppState,
    owner: &Owner,
    project: &ProjectRow,
) -> Result<(), AppError> {
    let composed = compose_for_type_name(&project.project_type, &ComposerContext::from(project));

    let turn = state
        .projects
        .begin_turn(
            owner,
            project.id,
            NewMessage::user_text(composed.initial_message.clone()),
            state.config.stale_turn_cutoff(Utc::now()),
        )
        .await?;

    let reply = match complete_within(state, &composed.system, composed.initial_message).await {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "Initial reply for project {} failed, storing fallback: {e}",
                project.id
            );
            FALLBACK_ASSISTANT_MESSAGE.to_string()
        }
    };

    state
        .projects
        .complete_turn(&turn, NewMessage::assistant_text(reply))
        .await?;

    info!("Seeded opening exchange for project {}", project.id);
    Ok(())
}

/// One-shot completion bounded by the request ceiling.
async fn complete_within(
    state: &AppState,
    system: &str,
    prompt: String,
) -> Result<String, LlmError> {
    let messages = [ChatMessage::new(Role::User, prompt)];
    let ceiling = state.config.request_timeout;
    match tokio::time::timeout(ceiling, state.llm.complete(system, &messages)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(ceiling)),
    }
}

fn validate_new_project(input: CreateProjectInput) -> Result<NewProject, AppError> {
    let name = validate_name(&input.name)?;

    let project_type = input
        .project_type
        .trim()
        .parse::<ProjectType>()
        .map_err(|e| AppError::Validation(format!("Invalid project type: {e}")))?;

    let configuration_type = match non_empty(input.configuration_type) {
        Some(raw) => Some(
            raw.parse::<ConfigurationType>()
                .map_err(|e| AppError::Validation(format!("Invalid configuration type: {e}")))?,
        ),
        None => None,
    };

    let additional_notes = non_empty(input.additional_notes);
    if additional_notes
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_NOTES_LEN)
    {
        return Err(AppError::Validation(format!(
            "Additional notes must be at most {MAX_NOTES_LEN} characters"
        )));
    }

    Ok(NewProject {
        id: Uuid::new_v4(),
        name,
        project_type,
        cloud_provider: non_empty(input.cloud_provider).map(|p| p.to_lowercase()),
        additional_notes,
        configuration_type,
    })
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Project name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Project name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_requirements(reqs: &DeploymentRequirements) -> Result<(), AppError> {
    if reqs.application_type.trim().is_empty() {
        return Err(AppError::Validation("Application type is required".into()));
    }
    if reqs.language.trim().is_empty() {
        return Err(AppError::Validation("Language is required".into()));
    }
    if reqs.database_required && is_blank(&reqs.database_type) {
        return Err(AppError::Validation(
            "Database type is required when a database is needed".into(),
        ));
    }
    if reqs.custom_domain_required && is_blank(&reqs.domain_name) {
        return Err(AppError::Validation(
            "Domain name is required when a custom domain is needed".into(),
        ));
    }

    let too_long = [
        &reqs.framework,
        &reqs.source_repository,
        &reqs.build_instructions,
        &reqs.environment_variables,
        &reqs.ports,
        &reqs.operating_system,
        &reqs.database_type,
        &reqs.database_schema,
        &reqs.domain_name,
        &reqs.additional_notes,
    ]
    .into_iter()
    .flatten()
    .any(|v| v.len() > MAX_FIELD_LEN);
    if too_long {
        return Err(AppError::Validation(format!(
            "Requirement fields must be at most {MAX_FIELD_LEN} bytes"
        )));
    }

    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
