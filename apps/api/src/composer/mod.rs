//! Prompt composition: maps a project type and its collected answers to the
//! system prompt and the opening user message. No I/O.

pub mod guide;
pub mod prompts;

use crate::models::project::{
    BmiData, ConfigurationType, OptimizationType, ProjectRow, ProjectType,
};
use prompts::{
    EXISTING_DEPLOYMENT_SYSTEM, FORMATTING_RULES, GENERATED_GUIDE_SECTION, GENERIC_SYSTEM,
    NEW_DEPLOYMENT_SYSTEM, NUTRITION_PROFILE_SECTION, NUTRITION_SYSTEM, REQUIREMENTS_SYSTEM,
    UPLOADED_CONFIG_SECTION, UPLOAD_CONFIG_SYSTEM,
};

pub use guide::{deployment_guide_prompt, GuideContext, GUIDE_SYSTEM};
pub use prompts::FALLBACK_ASSISTANT_MESSAGE;

/// Everything the composer may interpolate.
#[derive(Debug, Clone, Default)]
pub struct ComposerContext {
    pub project_name: String,
    pub cloud_provider: Option<String>,
    pub additional_notes: Option<String>,
    pub configuration_type: Option<ConfigurationType>,
    pub config_content: Option<String>,
    pub optimization: Option<OptimizationType>,
    pub deployment_guide: Option<String>,
}

impl From<&ProjectRow> for ComposerContext {
    fn from(project: &ProjectRow) -> Self {
        ComposerContext {
            project_name: project.name.clone(),
            cloud_provider: project.cloud_provider.clone(),
            additional_notes: project.additional_notes.clone(),
            configuration_type: project.configuration(),
            config_content: project.config_content.clone(),
            optimization: project.optimization(),
            deployment_guide: project.deployment_guide.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompts {
    pub system: String,
    pub initial_message: String,
}

/// Human-readable provider name for prompt text.
pub fn provider_display_name(provider: Option<&str>) -> String {
    match provider.map(|p| p.trim().to_lowercase()).as_deref() {
        None | Some("") => "your chosen cloud provider".to_string(),
        Some("aws") => "AWS".to_string(),
        Some("gcp") | Some("google-cloud") => "Google Cloud Platform".to_string(),
        Some("azure") => "Microsoft Azure".to_string(),
        Some("digitalocean") => "DigitalOcean".to_string(),
        Some(_) => provider.unwrap_or_default().trim().to_string(),
    }
}

pub fn compose(project_type: ProjectType, ctx: &ComposerContext) -> ComposedPrompts {
    let provider = provider_display_name(ctx.cloud_provider.as_deref());
    let name = ctx.project_name.trim();

    let (base, opening) = match project_type {
        ProjectType::NewDeploymentGuide => {
            let opening = match ctx.configuration_type {
                Some(ConfigurationType::Automated) => format!(
                    "I want to deploy my new project \"{name}\" on {provider}. \
                     Please generate an automated deployment script I can run end to end, \
                     and explain what each part of the script provisions."
                ),
                Some(ConfigurationType::StepByStep) => format!(
                    "I want to deploy my new project \"{name}\" on {provider}. \
                     Please give me a step-by-step deployment guide I can follow manually, \
                     with the console or CLI actions for each step."
                ),
                None => format!(
                    "I want to deploy my new project \"{name}\" on {provider}. \
                     Please help me plan the deployment."
                ),
            };
            (NEW_DEPLOYMENT_SYSTEM.to_string(), opening)
        }
        ProjectType::ExistingDeploymentGuide => (
            EXISTING_DEPLOYMENT_SYSTEM.to_string(),
            format!(
                "My project \"{name}\" is already deployed on {provider}. \
                 Please review the setup with me and recommend improvements."
            ),
        ),
        ProjectType::SubmitRequirementsToGetDeploymentGuide => (
            requirements_system(ctx),
            format!(
                "I've submitted the deployment requirements for \"{name}\" on {provider}. \
                 Please summarise the generated guide and tell me where to start."
            ),
        ),
        ProjectType::UploadConfigToGetRecommendations => {
            let focus = ctx
                .optimization
                .map(|o| o.as_str())
                .unwrap_or("balanced");
            (
                upload_config_system(ctx),
                format!(
                    "I've uploaded the configuration for \"{name}\" on {provider}. \
                     Please analyse it and recommend optimizations with a {focus} focus."
                ),
            )
        }
        ProjectType::NutritionChat => (
            NUTRITION_SYSTEM.to_string(),
            "Hi! I'd like personalised nutrition advice. Where should we start?".to_string(),
        ),
    };

    ComposedPrompts {
        system: with_formatting(&base),
        initial_message: with_notes(opening, ctx.additional_notes.as_deref()),
    }
}

/// Like [`compose`], for a type name read from storage. Names this build does
/// not know get the generic template.
pub fn compose_for_type_name(type_name: &str, ctx: &ComposerContext) -> ComposedPrompts {
    match type_name.parse::<ProjectType>() {
        Ok(project_type) => compose(project_type, ctx),
        Err(_) => {
            tracing::warn!("Unknown project type '{type_name}', using generic prompt");
            let name = ctx.project_name.trim();
            ComposedPrompts {
                system: with_formatting(GENERIC_SYSTEM),
                initial_message: with_notes(
                    format!("Let's get started on \"{name}\"."),
                    ctx.additional_notes.as_deref(),
                ),
            }
        }
    }
}

/// System prompt for a chat turn on a stored project. Uploaded configuration
/// is read from the row at call time.
pub fn system_prompt_for(project: &ProjectRow) -> String {
    compose_for_type_name(&project.project_type, &ComposerContext::from(project)).system
}

/// Nutrition system prompt, personalised with body measurements when present.
pub fn nutrition_system_prompt(bmi: Option<&BmiData>) -> String {
    let mut system = NUTRITION_SYSTEM.to_string();
    if let Some(bmi) = bmi {
        system.push_str(&NUTRITION_PROFILE_SECTION.replace("{profile}", &render_profile(bmi)));
    }
    with_formatting(&system)
}

fn upload_config_system(ctx: &ComposerContext) -> String {
    let mut system = UPLOAD_CONFIG_SYSTEM.to_string();
    if let Some(config) = ctx.config_content.as_deref().filter(|c| !c.trim().is_empty()) {
        let focus = ctx
            .optimization
            .map(|o| o.as_str())
            .unwrap_or("balanced");
        system.push_str(
            &UPLOADED_CONFIG_SECTION
                .replace("{optimization}", focus)
                .replace("{config}", config),
        );
    }
    system
}

fn requirements_system(ctx: &ComposerContext) -> String {
    let mut system = REQUIREMENTS_SYSTEM.to_string();
    if let Some(guide) = ctx.deployment_guide.as_deref().filter(|g| !g.trim().is_empty()) {
        system.push_str(&GENERATED_GUIDE_SECTION.replace("{guide}", guide));
    }
    system
}

fn render_profile(bmi: &BmiData) -> String {
    let mut lines = vec![format!("- BMI: {:.1}", bmi.bmi)];
    if let Some(category) = bmi.category.as_deref() {
        lines.push(format!("- BMI category: {category}"));
    }
    if let Some(height) = bmi.height_cm {
        lines.push(format!("- Height: {height:.0} cm"));
    }
    if let Some(weight) = bmi.weight_kg {
        lines.push(format!("- Weight: {weight:.1} kg"));
    }
    if let Some(age) = bmi.age {
        lines.push(format!("- Age: {age}"));
    }
    if let Some(gender) = bmi.gender.as_deref() {
        lines.push(format!("- Gender: {gender}"));
    }
    lines.join("\n")
}

fn with_formatting(system: &str) -> String {
    format!("{system}\n\n{FORMATTING_RULES}")
}

fn with_notes(message: String, notes: Option<&str>) -> String {
    match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(notes) => format!("{message}\n\nAdditional notes: {notes}"),
        None => message,
    }
}
