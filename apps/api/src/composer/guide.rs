use crate::composer::prompts::GUIDE_PROMPT_TEMPLATE;
use crate::composer::provider_display_name;
use crate::models::project::DeploymentRequirements;

pub use crate::composer::prompts::GUIDE_SYSTEM;

const NOT_SPECIFIED: &str = "Not specified";

#[derive(Debug, Clone, Copy)]
pub struct GuideContext<'a> {
    pub project_name: &'a str,
    pub cloud_provider: Option<&'a str>,
}

/// Renders the single-shot prompt that produces a deployment guide from the
/// requirements form.
pub fn deployment_guide_prompt(reqs: &DeploymentRequirements, ctx: GuideContext<'_>) -> String {
    let database = if reqs.database_required {
        let mut section = format!(
            "- Required: yes\n- Engine: {}",
            or_unspecified(reqs.database_type.as_deref())
        );
        if let Some(schema) = non_empty(reqs.database_schema.as_deref()) {
            section.push_str(&format!("\n- Schema:\n```\n{schema}\n```"));
        }
        section
    } else {
        "- Required: no".to_string()
    };

    let domain = if reqs.custom_domain_required {
        format!(
            "- Custom domain: {}",
            or_unspecified(reqs.domain_name.as_deref())
        )
    } else {
        "- Custom domain: not required (use the provider's default hostname)".to_string()
    };

    GUIDE_PROMPT_TEMPLATE
        .replace("{project_name}", ctx.project_name.trim())
        .replace("{provider}", &provider_display_name(ctx.cloud_provider))
        .replace("{application_type}", reqs.application_type.trim())
        .replace("{language}", reqs.language.trim())
        .replace("{framework}", or_unspecified(reqs.framework.as_deref()))
        .replace(
            "{source_repository}",
            or_unspecified(reqs.source_repository.as_deref()),
        )
        .replace(
            "{build_instructions}",
            or_unspecified(reqs.build_instructions.as_deref()),
        )
        .replace(
            "{environment_variables}",
            or_unspecified(reqs.environment_variables.as_deref()),
        )
        .replace("{ports}", or_unspecified(reqs.ports.as_deref()))
        .replace(
            "{operating_system}",
            or_unspecified(reqs.operating_system.as_deref()),
        )
        .replace("{database}", &database)
        .replace("{domain}", &domain)
        .replace(
            "{additional_notes}",
            non_empty(reqs.additional_notes.as_deref()).unwrap_or("None"),
        )
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn or_unspecified(value: Option<&str>) -> &str {
    non_empty(value).unwrap_or(NOT_SPECIFIED)
}
