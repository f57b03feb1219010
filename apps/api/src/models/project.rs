use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What a project is for. Fixed at creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    NewDeploymentGuide,
    ExistingDeploymentGuide,
    SubmitRequirementsToGetDeploymentGuide,
    UploadConfigToGetRecommendations,
    NutritionChat,
}

impl ProjectType {
    pub const ALL: [ProjectType; 5] = [
        ProjectType::NewDeploymentGuide,
        ProjectType::ExistingDeploymentGuide,
        ProjectType::SubmitRequirementsToGetDeploymentGuide,
        ProjectType::UploadConfigToGetRecommendations,
        ProjectType::NutritionChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::NewDeploymentGuide => "new-deployment-guide",
            ProjectType::ExistingDeploymentGuide => "existing-deployment-guide",
            ProjectType::SubmitRequirementsToGetDeploymentGuide => {
                "submit-requirements-to-get-deployment-guide"
            }
            ProjectType::UploadConfigToGetRecommendations => "upload-config-to-get-recommendations",
            ProjectType::NutritionChat => "nutrition-chat",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for ProjectType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Focus chosen when uploading an existing configuration for review.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationType {
    Cost,
    Performance,
    Balanced,
}

impl OptimizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationType::Cost => "cost",
            OptimizationType::Performance => "performance",
            OptimizationType::Balanced => "balanced",
        }
    }
}

impl FromStr for OptimizationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cost" => Ok(OptimizationType::Cost),
            "performance" => Ok(OptimizationType::Performance),
            "balanced" => Ok(OptimizationType::Balanced),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// How the user wants the new-deployment guide delivered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigurationType {
    Automated,
    StepByStep,
}

impl ConfigurationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigurationType::Automated => "automated",
            ConfigurationType::StepByStep => "step-by-step",
        }
    }
}

impl FromStr for ConfigurationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automated" => Ok(ConfigurationType::Automated),
            "step-by-step" => Ok(ConfigurationType::StepByStep),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub project_type: String,
    pub cloud_provider: Option<String>,
    pub additional_notes: Option<String>,
    pub configuration_type: Option<String>,
    pub application_type: Option<String>,
    pub language: Option<String>,
    pub framework: Option<String>,
    pub source_repository: Option<String>,
    pub build_instructions: Option<String>,
    pub environment_variables: Option<String>,
    pub ports: Option<String>,
    pub operating_system: Option<String>,
    pub database_required: Option<bool>,
    pub database_type: Option<String>,
    pub database_schema: Option<String>,
    pub custom_domain_required: Option<bool>,
    pub domain_name: Option<String>,
    pub deployment_guide: Option<String>,
    pub config_content: Option<String>,
    pub optimization_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRow {
    /// Parsed project type. `None` only for rows written with a type this
    /// build no longer knows.
    pub fn kind(&self) -> Option<ProjectType> {
        self.project_type.parse().ok()
    }

    pub fn optimization(&self) -> Option<OptimizationType> {
        self.optimization_type.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn configuration(&self) -> Option<ConfigurationType> {
        self.configuration_type.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Input for creating a project row.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub id: Uuid,
    pub name: String,
    pub project_type: ProjectType,
    pub cloud_provider: Option<String>,
    pub additional_notes: Option<String>,
    pub configuration_type: Option<ConfigurationType>,
}

/// Answers collected by the requirements form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequirements {
    pub application_type: String,
    pub language: String,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub source_repository: Option<String>,
    #[serde(default)]
    pub build_instructions: Option<String>,
    #[serde(default)]
    pub environment_variables: Option<String>,
    #[serde(default)]
    pub ports: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub database_required: bool,
    #[serde(default)]
    pub database_type: Option<String>,
    #[serde(default)]
    pub database_schema: Option<String>,
    #[serde(default)]
    pub custom_domain_required: bool,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

/// Body measurements sent alongside nutrition chat turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BmiData {
    pub bmi: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
}
