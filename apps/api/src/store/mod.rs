//! Persistence seams. Handlers and flows talk to these traits; `PgStore`
//! implements them on PostgreSQL.
//!
//! Every project-scoped call takes an [`Owner`]: the only way to reach a
//! project row is through the user that owns it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::Owner;
use crate::errors::AppError;
use crate::models::message::{MessageRow, NewMessage};
use crate::models::project::{
    DeploymentRequirements, NewProject, OptimizationType, ProjectRow, ProjectType,
};
use crate::models::turn::{ChatTurnRow, TurnStatus};
use crate::models::user::{SessionUser, SubscriptionRow, UserRow, VerificationRow};

pub mod postgres;

pub use postgres::PgStore;

/// Handle for an open request/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnHandle {
    pub turn_id: Uuid,
    pub project_id: Uuid,
    pub user_message_id: Uuid,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, owner: &Owner, project: NewProject)
        -> Result<ProjectRow, AppError>;

    /// Inserts the project unless a row with the same id already exists.
    /// Returns `None` when the id is taken.
    async fn create_project_if_absent(
        &self,
        owner: &Owner,
        project: NewProject,
    ) -> Result<Option<ProjectRow>, AppError>;

    async fn rename_project(
        &self,
        owner: &Owner,
        project_id: Uuid,
        name: &str,
    ) -> Result<ProjectRow, AppError>;

    /// Removes the project and, by cascade, its messages and turns.
    async fn delete_project(&self, owner: &Owner, project_id: Uuid) -> Result<(), AppError>;

    /// Stores requirement answers and the generated guide. Only matches
    /// projects of type `submit-requirements-to-get-deployment-guide`.
    async fn update_requirements(
        &self,
        owner: &Owner,
        project_id: Uuid,
        requirements: &DeploymentRequirements,
        guide: &str,
    ) -> Result<ProjectRow, AppError>;

    /// Stores an uploaded configuration. Only matches projects of type
    /// `upload-config-to-get-recommendations`.
    async fn update_config(
        &self,
        owner: &Owner,
        project_id: Uuid,
        config_content: &str,
        optimization: OptimizationType,
    ) -> Result<ProjectRow, AppError>;

    async fn find_project(
        &self,
        owner: &Owner,
        project_id: Uuid,
    ) -> Result<Option<ProjectRow>, AppError>;

    /// Newest first.
    async fn list_projects(
        &self,
        owner: &Owner,
        project_type: Option<ProjectType>,
    ) -> Result<Vec<ProjectRow>, AppError>;

    /// Oldest first.
    async fn list_messages(
        &self,
        owner: &Owner,
        project_id: Uuid,
    ) -> Result<Vec<MessageRow>, AppError>;

    /// Appends a user message and opens a pending turn for it, atomically.
    /// Pending turns older than `stale_before` are marked abandoned first; a
    /// fresher pending turn makes this fail with `Conflict`.
    async fn begin_turn(
        &self,
        owner: &Owner,
        project_id: Uuid,
        message: NewMessage,
        stale_before: DateTime<Utc>,
    ) -> Result<TurnHandle, AppError>;

    /// Appends the assistant reply and closes the turn as completed, atomically.
    async fn complete_turn(&self, turn: &TurnHandle, reply: NewMessage) -> Result<(), AppError>;

    /// Closes a pending turn without a reply.
    async fn close_turn(
        &self,
        turn: &TurnHandle,
        status: TurnStatus,
        error: Option<&str>,
    ) -> Result<(), AppError>;

    async fn list_turns(
        &self,
        owner: &Owner,
        project_id: Uuid,
        status: Option<TurnStatus>,
    ) -> Result<Vec<ChatTurnRow>, AppError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Resolves a live (unexpired) session token.
    async fn find_session_user(&self, token: &str) -> Result<Option<SessionUser>, AppError>;

    async fn find_user(&self, owner: &Owner) -> Result<Option<UserRow>, AppError>;

    /// Deletes every verification for `identifier` and stores a new one.
    async fn replace_verification(
        &self,
        identifier: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn find_verification(
        &self,
        identifier: &str,
        value: &str,
    ) -> Result<Option<VerificationRow>, AppError>;

    async fn delete_verification(&self, id: Uuid) -> Result<(), AppError>;

    /// Returns `false` when no user has that email.
    async fn mark_email_verified(&self, email: &str) -> Result<bool, AppError>;

    /// The most recently updated subscription for the user.
    async fn find_subscription(&self, owner: &Owner)
        -> Result<Option<SubscriptionRow>, AppError>;
}
