use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Owner;
use crate::errors::AppError;
use crate::models::message::{MessageRow, NewMessage};
use crate::models::project::{
    DeploymentRequirements, NewProject, OptimizationType, ProjectRow, ProjectType,
};
use crate::models::turn::{ChatTurnRow, TurnStatus};
use crate::models::user::{SessionUser, SubscriptionRow, UserRow, VerificationRow};
use crate::store::{AccountStore, ProjectStore, TurnHandle};

/// PostgreSQL-backed implementation of both store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends one message. `created_at` is clamped so it never sorts before the
/// newest message already stored for the project.
async fn insert_message(
    tx: &mut Transaction<'_, Postgres>,
    project_id: Uuid,
    message: &NewMessage,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO messages (id, project_id, role, parts, attachments, created_at)
        VALUES ($1, $2, $3, $4, $5,
                GREATEST($6, (SELECT MAX(created_at) FROM messages WHERE project_id = $2)))
        "#,
    )
    .bind(message.id)
    .bind(project_id)
    .bind(message.role.as_str())
    .bind(Json(&message.parts))
    .bind(Json(&message.attachments))
    .bind(message.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn create_project(
        &self,
        owner: &Owner,
        project: NewProject,
    ) -> Result<ProjectRow, AppError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects
                (id, user_id, name, type, cloud_provider, additional_notes, configuration_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(project.id)
        .bind(owner.user_id())
        .bind(&project.name)
        .bind(project.project_type.as_str())
        .bind(&project.cloud_provider)
        .bind(&project.additional_notes)
        .bind(project.configuration_type.map(|c| c.as_str()))
        .fetch_one(&self.pool)
        .await?;

        info!(
            "Created {} project {} for user {}",
            row.project_type,
            row.id,
            owner.user_id()
        );
        Ok(row)
    }

    async fn create_project_if_absent(
        &self,
        owner: &Owner,
        project: NewProject,
    ) -> Result<Option<ProjectRow>, AppError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects
                (id, user_id, name, type, cloud_provider, additional_notes, configuration_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(project.id)
        .bind(owner.user_id())
        .bind(&project.name)
        .bind(project.project_type.as_str())
        .bind(&project.cloud_provider)
        .bind(&project.additional_notes)
        .bind(project.configuration_type.map(|c| c.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = &row {
            info!(
                "Created {} project {} for user {}",
                row.project_type,
                row.id,
                owner.user_id()
            );
        }
        Ok(row)
    }

    async fn rename_project(
        &self,
        owner: &Owner,
        project_id: Uuid,
        name: &str,
    ) -> Result<ProjectRow, AppError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            UPDATE projects SET name = $1, updated_at = now()
            WHERE id = $2 AND user_id = $3
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(project_id)
        .bind(owner.user_id())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::project_not_found(project_id))?;

        info!("Renamed project {project_id} for user {}", owner.user_id());
        Ok(row)
    }

    async fn delete_project(&self, owner: &Owner, project_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(owner.user_id())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::project_not_found(project_id));
        }

        info!("Deleted project {project_id} for user {}", owner.user_id());
        Ok(())
    }

    async fn update_requirements(
        &self,
        owner: &Owner,
        project_id: Uuid,
        requirements: &DeploymentRequirements,
        guide: &str,
    ) -> Result<ProjectRow, AppError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            UPDATE projects SET
                application_type = $1,
                language = $2,
                framework = $3,
                source_repository = $4,
                build_instructions = $5,
                environment_variables = $6,
                ports = $7,
                operating_system = $8,
                database_required = $9,
                database_type = $10,
                database_schema = $11,
                custom_domain_required = $12,
                domain_name = $13,
                additional_notes = COALESCE($14, additional_notes),
                deployment_guide = $15,
                updated_at = now()
            WHERE id = $16 AND user_id = $17 AND type = $18
            RETURNING *
            "#,
        )
        .bind(&requirements.application_type)
        .bind(&requirements.language)
        .bind(&requirements.framework)
        .bind(&requirements.source_repository)
        .bind(&requirements.build_instructions)
        .bind(&requirements.environment_variables)
        .bind(&requirements.ports)
        .bind(&requirements.operating_system)
        .bind(requirements.database_required)
        .bind(&requirements.database_type)
        .bind(&requirements.database_schema)
        .bind(requirements.custom_domain_required)
        .bind(&requirements.domain_name)
        .bind(&requirements.additional_notes)
        .bind(guide)
        .bind(project_id)
        .bind(owner.user_id())
        .bind(ProjectType::SubmitRequirementsToGetDeploymentGuide.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::project_not_found(project_id))?;

        info!(
            "Stored requirements and deployment guide for project {project_id} (user {})",
            owner.user_id()
        );
        Ok(row)
    }

    async fn update_config(
        &self,
        owner: &Owner,
        project_id: Uuid,
        config_content: &str,
        optimization: OptimizationType,
    ) -> Result<ProjectRow, AppError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            UPDATE projects SET config_content = $1, optimization_type = $2, updated_at = now()
            WHERE id = $3 AND user_id = $4 AND type = $5
            RETURNING *
            "#,
        )
        .bind(config_content)
        .bind(optimization.as_str())
        .bind(project_id)
        .bind(owner.user_id())
        .bind(ProjectType::UploadConfigToGetRecommendations.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::project_not_found(project_id))?;

        info!(
            "Stored uploaded config for project {project_id} (user {})",
            owner.user_id()
        );
        Ok(row)
    }

    async fn find_project(
        &self,
        owner: &Owner,
        project_id: Uuid,
    ) -> Result<Option<ProjectRow>, AppError> {
        Ok(sqlx::query_as::<_, ProjectRow>(
            "SELECT * FROM projects WHERE id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(owner.user_id())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_projects(
        &self,
        owner: &Owner,
        project_type: Option<ProjectType>,
    ) -> Result<Vec<ProjectRow>, AppError> {
        Ok(sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT * FROM projects
            WHERE user_id = $1 AND ($2::text IS NULL OR type = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner.user_id())
        .bind(project_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_messages(
        &self,
        owner: &Owner,
        project_id: Uuid,
    ) -> Result<Vec<MessageRow>, AppError> {
        Ok(sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.project_id, m.role, m.parts, m.attachments, m.created_at
            FROM messages m
            JOIN projects p ON p.id = m.project_id
            WHERE m.project_id = $1 AND p.user_id = $2
            ORDER BY m.created_at, m.seq
            "#,
        )
        .bind(project_id)
        .bind(owner.user_id())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn begin_turn(
        &self,
        owner: &Owner,
        project_id: Uuid,
        message: NewMessage,
        stale_before: DateTime<Utc>,
    ) -> Result<TurnHandle, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent turns on the same project.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM projects WHERE id = $1 AND user_id = $2 FOR UPDATE")
                .bind(project_id)
                .bind(owner.user_id())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(AppError::project_not_found(project_id));
        }

        let abandoned = sqlx::query(
            r#"
            UPDATE chat_turns
            SET status = 'abandoned', closed_at = now(), error = 'no reply recorded'
            WHERE project_id = $1 AND status = 'pending' AND created_at < $2
            "#,
        )
        .bind(project_id)
        .bind(stale_before)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if abandoned > 0 {
            warn!("Marked {abandoned} stale chat turn(s) abandoned on project {project_id}");
        }

        let busy: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM chat_turns WHERE project_id = $1 AND status = 'pending')",
        )
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await?;
        if busy {
            return Err(AppError::Conflict(
                "A reply is still being generated for this project".to_string(),
            ));
        }

        insert_message(&mut tx, project_id, &message).await?;

        let turn_id = Uuid::new_v4();
        sqlx::query("INSERT INTO chat_turns (id, project_id, user_message_id) VALUES ($1, $2, $3)")
            .bind(turn_id)
            .bind(project_id)
            .bind(message.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "Opened chat turn {turn_id} on project {project_id} (user {})",
            owner.user_id()
        );
        Ok(TurnHandle {
            turn_id,
            project_id,
            user_message_id: message.id,
        })
    }

    async fn complete_turn(&self, turn: &TurnHandle, reply: NewMessage) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        insert_message(&mut tx, turn.project_id, &reply).await?;

        let closed = sqlx::query(
            r#"
            UPDATE chat_turns
            SET status = 'completed', assistant_message_id = $1, closed_at = now()
            WHERE id = $2 AND status = 'pending'
            "#,
        )
        .bind(reply.id)
        .bind(turn.turn_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if closed == 0 {
            // Dropping the transaction rolls back the reply insert.
            return Err(AppError::Conflict(format!(
                "Chat turn {} is no longer pending",
                turn.turn_id
            )));
        }

        tx.commit().await?;

        info!(
            "Completed chat turn {} on project {}",
            turn.turn_id, turn.project_id
        );
        Ok(())
    }

    async fn close_turn(
        &self,
        turn: &TurnHandle,
        status: TurnStatus,
        error: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE chat_turns SET status = $1, error = $2, closed_at = now()
            WHERE id = $3 AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(turn.turn_id)
        .execute(&self.pool)
        .await?;

        info!(
            "Closed chat turn {} on project {} as {}",
            turn.turn_id,
            turn.project_id,
            status.as_str()
        );
        Ok(())
    }

    async fn list_turns(
        &self,
        owner: &Owner,
        project_id: Uuid,
        status: Option<TurnStatus>,
    ) -> Result<Vec<ChatTurnRow>, AppError> {
        Ok(sqlx::query_as::<_, ChatTurnRow>(
            r#"
            SELECT t.*
            FROM chat_turns t
            JOIN projects p ON p.id = t.project_id
            WHERE t.project_id = $1 AND p.user_id = $2 AND ($3::text IS NULL OR t.status = $3)
            ORDER BY t.created_at
            "#,
        )
        .bind(project_id)
        .bind(owner.user_id())
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_session_user(&self, token: &str) -> Result<Option<SessionUser>, AppError> {
        Ok(sqlx::query_as::<_, SessionUser>(
            r#"
            SELECT u.id AS user_id, u.email, u.email_verified
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = $1 AND s.expires_at > now()
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user(&self, owner: &Owner) -> Result<Option<UserRow>, AppError> {
        Ok(sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, email_verified, role, billing_customer_id, created_at
            FROM users WHERE id = $1
            "#,
        )
        .bind(owner.user_id())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn replace_verification(
        &self,
        identifier: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verifications WHERE identifier = $1")
            .bind(identifier)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO verifications (identifier, value, expires_at) VALUES ($1, $2, $3)")
            .bind(identifier)
            .bind(value)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_verification(
        &self,
        identifier: &str,
        value: &str,
    ) -> Result<Option<VerificationRow>, AppError> {
        Ok(sqlx::query_as::<_, VerificationRow>(
            r#"
            SELECT id, identifier, value, expires_at
            FROM verifications WHERE identifier = $1 AND value = $2
            "#,
        )
        .bind(identifier)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_verification(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM verifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = TRUE, updated_at = now() WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_subscription(
        &self,
        owner: &Owner,
    ) -> Result<Option<SubscriptionRow>, AppError> {
        Ok(sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan, status, period_start, period_end,
                   cancel_at_period_end, updated_at
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner.user_id())
        .fetch_optional(&self.pool)
        .await?)
    }
}
