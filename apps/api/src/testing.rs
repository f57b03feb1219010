//! In-memory stand-ins for the store, completion and mail seams, plus a small
//! harness for driving the router. Compiled only for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use http_body_util::BodyExt;
use sqlx::types::Json;
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::mailer::{MailError, Mailer, OutgoingMail};
use crate::auth::{Owner, SESSION_COOKIE};
use crate::config::Config;
use crate::errors::AppError;
use crate::llm_client::{CompletionService, CompletionStream, LlmError, StreamEvent};
use crate::models::message::{ChatMessage, MessageRow, NewMessage};
use crate::models::project::{
    DeploymentRequirements, NewProject, OptimizationType, ProjectRow, ProjectType,
};
use crate::models::turn::{ChatTurnRow, TurnStatus};
use crate::models::user::{SessionUser, SubscriptionRow, UserRow, VerificationRow};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{AccountStore, ProjectStore, TurnHandle};

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/optimalcloud_test".to_string(),
        anthropic_api_key: "test-key".to_string(),
        llm_model: "test-model".to_string(),
        app_url: "http://localhost:3000".to_string(),
        port: 0,
        rust_log: "debug".to_string(),
        request_timeout: Duration::from_secs(5),
        stream_buffer: 4,
        email: None,
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRow>,
    sessions: HashMap<String, Uuid>,
    projects: Vec<ProjectRow>,
    messages: Vec<MessageRow>,
    turns: Vec<ChatTurnRow>,
    verifications: Vec<VerificationRow>,
    subscriptions: Vec<SubscriptionRow>,
}

/// Both store traits over plain vectors, with the same ownership and turn
/// rules as the PostgreSQL store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn add_user(&self, email: &str, email_verified: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().users.push(UserRow {
            id,
            email: email.to_string(),
            name: None,
            email_verified,
            role: "user".to_string(),
            billing_customer_id: None,
            created_at: Utc::now(),
        });
        id
    }

    pub fn add_session(&self, user_id: Uuid) -> String {
        let token = format!("session-{}", Uuid::new_v4());
        self.lock().sessions.insert(token.clone(), user_id);
        token
    }

    pub fn add_verification(&self, identifier: &str, value: &str, expires_at: DateTime<Utc>) {
        self.lock().verifications.push(VerificationRow {
            id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            value: value.to_string(),
            expires_at,
        });
    }

    pub fn add_subscription(&self, user_id: Uuid, plan: &str, status: &str) {
        self.lock().subscriptions.push(SubscriptionRow {
            id: Uuid::new_v4(),
            user_id,
            plan: plan.to_string(),
            status: status.to_string(),
            period_start: Some(Utc::now()),
            period_end: None,
            cancel_at_period_end: false,
            updated_at: Utc::now(),
        });
    }

    pub fn user(&self, id: Uuid) -> Option<UserRow> {
        self.lock().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn verifications_for(&self, identifier: &str) -> Vec<VerificationRow> {
        self.lock()
            .verifications
            .iter()
            .filter(|v| v.identifier == identifier)
            .cloned()
            .collect()
    }

    /// Newest first.
    pub fn projects_of(&self, user_id: Uuid) -> Vec<ProjectRow> {
        let mut projects: Vec<ProjectRow> = self
            .lock()
            .projects
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        projects.reverse();
        projects
    }

    pub fn message_count(&self, project_id: Uuid) -> usize {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.project_id == project_id)
            .count()
    }

    /// Simulates a turn some other request is still working on.
    pub fn open_pending_turn(&self, project_id: Uuid, created_at: DateTime<Utc>) {
        let mut tables = self.lock();
        let message = NewMessage {
            created_at,
            ..NewMessage::user_text("in flight")
        };
        push_message(&mut tables, project_id, &message);
        tables.turns.push(ChatTurnRow {
            id: Uuid::new_v4(),
            project_id,
            user_message_id: message.id,
            assistant_message_id: None,
            status: TurnStatus::Pending.as_str().to_string(),
            error: None,
            created_at,
            closed_at: None,
        });
    }

    fn insert_project(&self, owner: &Owner, project: NewProject) -> ProjectRow {
        let now = Utc::now();
        let row = ProjectRow {
            id: project.id,
            user_id: owner.user_id(),
            name: project.name,
            project_type: project.project_type.as_str().to_string(),
            cloud_provider: project.cloud_provider,
            additional_notes: project.additional_notes,
            configuration_type: project.configuration_type.map(|c| c.as_str().to_string()),
            application_type: None,
            language: None,
            framework: None,
            source_repository: None,
            build_instructions: None,
            environment_variables: None,
            ports: None,
            operating_system: None,
            database_required: None,
            database_type: None,
            database_schema: None,
            custom_domain_required: None,
            domain_name: None,
            deployment_guide: None,
            config_content: None,
            optimization_type: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().projects.push(row.clone());
        row
    }
}

fn owned<'a>(
    tables: &'a mut Tables,
    owner: &Owner,
    project_id: Uuid,
) -> Option<&'a mut ProjectRow> {
    tables
        .projects
        .iter_mut()
        .find(|p| p.id == project_id && p.user_id == owner.user_id())
}

fn push_message(tables: &mut Tables, project_id: Uuid, message: &NewMessage) {
    let newest = tables
        .messages
        .iter()
        .filter(|m| m.project_id == project_id)
        .map(|m| m.created_at)
        .max();
    let created_at = newest.map_or(message.created_at, |n| n.max(message.created_at));
    tables.messages.push(MessageRow {
        id: message.id,
        project_id,
        role: message.role.as_str().to_string(),
        parts: Json(message.parts.clone()),
        attachments: Json(message.attachments.clone()),
        created_at,
    });
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn create_project(
        &self,
        owner: &Owner,
        project: NewProject,
    ) -> Result<ProjectRow, AppError> {
        Ok(self.insert_project(owner, project))
    }

    async fn create_project_if_absent(
        &self,
        owner: &Owner,
        project: NewProject,
    ) -> Result<Option<ProjectRow>, AppError> {
        if self.lock().projects.iter().any(|p| p.id == project.id) {
            return Ok(None);
        }
        Ok(Some(self.insert_project(owner, project)))
    }

    async fn rename_project(
        &self,
        owner: &Owner,
        project_id: Uuid,
        name: &str,
    ) -> Result<ProjectRow, AppError> {
        let mut tables = self.lock();
        let project = owned(&mut tables, owner, project_id)
            .ok_or_else(|| AppError::project_not_found(project_id))?;
        project.name = name.to_string();
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn delete_project(&self, owner: &Owner, project_id: Uuid) -> Result<(), AppError> {
        let mut tables = self.lock();
        if owned(&mut tables, owner, project_id).is_none() {
            return Err(AppError::project_not_found(project_id));
        }
        tables.projects.retain(|p| p.id != project_id);
        tables.messages.retain(|m| m.project_id != project_id);
        tables.turns.retain(|t| t.project_id != project_id);
        Ok(())
    }

    async fn update_requirements(
        &self,
        owner: &Owner,
        project_id: Uuid,
        reqs: &DeploymentRequirements,
        guide: &str,
    ) -> Result<ProjectRow, AppError> {
        let mut tables = self.lock();
        let project = owned(&mut tables, owner, project_id)
            .filter(|p| p.kind() == Some(ProjectType::SubmitRequirementsToGetDeploymentGuide))
            .ok_or_else(|| AppError::project_not_found(project_id))?;
        project.application_type = Some(reqs.application_type.clone());
        project.language = Some(reqs.language.clone());
        project.framework = reqs.framework.clone();
        project.source_repository = reqs.source_repository.clone();
        project.build_instructions = reqs.build_instructions.clone();
        project.environment_variables = reqs.environment_variables.clone();
        project.ports = reqs.ports.clone();
        project.operating_system = reqs.operating_system.clone();
        project.database_required = Some(reqs.database_required);
        project.database_type = reqs.database_type.clone();
        project.database_schema = reqs.database_schema.clone();
        project.custom_domain_required = Some(reqs.custom_domain_required);
        project.domain_name = reqs.domain_name.clone();
        if reqs.additional_notes.is_some() {
            project.additional_notes = reqs.additional_notes.clone();
        }
        project.deployment_guide = Some(guide.to_string());
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn update_config(
        &self,
        owner: &Owner,
        project_id: Uuid,
        config_content: &str,
        optimization: OptimizationType,
    ) -> Result<ProjectRow, AppError> {
        let mut tables = self.lock();
        let project = owned(&mut tables, owner, project_id)
            .filter(|p| p.kind() == Some(ProjectType::UploadConfigToGetRecommendations))
            .ok_or_else(|| AppError::project_not_found(project_id))?;
        project.config_content = Some(config_content.to_string());
        project.optimization_type = Some(optimization.as_str().to_string());
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn find_project(
        &self,
        owner: &Owner,
        project_id: Uuid,
    ) -> Result<Option<ProjectRow>, AppError> {
        Ok(owned(&mut self.lock(), owner, project_id).map(|p| p.clone()))
    }

    async fn list_projects(
        &self,
        owner: &Owner,
        project_type: Option<ProjectType>,
    ) -> Result<Vec<ProjectRow>, AppError> {
        Ok(self
            .projects_of(owner.user_id())
            .into_iter()
            .filter(|p| project_type.map_or(true, |t| p.project_type == t.as_str()))
            .collect())
    }

    async fn list_messages(
        &self,
        owner: &Owner,
        project_id: Uuid,
    ) -> Result<Vec<MessageRow>, AppError> {
        let mut tables = self.lock();
        if owned(&mut tables, owner, project_id).is_none() {
            return Ok(Vec::new());
        }
        // Insertion order stands in for the sequence column; a stable sort
        // keeps it for equal timestamps.
        let mut messages: Vec<MessageRow> = tables
            .messages
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn begin_turn(
        &self,
        owner: &Owner,
        project_id: Uuid,
        message: NewMessage,
        stale_before: DateTime<Utc>,
    ) -> Result<TurnHandle, AppError> {
        let mut tables = self.lock();
        if owned(&mut tables, owner, project_id).is_none() {
            return Err(AppError::project_not_found(project_id));
        }

        let now = Utc::now();
        for turn in tables.turns.iter_mut().filter(|t| {
            t.project_id == project_id
                && t.status == TurnStatus::Pending.as_str()
                && t.created_at < stale_before
        }) {
            turn.status = TurnStatus::Abandoned.as_str().to_string();
            turn.error = Some("no reply recorded".to_string());
            turn.closed_at = Some(now);
        }

        if tables
            .turns
            .iter()
            .any(|t| t.project_id == project_id && t.status == TurnStatus::Pending.as_str())
        {
            return Err(AppError::Conflict(
                "A reply is still being generated for this project".to_string(),
            ));
        }

        push_message(&mut tables, project_id, &message);
        let turn_id = Uuid::new_v4();
        tables.turns.push(ChatTurnRow {
            id: turn_id,
            project_id,
            user_message_id: message.id,
            assistant_message_id: None,
            status: TurnStatus::Pending.as_str().to_string(),
            error: None,
            created_at: now,
            closed_at: None,
        });

        Ok(TurnHandle {
            turn_id,
            project_id,
            user_message_id: message.id,
        })
    }

    async fn complete_turn(&self, turn: &TurnHandle, reply: NewMessage) -> Result<(), AppError> {
        let mut tables = self.lock();
        let pending = tables
            .turns
            .iter()
            .any(|t| t.id == turn.turn_id && t.status == TurnStatus::Pending.as_str());
        if !pending {
            return Err(AppError::Conflict(format!(
                "Chat turn {} is no longer pending",
                turn.turn_id
            )));
        }

        push_message(&mut tables, turn.project_id, &reply);
        if let Some(row) = tables.turns.iter_mut().find(|t| t.id == turn.turn_id) {
            row.status = TurnStatus::Completed.as_str().to_string();
            row.assistant_message_id = Some(reply.id);
            row.closed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn close_turn(
        &self,
        turn: &TurnHandle,
        status: TurnStatus,
        error: Option<&str>,
    ) -> Result<(), AppError> {
        let mut tables = self.lock();
        if let Some(row) = tables
            .turns
            .iter_mut()
            .find(|t| t.id == turn.turn_id && t.status == TurnStatus::Pending.as_str())
        {
            row.status = status.as_str().to_string();
            row.error = error.map(str::to_string);
            row.closed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_turns(
        &self,
        owner: &Owner,
        project_id: Uuid,
        status: Option<TurnStatus>,
    ) -> Result<Vec<ChatTurnRow>, AppError> {
        let mut tables = self.lock();
        if owned(&mut tables, owner, project_id).is_none() {
            return Ok(Vec::new());
        }
        let mut turns: Vec<ChatTurnRow> = tables
            .turns
            .iter()
            .filter(|t| t.project_id == project_id)
            .filter(|t| status.map_or(true, |s| t.status == s.as_str()))
            .cloned()
            .collect();
        turns.sort_by_key(|t| t.created_at);
        Ok(turns)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn find_session_user(&self, token: &str) -> Result<Option<SessionUser>, AppError> {
        let tables = self.lock();
        let Some(user_id) = tables.sessions.get(token) else {
            return Ok(None);
        };
        Ok(tables
            .users
            .iter()
            .find(|u| u.id == *user_id)
            .map(|u| SessionUser {
                user_id: u.id,
                email: u.email.clone(),
                email_verified: u.email_verified,
            }))
    }

    async fn find_user(&self, owner: &Owner) -> Result<Option<UserRow>, AppError> {
        Ok(self.user(owner.user_id()))
    }

    async fn replace_verification(
        &self,
        identifier: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.lock()
            .verifications
            .retain(|v| v.identifier != identifier);
        self.add_verification(identifier, value, expires_at);
        Ok(())
    }

    async fn find_verification(
        &self,
        identifier: &str,
        value: &str,
    ) -> Result<Option<VerificationRow>, AppError> {
        Ok(self
            .lock()
            .verifications
            .iter()
            .find(|v| v.identifier == identifier && v.value == value)
            .cloned())
    }

    async fn delete_verification(&self, id: Uuid) -> Result<(), AppError> {
        self.lock().verifications.retain(|v| v.id != id);
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str) -> Result<bool, AppError> {
        let mut tables = self.lock();
        let mut found = false;
        for user in tables
            .users
            .iter_mut()
            .filter(|u| u.email.to_lowercase() == email.to_lowercase())
        {
            user.email_verified = true;
            found = true;
        }
        Ok(found)
    }

    async fn find_subscription(
        &self,
        owner: &Owner,
    ) -> Result<Option<SubscriptionRow>, AppError> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.user_id == owner.user_id())
            .max_by_key(|s| s.updated_at)
            .cloned())
    }
}

type ScriptedStream = Result<Vec<Result<StreamEvent, LlmError>>, LlmError>;

/// Completion service that plays back queued results. With nothing queued,
/// `complete` answers "Scripted reply" and `stream` yields one short message.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    systems: Mutex<Vec<String>>,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
    latency: Mutex<Latency>,
}

#[derive(Default, Clone, Copy)]
struct Latency {
    open: Duration,
    per_event: Duration,
}

impl ScriptedCompletion {
    /// Delays every call by `open` and, for streams, every event by `per_event`.
    pub fn set_latency(&self, open: Duration, per_event: Duration) {
        *self.latency.lock().unwrap() = Latency { open, per_event };
    }

    pub fn push_reply(&self, reply: Result<String, LlmError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_stream(&self, stream: ScriptedStream) {
        self.streams.lock().unwrap().push_back(stream);
    }

    pub fn calls(&self) -> usize {
        self.systems.lock().unwrap().len()
    }

    /// System prompts received, in call order.
    pub fn systems(&self) -> Vec<String> {
        self.systems.lock().unwrap().clone()
    }

    /// Text of the last message of every call, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.histories
            .lock()
            .unwrap()
            .iter()
            .filter_map(|h| h.last().map(ChatMessage::text))
            .collect()
    }

    pub fn last_history_len(&self) -> usize {
        self.histories.lock().unwrap().last().map_or(0, Vec::len)
    }

    fn record(&self, system: &str, messages: &[ChatMessage]) {
        self.systems.lock().unwrap().push(system.to_string());
        self.histories.lock().unwrap().push(messages.to_vec());
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.record(system, messages);
        let latency = *self.latency.lock().unwrap();
        tokio::time::sleep(latency.open).await;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Scripted reply".to_string()))
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream, LlmError> {
        self.record(system, messages);
        let events = self.streams.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(vec![
                Ok(StreamEvent::Delta("Scripted reply".to_string())),
                Ok(StreamEvent::Finished),
            ])
        })?;
        let latency = *self.latency.lock().unwrap();
        tokio::time::sleep(latency.open).await;
        let per_event = latency.per_event;
        Ok(Box::pin(futures::stream::iter(events).then(
            move |event| async move {
                tokio::time::sleep(per_event).await;
                event
            },
        )))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Application state wired to the in-memory fakes, with handles kept for
/// assertions.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub llm: Arc<ScriptedCompletion>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::default());
        let llm = Arc::new(ScriptedCompletion::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState {
            projects: store.clone(),
            accounts: store.clone(),
            llm: llm.clone(),
            mailer: mailer.clone(),
            config: test_config(),
        };
        Self {
            state,
            store,
            llm,
            mailer,
        }
    }

    /// A new user with verified email.
    pub fn owner(&self, email: &str) -> Owner {
        Owner::for_tests(self.store.add_user(email, true))
    }

    /// A new user with verified email and a live session token.
    pub fn session(&self, email: &str) -> (Owner, String) {
        let owner = self.owner(email);
        let token = self.store.add_session(owner.user_id());
        (owner, token)
    }

    pub fn seed_project(&self, owner: &Owner, name: &str, project_type: ProjectType) -> ProjectRow {
        self.store.insert_project(
            owner,
            NewProject {
                id: Uuid::new_v4(),
                name: name.to_string(),
                project_type,
                cloud_provider: Some("aws".to_string()),
                additional_notes: None,
                configuration_type: None,
            },
        )
    }

    /// Sends one request through the router and returns the raw body text.
    pub async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, String) {
        let response = self.send(method, uri, token, body).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    /// Like [`Self::call_raw`], parsing the body as JSON (`Null` when empty).
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let (status, text) = self.call_raw(method, uri, token, body).await;
        let json = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap()
        };
        (status, json)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap()
    }
}
