use std::sync::Arc;

use crate::auth::mailer::Mailer;
use crate::config::Config;
use crate::llm_client::CompletionService;
use crate::store::{AccountStore, ProjectStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<dyn ProjectStore>,
    pub accounts: Arc<dyn AccountStore>,
    /// Completion backend. `LlmClient` in production, scripted in tests.
    pub llm: Arc<dyn CompletionService>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Config,
}
