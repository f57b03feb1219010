pub mod health;

use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use crate::auth::handlers as auth;
use crate::chat::handlers as chat;
use crate::projects::handlers as projects;
use crate::state::AppState;

/// Headroom over the request ceiling so flows can record their own outcome
/// before the connection is cut.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

pub fn build_router(state: AppState) -> Router {
    let ceiling = state.config.request_timeout + TIMEOUT_GRACE;

    // The streamed chat routes bound themselves: the producer task stops at the
    // ceiling, and a timeout layer would only see the response head.
    let chat_routes = Router::new()
        .route("/api/chat", post(chat::handle_chat))
        .route("/api/nutrition-chat", post(chat::handle_nutrition_chat));

    let api_routes = Router::new()
        // Auth
        .route("/api/auth/verify-email", get(auth::handle_verify_email))
        .route(
            "/api/auth/send-verification-email",
            post(auth::handle_send_verification_email),
        )
        .route("/api/me", get(auth::handle_me))
        .route("/api/subscription", get(auth::handle_subscription))
        // Projects
        .route(
            "/api/projects",
            get(projects::handle_list_projects).post(projects::handle_create_project),
        )
        .route(
            "/api/projects/:id",
            get(projects::handle_get_project)
                .patch(projects::handle_rename_project)
                .delete(projects::handle_delete_project),
        )
        .route("/api/projects/:id/config", put(projects::handle_update_config))
        .route(
            "/api/projects/:id/requirements",
            post(projects::handle_submit_requirements),
        )
        .layer(TimeoutLayer::new(ceiling));

    Router::new()
        .route("/health", get(health::health_handler))
        .merge(chat_routes)
        .merge(api_routes)
        .with_state(state)
}
