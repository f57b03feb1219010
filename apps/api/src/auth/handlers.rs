use axum::{
    extract::{Query, State},
    response::Redirect,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::auth::mailer::OutgoingMail;
use crate::auth::tokens::{generate_token, verification_expiry, VERIFICATION_TTL_MINUTES};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::user::{SubscriptionRow, UserRow};
use crate::state::AppState;

pub const VERIFIED_REDIRECT: &str = "/dashboard?status=email_verified";
pub const VERIFICATION_FAILED_REDIRECT: &str = "/login?error=verification_failed";
pub const INVALID_LINK_REDIRECT: &str = "/login?error=invalid_verification_link";

const VERIFY_PATH: &str = "/api/auth/verify-email";

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
    pub email: Option<String>,
}

/// GET /api/auth/verify-email?token&email
///
/// Always answers with a redirect; the outcome travels in the query string.
pub async fn handle_verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Redirect {
    let token = query.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let email = query.email.as_deref().map(normalize_email).filter(|e| !e.is_empty());

    let (Some(token), Some(email)) = (token, email) else {
        return Redirect::to(INVALID_LINK_REDIRECT);
    };

    match verify_email(&state, token, &email).await {
        Ok(true) => Redirect::to(VERIFIED_REDIRECT),
        Ok(false) => Redirect::to(VERIFICATION_FAILED_REDIRECT),
        Err(e) => {
            error!("Email verification for {email} failed: {e}");
            Redirect::to(VERIFICATION_FAILED_REDIRECT)
        }
    }
}

/// Consumes a verification token. `Ok(false)` means the link is unknown,
/// expired or points at no user.
async fn verify_email(state: &AppState, token: &str, email: &str) -> Result<bool, AppError> {
    let Some(verification) = state.accounts.find_verification(email, token).await? else {
        warn!("Unknown verification token for {email}");
        return Ok(false);
    };

    if verification.is_expired(Utc::now()) {
        state.accounts.delete_verification(verification.id).await?;
        warn!("Expired verification token for {email}");
        return Ok(false);
    }

    if !state.accounts.mark_email_verified(email).await? {
        warn!("Verification token for {email} matches no user");
        return Ok(false);
    }

    state.accounts.delete_verification(verification.id).await?;
    info!("Email verified: {email}");
    Ok(true)
}

#[derive(Debug, Deserialize)]
pub struct SendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendVerificationResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/auth/send-verification-email
pub async fn handle_send_verification_email(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SendVerificationRequest>,
) -> Result<Json<SendVerificationResponse>, AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".into()));
    }
    if email != normalize_email(&user.email) {
        return Err(AppError::Forbidden);
    }
    if user.email_verified {
        return Err(AppError::Validation("Email is already verified".into()));
    }

    let token = generate_token();
    state
        .accounts
        .replace_verification(&email, &token, verification_expiry(Utc::now()))
        .await?;

    let link = verification_link(&state.config.app_url, &token, &email)?;
    state
        .mailer
        .send(OutgoingMail {
            to: email.clone(),
            subject: "Verify your email address".to_string(),
            body: format!(
                "Confirm your email address by opening the link below. \
                 The link expires in {VERIFICATION_TTL_MINUTES} minutes.\n\n{link}\n\n\
                 If you did not request this, you can ignore this message."
            ),
        })
        .await?;

    info!(user_id = %user.user_id, "Verification email sent to {email}");
    Ok(Json(SendVerificationResponse {
        success: true,
        message: "Verification email sent".to_string(),
    }))
}

/// GET /api/me
pub async fn handle_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserRow>, AppError> {
    let row = state
        .accounts
        .find_user(&user.owner())
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(row))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub subscription: Option<SubscriptionRow>,
}

/// GET /api/subscription
///
/// Billing state is written by the payment provider; this only reads it.
pub async fn handle_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let subscription = state.accounts.find_subscription(&user.owner()).await?;
    Ok(Json(SubscriptionResponse { subscription }))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn verification_link(app_url: &str, token: &str, email: &str) -> Result<String, AppError> {
    let url = reqwest::Url::parse_with_params(
        &format!("{app_url}{VERIFY_PATH}"),
        [("token", token), ("email", email)],
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid APP_URL '{app_url}': {e}")))?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::testing::TestApp;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }

    #[test]
    fn test_verification_link_encodes_params() {
        let link = verification_link("http://localhost:3000", "abc123", "a+b@example.com").unwrap();
        assert_eq!(
            link,
            "http://localhost:3000/api/auth/verify-email?token=abc123&email=a%2Bb%40example.com"
        );
    }

    #[test]
    fn test_verification_link_rejects_bad_base() {
        assert!(verification_link("not a url", "t", "e@x.io").is_err());
    }

    fn location(response: &axum::response::Response) -> &str {
        response
            .headers()
            .get(axum::http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_scenario_c_expired_token_fails_without_verifying() {
        let app = TestApp::new();
        let user_id = app.store.add_user("late@example.com", false);
        app.store.add_verification(
            "late@example.com",
            "tok",
            Utc::now() - chrono::Duration::minutes(5),
        );

        let response = app
            .send(
                Method::GET,
                "/api/auth/verify-email?token=tok&email=late%40example.com",
                None,
                None,
            )
            .await;

        assert!(response.status().is_redirection());
        assert!(location(&response).contains("error=verification_failed"));
        assert!(!app.store.user(user_id).unwrap().email_verified);
        assert!(app.store.verifications_for("late@example.com").is_empty());
    }

    #[tokio::test]
    async fn test_valid_token_verifies_and_is_consumed() {
        let app = TestApp::new();
        let user_id = app.store.add_user("new@example.com", false);
        app.store
            .add_verification("new@example.com", "tok", verification_expiry(Utc::now()));

        let response = app
            .send(
                Method::GET,
                "/api/auth/verify-email?token=tok&email=New%40Example.com",
                None,
                None,
            )
            .await;

        assert_eq!(location(&response), VERIFIED_REDIRECT);
        assert!(app.store.user(user_id).unwrap().email_verified);
        assert!(app.store.verifications_for("new@example.com").is_empty());

        let replay = app
            .send(
                Method::GET,
                "/api/auth/verify-email?token=tok&email=new%40example.com",
                None,
                None,
            )
            .await;
        assert_eq!(location(&replay), VERIFICATION_FAILED_REDIRECT);
    }

    #[tokio::test]
    async fn test_missing_params_redirect_to_invalid_link() {
        let app = TestApp::new();
        let response = app
            .send(Method::GET, "/api/auth/verify-email?token=abc", None, None)
            .await;
        assert_eq!(location(&response), INVALID_LINK_REDIRECT);
    }

    #[tokio::test]
    async fn test_send_verification_replaces_tokens_and_mails_link() {
        let app = TestApp::new();
        let user_id = app.store.add_user("fresh@example.com", false);
        let token = app.store.add_session(user_id);
        app.store
            .add_verification("fresh@example.com", "old-token", verification_expiry(Utc::now()));

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/send-verification-email",
                Some(&token),
                Some(json!({"email": "Fresh@example.com"})),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let stored = app.store.verifications_for("fresh@example.com");
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].value, "old-token");

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "fresh@example.com");
        assert!(sent[0].body.contains(&format!(
            "http://localhost:3000/api/auth/verify-email?token={}&email=fresh%40example.com",
            stored[0].value
        )));
    }

    #[tokio::test]
    async fn test_send_verification_for_other_email_is_forbidden() {
        let app = TestApp::new();
        let user_id = app.store.add_user("me@example.com", false);
        let token = app.store.add_session(user_id);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/send-verification-email",
                Some(&token),
                Some(json!({"email": "someone@example.com"})),
            )
            .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        assert!(app.mailer.sent().is_empty());
        assert!(app.store.verifications_for("someone@example.com").is_empty());
    }

    #[tokio::test]
    async fn test_send_verification_requires_session() {
        let app = TestApp::new();
        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/send-verification-email",
                None,
                Some(json!({"email": "me@example.com"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_and_subscription() {
        let app = TestApp::new();
        let (owner, token) = app.session("paid@example.com");

        let (status, body) = app.call(Method::GET, "/api/subscription", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["subscription"].is_null());

        app.store.add_subscription(owner.user_id(), "pro", "active");
        let (_, body) = app.call(Method::GET, "/api/subscription", Some(&token), None).await;
        assert_eq!(body["subscription"]["plan"], "pro");
        assert_eq!(body["subscription"]["status"], "active");

        let (status, body) = app.call(Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "paid@example.com");
    }
}
