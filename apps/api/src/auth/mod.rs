//! Session authentication and the ownership capability derived from it.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

pub mod handlers;
pub mod mailer;
pub mod tokens;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";

/// Proof that the caller acts for a user. Only an authenticated session can
/// produce one, and every project-scoped store call requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    user_id: Uuid,
}

impl Owner {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    #[cfg(test)]
    pub fn for_tests(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

/// Authenticated user resolved from the session cookie or a `Bearer` token.
///
/// Use this as an extractor parameter in any handler that requires a session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub email_verified: bool,
}

impl AuthUser {
    pub fn owner(&self) -> Owner {
        Owner {
            user_id: self.user_id,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or(AppError::Unauthorized)?;

        let user = state
            .accounts
            .find_session_user(&token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser {
            user_id: user.user_id,
            email: user.email,
            email_verified: user.email_verified,
        })
    }
}

/// Reads the session token, preferring the cookie over the header.
fn session_token(parts: &Parts) -> Option<String> {
    let from_cookie = parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
    })
    .filter(|t| !t.is_empty())
}
