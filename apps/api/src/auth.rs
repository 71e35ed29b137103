use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::Session;
use crate::state::AppState;

/// The authenticated caller, resolved from a bearer session token.
///
/// The identity provider itself is external; this service only trusts tokens
/// it can resolve to a live row in the `sessions` table. Every handler that
/// touches user data takes this extractor and scopes its queries to `user_id`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let session: Option<Session> = sqlx::query_as(
            "SELECT * FROM sessions WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&state.db)
        .await?;

        session
            .map(|s| AuthUser { user_id: s.user_id })
            .ok_or(AppError::Unauthorized)
    }
}
