//! Usage-balance accounting.
//!
//! One credit gates one pitch generation job. Charge and refund are single
//! conditional statements so the balance check and the debit cannot race; no
//! transaction ever spans the initiator and the callback.

use axum::{extract::State, Json};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

/// Debits one credit. Returns false (and changes nothing) when the balance is
/// already zero.
pub async fn charge(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET credits = credits - 1 WHERE id = $1 AND credits >= 1",
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns one credit after a launch that never produced a job.
pub async fn refund(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET credits = credits + 1 WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: i32,
}

/// GET /api/v1/credits
pub async fn handle_get_credits(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CreditsResponse>, AppError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth.user_id)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or(AppError::Unauthorized)?;

    Ok(Json(CreditsResponse {
        credits: user.credits,
    }))
}
