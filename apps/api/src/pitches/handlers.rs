//! Axum route handlers for pitch CRUD.
//!
//! Direct edits bypass the generation protocol entirely, with two guards: a
//! record with a job in flight cannot be edited out from under the callback,
//! and any user-supplied markup passes the same sanitizer callbacks do.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::generation::sanitize::sanitize_markup;
use crate::models::pitch::PitchRow;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePitchRequest {
    pub role_name: String,
    pub role_level: String,
    pub role_description: String,
    #[serde(default)]
    pub relevant_experience: String,
    pub pitch_word_limit: u32,
    #[serde(default)]
    pub star_examples: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePitchRequest {
    pub role_name: Option<String>,
    pub role_level: Option<String>,
    pub role_description: Option<String>,
    pub relevant_experience: Option<String>,
    pub pitch_word_limit: Option<u32>,
    pub pitch_content: Option<String>,
}

/// POST /api/v1/pitches
pub async fn handle_create_pitch(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreatePitchRequest>,
) -> Result<(StatusCode, Json<PitchRow>), AppError> {
    validate_create(&request)?;

    let row = sqlx::query_as::<_, PitchRow>(
        r#"
        INSERT INTO pitches
            (id, user_id, role_name, role_level, role_description,
             relevant_experience, pitch_word_limit, star_examples, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'draft')
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.user_id)
    .bind(&request.role_name)
    .bind(&request.role_level)
    .bind(&request.role_description)
    .bind(&request.relevant_experience)
    .bind(request.pitch_word_limit as i32)
    .bind(request.star_examples.unwrap_or_else(|| json!([])))
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/pitches
pub async fn handle_list_pitches(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<PitchRow>>, AppError> {
    let rows = sqlx::query_as::<_, PitchRow>(
        "SELECT * FROM pitches WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// GET /api/v1/pitches/:id
pub async fn handle_get_pitch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(pitch_id): Path<Uuid>,
) -> Result<Json<PitchRow>, AppError> {
    let row = sqlx::query_as::<_, PitchRow>(
        "SELECT * FROM pitches WHERE id = $1 AND user_id = $2",
    )
    .bind(pitch_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Pitch {pitch_id} not found")))?;

    Ok(Json(row))
}

/// PATCH /api/v1/pitches/:id
pub async fn handle_update_pitch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(pitch_id): Path<Uuid>,
    Json(request): Json<UpdatePitchRequest>,
) -> Result<Json<PitchRow>, AppError> {
    validate_update(&request)?;

    let existing = sqlx::query_as::<_, PitchRow>(
        "SELECT * FROM pitches WHERE id = $1 AND user_id = $2",
    )
    .bind(pitch_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Pitch {pitch_id} not found")))?;

    if existing.agent_execution_id.is_some() {
        return Err(AppError::Conflict(
            "A generation job is in flight; edit after it completes".to_string(),
        ));
    }

    let pitch_content = request.pitch_content.as_deref().map(sanitize_markup);

    let row = sqlx::query_as::<_, PitchRow>(
        r#"
        UPDATE pitches
        SET role_name = COALESCE($3, role_name),
            role_level = COALESCE($4, role_level),
            role_description = COALESCE($5, role_description),
            relevant_experience = COALESCE($6, relevant_experience),
            pitch_word_limit = COALESCE($7, pitch_word_limit),
            pitch_content = COALESCE($8, pitch_content),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(pitch_id)
    .bind(auth.user_id)
    .bind(request.role_name.as_deref())
    .bind(request.role_level.as_deref())
    .bind(request.role_description.as_deref())
    .bind(request.relevant_experience.as_deref())
    .bind(request.pitch_word_limit.map(|l| l as i32))
    .bind(pitch_content.as_deref())
    .fetch_one(&state.db)
    .await?;

    Ok(Json(row))
}

/// POST /api/v1/pitches/:id/submit
///
/// Conditional `final → submitted` transition in one statement.
pub async fn handle_submit_pitch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(pitch_id): Path<Uuid>,
) -> Result<Json<PitchRow>, AppError> {
    let row = sqlx::query_as::<_, PitchRow>(
        r#"
        UPDATE pitches
        SET status = 'submitted', updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND status = 'final'
        RETURNING *
        "#,
    )
    .bind(pitch_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?;

    match row {
        Some(row) => Ok(Json(row)),
        None => {
            let exists: Option<i32> =
                sqlx::query_scalar("SELECT 1 FROM pitches WHERE id = $1 AND user_id = $2")
                    .bind(pitch_id)
                    .bind(auth.user_id)
                    .fetch_optional(&state.db)
                    .await?;

            Err(match exists {
                None => AppError::NotFound(format!("Pitch {pitch_id} not found")),
                Some(_) => {
                    AppError::Conflict("Only a finalized pitch can be submitted".to_string())
                }
            })
        }
    }
}

fn validate_create(request: &CreatePitchRequest) -> Result<(), AppError> {
    for (value, field) in [
        (&request.role_name, "role_name"),
        (&request.role_level, "role_level"),
        (&request.role_description, "role_description"),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} cannot be empty")));
        }
    }

    if request.pitch_word_limit == 0 {
        return Err(AppError::Validation(
            "pitch_word_limit must be positive".to_string(),
        ));
    }

    Ok(())
}

fn validate_update(request: &UpdatePitchRequest) -> Result<(), AppError> {
    for (value, field) in [
        (&request.role_name, "role_name"),
        (&request.role_level, "role_level"),
        (&request.role_description, "role_description"),
    ] {
        if let Some(value) = value {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} cannot be empty")));
            }
        }
    }

    if request.pitch_word_limit == Some(0) {
        return Err(AppError::Validation(
            "pitch_word_limit must be positive".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_role_fields() {
        let request = CreatePitchRequest {
            role_name: "".to_string(),
            role_level: "APS6".to_string(),
            role_description: "desc".to_string(),
            relevant_experience: String::new(),
            pitch_word_limit: 650,
            star_examples: None,
        };
        assert!(validate_create(&request).is_err());
    }

    #[test]
    fn test_update_allows_sparse_patches() {
        let request = UpdatePitchRequest {
            role_name: None,
            role_level: None,
            role_description: None,
            relevant_experience: None,
            pitch_word_limit: None,
            pitch_content: Some("<p>edited</p>".to_string()),
        };
        assert!(validate_update(&request).is_ok());
    }

    #[test]
    fn test_update_rejects_blank_provided_field() {
        let request = UpdatePitchRequest {
            role_name: Some("  ".to_string()),
            role_level: None,
            role_description: None,
            relevant_experience: None,
            pitch_word_limit: None,
            pitch_content: None,
        };
        assert!(validate_update(&request).is_err());
    }
}
