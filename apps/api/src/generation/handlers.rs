//! Axum route handlers for the async generation protocol: job initiation,
//! the engine callback, and status polling.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::generation::callback::{resolve_content, resolve_correlation_id, ResolvedContent};
use crate::generation::initiator::{
    initiate_guidance, initiate_pitch, GenerateGuidanceRequest, GeneratePitchRequest,
};
use crate::generation::sanitize::sanitize_markup;
use crate::generation::status::find_by_request_id;
use crate::state::AppState;

/// Poll cadence hint returned with every pending status response.
const POLL_RETRY_AFTER_SECS: &str = "5";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
    /// Which output signals completion: "pitch" (default) or "guidance".
    pub kind: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Job Initiator
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/pitches/:id/generate
///
/// Charges one credit, claims the record, and launches the pitch workflow.
/// Returns the correlation id the client should poll with. Does not wait for
/// the job to complete.
pub async fn handle_generate_pitch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(pitch_id): Path<Uuid>,
    Json(request): Json<GeneratePitchRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let request_id = initiate_pitch(&state, auth.user_id, pitch_id, &request).await?;

    Ok(Json(GenerateResponse {
        success: true,
        request_id,
    }))
}

/// POST /api/v1/pitches/:id/guidance
pub async fn handle_generate_guidance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(pitch_id): Path<Uuid>,
    Json(request): Json<GenerateGuidanceRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let request_id = initiate_guidance(&state, auth.user_id, pitch_id, &request).await?;

    Ok(Json(GenerateResponse {
        success: true,
        request_id,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Status Poller
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/generation/status?requestId=...&kind=pitch|guidance
///
/// Read-only. Everything short of "content is present" — including a missing
/// record and transient lookup failure — collapses to `pending`, so the
/// polling client never sees a hard failure it would have to special-case.
pub async fn handle_generation_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<StatusQuery>,
) -> Result<Response, AppError> {
    let request_id = query
        .request_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("requestId query parameter is required".to_string()))?;

    let wants_guidance = match query.kind.as_deref() {
        None | Some("pitch") => false,
        Some("guidance") => true,
        Some(other) => {
            return Err(AppError::Validation(format!(
                "kind must be 'pitch' or 'guidance', got '{other}'"
            )))
        }
    };

    let content = match find_by_request_id(&state.db, request_id, Some(auth.user_id)).await {
        Ok(Some(row)) => {
            if wants_guidance {
                row.ai_guidance
            } else {
                row.pitch_content
            }
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Status lookup for {request_id} failed, reporting pending: {e}");
            None
        }
    };

    Ok(match content {
        Some(content) => Json(json!({ "status": "completed", "content": content })).into_response(),
        None => (
            [(header::RETRY_AFTER, POLL_RETRY_AFTER_SECS)],
            Json(json!({ "status": "pending" })),
        )
            .into_response(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Callback Receiver
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/callbacks/generation
///
/// Invoked by the workflow engine on completion. Safe to call more than once
/// for the same correlation id: persisting is an idempotent overwrite.
///
/// An unresolvable correlation id is answered 200 with a warning rather than
/// an error — the engine retries failed deliveries, and a record that no
/// longer exists would otherwise be retried against forever.
pub async fn handle_generation_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    if !callback_authorized(&state, &headers) {
        return Err(AppError::Unauthorized);
    }

    let correlation_id = resolve_correlation_id(&payload).ok_or_else(|| {
        AppError::Validation("callback payload carries no correlation identifier".to_string())
    })?;

    let content = resolve_content(&payload).ok_or_else(|| {
        AppError::Validation("callback payload carries no generated content".to_string())
    })?;

    let Some(row) = find_by_request_id(&state.db, &correlation_id, None).await? else {
        warn!("Callback for unknown correlation id {correlation_id}, acknowledging without writes");
        return Ok(Json(json!({
            "received": true,
            "warning": format!("no record matched correlation id {correlation_id}")
        }))
        .into_response());
    };

    // The in-flight marker is released in the same statement that lands the
    // output, so the record is immediately eligible for its next job.
    match content {
        ResolvedContent::Pitch(markup) => {
            sqlx::query(
                r#"
                UPDATE pitches
                SET pitch_content = $1,
                    status = 'final',
                    agent_execution_id = NULL,
                    updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(sanitize_markup(&markup))
            .bind(row.id)
            .execute(&state.db)
            .await?;

            info!("Pitch {} content persisted from callback", row.id);
        }
        ResolvedContent::Guidance(text) => {
            sqlx::query(
                r#"
                UPDATE pitches
                SET ai_guidance = $1,
                    agent_execution_id = NULL,
                    updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(sanitize_markup(&text))
            .bind(row.id)
            .execute(&state.db)
            .await?;

            info!("Pitch {} guidance persisted from callback", row.id);
        }
    }

    Ok(Json(json!({ "received": true })).into_response())
}

/// When a callback secret is configured, the engine must present it in the
/// Authorization header (bare or Bearer-prefixed). No secret = open endpoint.
fn callback_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(secret) = state.config.callback_secret.as_deref() else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v) == secret)
        .unwrap_or(false)
}
