//! Job Initiator — validates, charges, claims the record, and launches the
//! external workflow run.
//!
//! Flow: validate payload → charge one credit (pitch jobs) → claim the record
//! with a single conditional UPDATE → build engine inputs → launch with a
//! bounded timeout → on failure, roll the claim back and refund.
//!
//! The claim UPDATE both checks and transitions state in one statement, so two
//! near-simultaneous initiations for the same record cannot both launch.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::credits;
use crate::errors::AppError;
use crate::generation::budget::{version_label, word_budget};
use crate::state::AppState;
use crate::workflow_client::{WorkflowRun, GUIDANCE_WORKFLOW, PITCH_WORKFLOW};

pub const MAX_STAR_EXAMPLES: usize = 4;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePitchRequest {
    pub role_name: String,
    pub role_level: String,
    pub role_description: String,
    pub relevant_experience: String,
    pub pitch_word_limit: u32,
    pub star_examples: Vec<StarExample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarExample {
    pub situation: String,
    pub task: String,
    pub action: StarAction,
    pub result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarAction {
    pub steps: Vec<ActionStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStep {
    pub step: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateGuidanceRequest {
    pub role_name: String,
    pub role_level: String,
    pub role_description: String,
    pub relevant_experience: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Initiation flows
// ────────────────────────────────────────────────────────────────────────────

/// Launches a full pitch generation job. Returns the correlation identifier
/// (the record id, by convention) the client polls with.
pub async fn initiate_pitch(
    state: &AppState,
    user_id: Uuid,
    pitch_id: Uuid,
    request: &GeneratePitchRequest,
) -> Result<Uuid, AppError> {
    validate_pitch_request(request)?;

    // Single charge point: the conditional decrement is also the balance gate.
    if !credits::charge(&state.db, user_id).await? {
        return Err(AppError::InsufficientCredits);
    }

    let claimed = claim_for_pitch(&state.db, pitch_id, user_id, request).await?;
    if claimed == 0 {
        credits::refund(&state.db, user_id).await?;
        return Err(claim_rejection(&state.db, pitch_id, user_id).await?);
    }

    let run = WorkflowRun {
        workflow: PITCH_WORKFLOW,
        version_label: Some(version_label(request.star_examples.len())),
        input_variables: build_pitch_input_variables(pitch_id, request)?,
        callback_url: callback_url(&state.config),
        timeout: Duration::from_secs(state.config.pitch_timeout_secs),
    };

    match state.workflow.run(run).await {
        Ok(execution_id) => {
            info!("Pitch {pitch_id} generation launched (engine execution {execution_id})");
            Ok(pitch_id)
        }
        Err(e) => {
            warn!("Pitch {pitch_id} launch failed, rolling back claim: {e}");
            release_failed_pitch(&state.db, pitch_id).await?;
            credits::refund(&state.db, user_id).await?;
            Err(AppError::Upstream(e.to_string()))
        }
    }
}

/// Launches a guidance job on the same record. Guidance is free and does not
/// touch the pitch lifecycle status; the only guard is "no job in flight."
pub async fn initiate_guidance(
    state: &AppState,
    user_id: Uuid,
    pitch_id: Uuid,
    request: &GenerateGuidanceRequest,
) -> Result<Uuid, AppError> {
    validate_guidance_request(request)?;

    let claimed = claim_for_guidance(&state.db, pitch_id, user_id, request).await?;
    if claimed == 0 {
        return Err(claim_rejection(&state.db, pitch_id, user_id).await?);
    }

    let run = WorkflowRun {
        workflow: GUIDANCE_WORKFLOW,
        version_label: None,
        input_variables: build_guidance_input_variables(pitch_id, request),
        callback_url: callback_url(&state.config),
        timeout: Duration::from_secs(state.config.guidance_timeout_secs),
    };

    match state.workflow.run(run).await {
        Ok(execution_id) => {
            info!("Pitch {pitch_id} guidance launched (engine execution {execution_id})");
            Ok(pitch_id)
        }
        Err(e) => {
            warn!("Pitch {pitch_id} guidance launch failed, rolling back claim: {e}");
            release_guidance_claim(&state.db, pitch_id).await?;
            Err(AppError::Upstream(e.to_string()))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Claims and rollbacks — single-statement, conditional
// ────────────────────────────────────────────────────────────────────────────

/// Claims the record for a pitch job: sets the correlation id equal to the
/// record's own id and snapshots the submitted inputs. Zero rows affected
/// means the record is missing, owned by someone else, already in flight, or
/// past the retryable draft/failed states.
async fn claim_for_pitch(
    pool: &PgPool,
    pitch_id: Uuid,
    user_id: Uuid,
    request: &GeneratePitchRequest,
) -> Result<u64, AppError> {
    let star_examples = serde_json::to_value(&request.star_examples)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize STAR examples: {e}")))?;

    let result = sqlx::query(
        r#"
        UPDATE pitches
        SET agent_execution_id = id::text,
            role_name = $3,
            role_level = $4,
            role_description = $5,
            relevant_experience = $6,
            pitch_word_limit = $7,
            star_examples = $8,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
          AND status IN ('draft', 'failed')
          AND agent_execution_id IS NULL
        "#,
    )
    .bind(pitch_id)
    .bind(user_id)
    .bind(&request.role_name)
    .bind(&request.role_level)
    .bind(&request.role_description)
    .bind(&request.relevant_experience)
    .bind(request.pitch_word_limit as i32)
    .bind(&star_examples)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

async fn claim_for_guidance(
    pool: &PgPool,
    pitch_id: Uuid,
    user_id: Uuid,
    request: &GenerateGuidanceRequest,
) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE pitches
        SET agent_execution_id = id::text,
            role_name = $3,
            role_level = $4,
            role_description = $5,
            relevant_experience = $6,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
          AND agent_execution_id IS NULL
        "#,
    )
    .bind(pitch_id)
    .bind(user_id)
    .bind(&request.role_name)
    .bind(&request.role_level)
    .bind(&request.role_description)
    .bind(&request.relevant_experience)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Maps a zero-row claim to the right rejection: 404 when the record isn't the
/// caller's to see, 409 when it exists but can't accept a new job.
async fn claim_rejection(
    pool: &PgPool,
    pitch_id: Uuid,
    user_id: Uuid,
) -> Result<AppError, AppError> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM pitches WHERE id = $1 AND user_id = $2")
            .bind(pitch_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(match status {
        None => AppError::NotFound(format!("Pitch {pitch_id} not found")),
        Some(_) => {
            AppError::Conflict("A generation job is already in flight or the pitch is finalized".to_string())
        }
    })
}

/// Rolls back a pitch claim whose launch never landed: the correlation id is
/// cleared so the record cannot look in-progress with no job behind it, and
/// 'failed' keeps the record retryable.
async fn release_failed_pitch(pool: &PgPool, pitch_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE pitches SET agent_execution_id = NULL, status = 'failed', updated_at = NOW() WHERE id = $1",
    )
    .bind(pitch_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Guidance rollback leaves the lifecycle status untouched.
async fn release_guidance_claim(pool: &PgPool, pitch_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE pitches SET agent_execution_id = NULL, updated_at = NOW() WHERE id = $1",
    )
    .bind(pitch_id)
    .execute(pool)
    .await?;

    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

pub fn validate_pitch_request(request: &GeneratePitchRequest) -> Result<(), AppError> {
    require_text(&request.role_name, "role_name")?;
    require_text(&request.role_level, "role_level")?;
    require_text(&request.role_description, "role_description")?;
    require_text(&request.relevant_experience, "relevant_experience")?;

    if request.pitch_word_limit == 0 {
        return Err(AppError::Validation(
            "pitch_word_limit must be positive".to_string(),
        ));
    }

    if request.star_examples.is_empty() || request.star_examples.len() > MAX_STAR_EXAMPLES {
        return Err(AppError::Validation(format!(
            "star_examples must contain between 1 and {MAX_STAR_EXAMPLES} examples"
        )));
    }

    for (i, example) in request.star_examples.iter().enumerate() {
        require_text(&example.situation, &format!("star_examples[{i}].situation"))?;
        require_text(&example.task, &format!("star_examples[{i}].task"))?;
        require_text(&example.result, &format!("star_examples[{i}].result"))?;

        if example.action.steps.is_empty() {
            return Err(AppError::Validation(format!(
                "star_examples[{i}].action must contain at least one step"
            )));
        }
        for (j, step) in example.action.steps.iter().enumerate() {
            require_text(&step.step, &format!("star_examples[{i}].action.steps[{j}].step"))?;
        }
    }

    Ok(())
}

pub fn validate_guidance_request(request: &GenerateGuidanceRequest) -> Result<(), AppError> {
    require_text(&request.role_name, "role_name")?;
    require_text(&request.role_level, "role_level")?;
    require_text(&request.role_description, "role_description")?;
    require_text(&request.relevant_experience, "relevant_experience")?;
    Ok(())
}

fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        Err(AppError::Validation(format!("{field} cannot be empty")))
    } else {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine payload construction
// ────────────────────────────────────────────────────────────────────────────

fn callback_url(config: &Config) -> String {
    format!(
        "{}/api/v1/callbacks/generation",
        config.callback_base_url.trim_end_matches('/')
    )
}

fn job_description(role_name: &str, role_level: &str, role_description: &str) -> String {
    format!("Role: {role_name}\nLevel: {role_level}\nDescription: {role_description}")
}

/// Flattens structured action steps into the numbered-text form the engine
/// prompts expect.
fn flatten_action(action: &StarAction) -> String {
    action
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let mut lines = vec![format!("Step {}: {}", i + 1, step.step)];
            if let Some(method) = step.method.as_deref().filter(|m| !m.trim().is_empty()) {
                lines.push(format!("How: {method}"));
            }
            if let Some(outcome) = step.outcome.as_deref().filter(|o| !o.trim().is_empty()) {
                lines.push(format!("Outcome: {outcome}"));
            }
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The engine takes STAR examples as a JSON-encoded string with flattened
/// action text and 1-based string ids.
fn star_components(examples: &[StarExample]) -> Result<String, AppError> {
    let flattened: Vec<Value> = examples
        .iter()
        .enumerate()
        .map(|(i, example)| {
            json!({
                "id": (i + 1).to_string(),
                "situation": example.situation,
                "task": example.task,
                "action": flatten_action(&example.action),
                "result": example.result,
            })
        })
        .collect();

    serde_json::to_string(&json!({ "starExamples": flattened }))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode STAR components: {e}")))
}

fn build_pitch_input_variables(
    pitch_id: Uuid,
    request: &GeneratePitchRequest,
) -> Result<Value, AppError> {
    let budget = word_budget(request.pitch_word_limit, request.star_examples.len());

    Ok(json!({
        "id_unique": pitch_id.to_string(),
        "job_description": job_description(
            &request.role_name,
            &request.role_level,
            &request.role_description,
        ),
        "star_components": star_components(&request.star_examples)?,
        "User_Experience": request.relevant_experience,
        "Intro_Word_Count": budget.intro.to_string(),
        "Star_Word_Count": budget.per_star.to_string(),
        "Conclusion_Word_Count": budget.conclusion.to_string(),
    }))
}

fn build_guidance_input_variables(pitch_id: Uuid, request: &GenerateGuidanceRequest) -> Value {
    json!({
        "id_unique": pitch_id.to_string(),
        "job_description": job_description(
            &request.role_name,
            &request.role_level,
            &request.role_description,
        ),
        "User_Experience": request.relevant_experience,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> StarExample {
        StarExample {
            situation: "Dept. of Health, 2022: fragmented testing data".to_string(),
            task: "Consolidate disparate sources into one pipeline".to_string(),
            action: StarAction {
                steps: vec![
                    ActionStep {
                        step: "Designed a standard schema".to_string(),
                        method: Some("SQL and batch ETL jobs".to_string()),
                        outcome: Some("Cut manual cleaning by 80%".to_string()),
                    },
                    ActionStep {
                        step: "Automated dashboard refresh".to_string(),
                        method: None,
                        outcome: None,
                    },
                ],
            },
            result: "Reporting time fell from 24h to 30min".to_string(),
        }
    }

    fn request() -> GeneratePitchRequest {
        GeneratePitchRequest {
            role_name: "Data Analyst".to_string(),
            role_level: "APS6".to_string(),
            role_description: "Provide data-driven insights for policy teams.".to_string(),
            relevant_experience: "5 years analysing large datasets".to_string(),
            pitch_word_limit: 650,
            star_examples: vec![example(), example()],
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(validate_pitch_request(&request()).is_ok());
    }

    #[test]
    fn test_blank_role_name_rejected() {
        let mut req = request();
        req.role_name = "   ".to_string();
        assert!(matches!(
            validate_pitch_request(&req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_word_limit_rejected() {
        let mut req = request();
        req.pitch_word_limit = 0;
        assert!(matches!(
            validate_pitch_request(&req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_star_example_count_bounds() {
        let mut req = request();
        req.star_examples.clear();
        assert!(validate_pitch_request(&req).is_err());

        req.star_examples = vec![example(); 5];
        assert!(validate_pitch_request(&req).is_err());
    }

    #[test]
    fn test_empty_action_steps_rejected() {
        let mut req = request();
        req.star_examples[0].action.steps.clear();
        assert!(validate_pitch_request(&req).is_err());
    }

    #[test]
    fn test_flatten_action_numbers_steps_and_skips_blank_lines() {
        let flattened = flatten_action(&example().action);
        assert_eq!(
            flattened,
            "Step 1: Designed a standard schema\n\
             How: SQL and batch ETL jobs\n\
             Outcome: Cut manual cleaning by 80%\n\
             \n\
             Step 2: Automated dashboard refresh"
        );
    }

    #[test]
    fn test_star_components_is_json_encoded_with_string_ids() {
        let encoded = star_components(&request().star_examples).unwrap();
        let decoded: Value = serde_json::from_str(&encoded).unwrap();

        let examples = decoded["starExamples"].as_array().unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0]["id"], "1");
        assert_eq!(examples[1]["id"], "2");
        assert!(examples[0]["action"].as_str().unwrap().starts_with("Step 1:"));
    }

    #[test]
    fn test_pitch_input_variables_carry_budgets_as_strings() {
        let pitch_id = Uuid::new_v4();
        let vars = build_pitch_input_variables(pitch_id, &request()).unwrap();

        assert_eq!(vars["id_unique"], pitch_id.to_string());
        assert_eq!(vars["Intro_Word_Count"], "65");
        assert_eq!(vars["Star_Word_Count"], "260");
        assert_eq!(vars["Conclusion_Word_Count"], "65");
        assert!(vars["job_description"]
            .as_str()
            .unwrap()
            .starts_with("Role: Data Analyst\nLevel: APS6"));
    }

    #[test]
    fn test_guidance_input_variables() {
        let pitch_id = Uuid::new_v4();
        let vars = build_guidance_input_variables(
            pitch_id,
            &GenerateGuidanceRequest {
                role_name: "Data Analyst".to_string(),
                role_level: "APS6".to_string(),
                role_description: "Insights for policy teams".to_string(),
                relevant_experience: "5 years".to_string(),
            },
        );

        assert_eq!(vars["id_unique"], pitch_id.to_string());
        assert_eq!(vars["User_Experience"], "5 years");
        assert!(vars.get("star_components").is_none());
    }
}
