use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One pitch through its draft → in-progress → final → submitted lifecycle.
///
/// `agent_execution_id` is the correlation identifier for the async generation
/// protocol. It is null at rest, set equal to `id` (by convention, enforced at
/// claim time) while a workflow job is in flight, and cleared again if the
/// outbound launch fails — so a non-null value always means a real job exists.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PitchRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_name: String,
    pub role_level: String,
    pub role_description: String,
    pub relevant_experience: String,
    pub pitch_word_limit: i32,
    pub star_examples: Value,
    pub agent_execution_id: Option<String>,
    /// Written only by the callback receiver, for guidance jobs.
    pub ai_guidance: Option<String>,
    /// Written only by the callback receiver, for pitch jobs. Presence of this
    /// field is the completion signal the status poller reads.
    pub pitch_content: Option<String>,
    /// 'draft' | 'failed' | 'final' | 'submitted'. 'failed' marks a rolled-back
    /// launch and is retryable exactly like 'draft'.
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
