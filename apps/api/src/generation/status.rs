//! Record lookup by correlation identifier.
//!
//! The correlation id equals the record's primary key by convention, but the
//! convention is enforced at claim time, not assumed here: lookups always try
//! the correlation column AND the primary key so a record is found whichever
//! field the caller's identifier happens to name.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::pitch::PitchRow;

/// Finds the record a request id refers to, via correlation column or primary
/// key. `owner` scopes the lookup for authenticated callers (the status
/// poller); the callback receiver passes `None` because the engine carries no
/// user identity.
pub async fn find_by_request_id(
    pool: &PgPool,
    request_id: &str,
    owner: Option<Uuid>,
) -> Result<Option<PitchRow>, sqlx::Error> {
    // A request id that is not a UUID can still match the correlation column.
    let record_id = Uuid::parse_str(request_id).ok();

    sqlx::query_as::<_, PitchRow>(
        r#"
        SELECT * FROM pitches
        WHERE (agent_execution_id = $1 OR ($2::uuid IS NOT NULL AND id = $2))
          AND ($3::uuid IS NULL OR user_id = $3)
        "#,
    )
    .bind(request_id)
    .bind(record_id)
    .bind(owner)
    .fetch_optional(pool)
    .await
}
