use sqlx::PgPool;

use crate::config::Config;
use crate::workflow_client::WorkflowClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub workflow: WorkflowClient,
    pub config: Config,
}
