/// Workflow Client — the single point of entry for all external workflow-engine calls.
///
/// ARCHITECTURAL RULE: No other module may call the workflow engine directly.
/// All engine interactions MUST go through this module.
///
/// There is deliberately no retry loop here: a launch either lands or it
/// doesn't. On failure the initiator rolls back its in-progress claim and the
/// user retries the whole job, so a retried POST would risk double-launching.
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Workflow used for full pitch generation.
pub const PITCH_WORKFLOW: &str = "Master_Agent_V1";
/// Workflow used for short-form guidance generation.
pub const GUIDANCE_WORKFLOW: &str = "Guidance_Agent_V1";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Engine rejected launch: {0}")]
    Rejected(String),

    #[error("Engine accepted launch but returned no execution id")]
    MissingExecutionId,
}

/// One outbound launch request. The engine runs the workflow asynchronously
/// and POSTs its result to `callback_url` when done; the execution id returned
/// here is the engine's own handle and is logged, not persisted — correlation
/// back to the record rides on the `id_unique` input variable instead.
#[derive(Debug)]
pub struct WorkflowRun<'a> {
    pub workflow: &'a str,
    /// Pinned engine-side version, e.g. "v1.2". None = the engine's default.
    pub version_label: Option<&'a str>,
    pub input_variables: Value,
    pub callback_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow_label_name: Option<&'a str>,
    input_variables: &'a Value,
    callback_url: &'a str,
    return_all_outputs: bool,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    success: bool,
    message: Option<String>,
    workflow_version_execution_id: Option<Value>,
}

/// The single workflow-engine client shared by all handlers.
#[derive(Clone)]
pub struct WorkflowClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WorkflowClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            // Timeouts are per-launch (they differ by job type), set on each request.
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Launches a workflow run. Returns the engine's execution id on a 2xx
    /// response; any non-2xx status or timeout is an error and the caller is
    /// expected to roll back its in-progress state.
    pub async fn run(&self, run: WorkflowRun<'_>) -> Result<String, WorkflowError> {
        let url = format!("{}/workflows/{}/run", self.base_url, run.workflow);

        let body = RunRequest {
            workflow_label_name: run.version_label,
            input_variables: &run.input_variables,
            callback_url: &run.callback_url,
            return_all_outputs: false,
        };

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .timeout(run.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WorkflowError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let run_response: RunResponse = response.json().await?;

        if !run_response.success {
            return Err(WorkflowError::Rejected(
                run_response
                    .message
                    .unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        // The engine has returned this as both a string and a number across
        // versions; normalize to a string either way.
        let execution_id = match run_response.workflow_version_execution_id {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(WorkflowError::MissingExecutionId),
        };

        debug!("Workflow {} launched: execution_id={execution_id}", run.workflow);

        Ok(execution_id)
    }
}
