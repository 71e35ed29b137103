#![allow(dead_code)]

//! Consumer-side driver for the async generation protocol.
//!
//! Wraps the three server endpoints behind a small state machine:
//! `Idle → Requesting → Polling → {Completed, TimedOut, Failed}`. Polling is a
//! fixed-interval loop with a hard attempt budget, so a job that never
//! completes surfaces as `TimedOut` rather than polling forever.
//!
//! At most one loop may be in flight per record. The in-flight map is keyed by
//! record id and stamped with an epoch; a superseding request or an explicit
//! `cancel` drops the entry, and the stale loop notices before its next poll
//! and stops without touching the caller's state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::generation::handlers::GenerateResponse;
use crate::generation::initiator::GeneratePitchRequest;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Initiation can block for the whole server-side launch (which itself waits
/// on the engine), so its transport timeout sits above the largest configured
/// launch timeout. Polls are cheap reads.
const INITIATE_TIMEOUT: Duration = Duration::from_secs(310);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Completed(String),
}

/// Terminal result of one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed(String),
    /// The attempt budget ran out with the job still pending.
    TimedOut,
    /// Initiation or a poll failed at the transport/API level.
    Failed(String),
    /// Cancelled or superseded before resolving.
    Cancelled,
    /// A loop for this record is already running; nothing was started.
    AlreadyInFlight,
}

/// Seam between the poll loop and the wire, so the state machine is testable
/// against scripted fakes.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn initiate(
        &self,
        pitch_id: Uuid,
        request: &GeneratePitchRequest,
    ) -> Result<String, BackendError>;

    async fn poll(&self, request_id: &str) -> Result<PollStatus, BackendError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

pub struct GenerationClient<B> {
    backend: B,
    config: PollConfig,
    /// record id → epoch of the loop currently driving it
    in_flight: Mutex<HashMap<Uuid, u64>>,
    next_epoch: AtomicU64,
}

impl<B: GenerationBackend> GenerationClient<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, PollConfig::default())
    }

    pub fn with_config(backend: B, config: PollConfig) -> Self {
        Self {
            backend,
            config,
            in_flight: Mutex::new(HashMap::new()),
            next_epoch: AtomicU64::new(0),
        }
    }

    /// Runs one full generation attempt for `pitch_id`, driving the request
    /// and poll loop to a terminal outcome. Duplicate calls for a record with
    /// a loop already in flight short-circuit to `AlreadyInFlight`.
    pub async fn generate(
        &self,
        pitch_id: Uuid,
        request: &GeneratePitchRequest,
    ) -> GenerationOutcome {
        let Some(epoch) = self.begin(pitch_id) else {
            return GenerationOutcome::AlreadyInFlight;
        };

        let outcome = self.drive(pitch_id, epoch, request).await;
        self.finish(pitch_id, epoch);
        outcome
    }

    /// Stops the in-flight loop for a record, if any. The loop observes the
    /// removal before its next poll and exits with `Cancelled`.
    pub fn cancel(&self, pitch_id: Uuid) {
        self.lock_in_flight().remove(&pitch_id);
    }

    async fn drive(
        &self,
        pitch_id: Uuid,
        epoch: u64,
        request: &GeneratePitchRequest,
    ) -> GenerationOutcome {
        // Requesting
        let request_id = match self.backend.initiate(pitch_id, request).await {
            Ok(id) => id,
            Err(e) => return GenerationOutcome::Failed(e.to_string()),
        };

        // Polling
        for attempt in 1..=self.config.max_attempts {
            tokio::time::sleep(self.config.interval).await;

            if !self.is_current(pitch_id, epoch) {
                return GenerationOutcome::Cancelled;
            }

            match self.backend.poll(&request_id).await {
                Ok(PollStatus::Completed(content)) => {
                    return GenerationOutcome::Completed(content)
                }
                Ok(PollStatus::Pending) => {
                    debug!(
                        "Poll {attempt}/{} for {request_id}: pending",
                        self.config.max_attempts
                    );
                }
                Err(e) => return GenerationOutcome::Failed(e.to_string()),
            }
        }

        GenerationOutcome::TimedOut
    }

    fn begin(&self, pitch_id: Uuid) -> Option<u64> {
        let mut in_flight = self.lock_in_flight();
        if in_flight.contains_key(&pitch_id) {
            return None;
        }
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        in_flight.insert(pitch_id, epoch);
        Some(epoch)
    }

    fn is_current(&self, pitch_id: Uuid, epoch: u64) -> bool {
        self.lock_in_flight().get(&pitch_id) == Some(&epoch)
    }

    fn finish(&self, pitch_id: Uuid, epoch: u64) {
        let mut in_flight = self.lock_in_flight();
        if in_flight.get(&pitch_id) == Some(&epoch) {
            in_flight.remove(&pitch_id);
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, u64>> {
        self.in_flight.lock().expect("in-flight map lock poisoned")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP backend
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    content: Option<String>,
}

/// Production backend speaking HTTP to the service.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl HttpBackend {
    pub fn new(base_url: String, auth_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn initiate(
        &self,
        pitch_id: Uuid,
        request: &GeneratePitchRequest,
    ) -> Result<String, BackendError> {
        let url = format!("{}/api/v1/pitches/{pitch_id}/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(request)
            .timeout(INITIATE_TIMEOUT)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(body.request_id.to_string())
    }

    async fn poll(&self, request_id: &str) -> Result<PollStatus, BackendError> {
        let url = format!(
            "{}/api/v1/generation/status?requestId={request_id}",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.auth_token)
            .timeout(POLL_TIMEOUT)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        match (body.status.as_str(), body.content) {
            ("completed", Some(content)) => Ok(PollStatus::Completed(content)),
            _ => Ok(PollStatus::Pending),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::initiator::{ActionStep, StarAction, StarExample};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn request() -> GeneratePitchRequest {
        GeneratePitchRequest {
            role_name: "Data Analyst".to_string(),
            role_level: "APS6".to_string(),
            role_description: "Insights for policy teams".to_string(),
            relevant_experience: "5 years".to_string(),
            pitch_word_limit: 500,
            star_examples: vec![StarExample {
                situation: "s".to_string(),
                task: "t".to_string(),
                action: StarAction {
                    steps: vec![ActionStep {
                        step: "a".to_string(),
                        method: None,
                        outcome: None,
                    }],
                },
                result: "r".to_string(),
            }],
        }
    }

    /// Backend that replays a fixed script of poll results, then pends.
    struct ScriptedBackend {
        initiate_result: Option<String>,
        script: Mutex<VecDeque<Result<PollStatus, BackendError>>>,
        polls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<PollStatus, BackendError>>) -> Self {
            Self {
                initiate_result: Some("req-1".to_string()),
                script: Mutex::new(script.into_iter().collect()),
                polls: AtomicU32::new(0),
            }
        }

        fn failing_initiate() -> Self {
            Self {
                initiate_result: None,
                script: Mutex::new(VecDeque::new()),
                polls: AtomicU32::new(0),
            }
        }

        fn poll_count(&self) -> u32 {
            self.polls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn initiate(
            &self,
            _pitch_id: Uuid,
            _request: &GeneratePitchRequest,
        ) -> Result<String, BackendError> {
            self.initiate_result.clone().ok_or(BackendError::Api {
                status: 504,
                message: "engine unavailable".to_string(),
            })
        }

        async fn poll(&self, _request_id: &str) -> Result<PollStatus, BackendError> {
            self.polls.fetch_add(1, Ordering::Relaxed);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PollStatus::Pending))
        }
    }

    fn config(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(5),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_pending_polls() {
        let backend = ScriptedBackend::new(vec![
            Ok(PollStatus::Pending),
            Ok(PollStatus::Pending),
            Ok(PollStatus::Completed("<p>done</p>".to_string())),
        ]);
        let client = GenerationClient::with_config(backend, config(20));

        let outcome = client.generate(Uuid::new_v4(), &request()).await;

        assert_eq!(
            outcome,
            GenerationOutcome::Completed("<p>done</p>".to_string())
        );
        assert_eq!(client.backend.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_attempt_budget() {
        let client = GenerationClient::with_config(ScriptedBackend::new(vec![]), config(3));
        let start = Instant::now();

        let outcome = client.generate(Uuid::new_v4(), &request()).await;

        assert_eq!(outcome, GenerationOutcome::TimedOut);
        assert_eq!(client.backend.poll_count(), 3);
        // Bounded: exactly max_attempts * interval of (virtual) wall clock.
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initiation_failure_never_polls() {
        let client =
            GenerationClient::with_config(ScriptedBackend::failing_initiate(), config(20));

        let outcome = client.generate(Uuid::new_v4(), &request()).await;

        assert!(matches!(outcome, GenerationOutcome::Failed(_)));
        assert_eq!(client.backend.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_transport_error_fails_the_loop() {
        let backend = ScriptedBackend::new(vec![
            Ok(PollStatus::Pending),
            Err(BackendError::Transport("connection reset".to_string())),
        ]);
        let client = GenerationClient::with_config(backend, config(20));

        let outcome = client.generate(Uuid::new_v4(), &request()).await;

        assert!(matches!(outcome, GenerationOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_short_circuits_and_cancel_stops_loop() {
        let client = Arc::new(GenerationClient::with_config(
            ScriptedBackend::new(vec![]),
            config(20),
        ));
        let pitch_id = Uuid::new_v4();

        let first = {
            let client = Arc::clone(&client);
            let request = request();
            tokio::spawn(async move { client.generate(pitch_id, &request).await })
        };

        // Let the first loop register itself and start polling.
        tokio::task::yield_now().await;

        let second = client.generate(pitch_id, &request()).await;
        assert_eq!(second, GenerationOutcome::AlreadyInFlight);

        client.cancel(pitch_id);
        assert_eq!(first.await.unwrap(), GenerationOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_is_reusable_after_terminal_outcome() {
        let backend = ScriptedBackend::new(vec![Ok(PollStatus::Completed("one".to_string()))]);
        let client = GenerationClient::with_config(backend, config(20));
        let pitch_id = Uuid::new_v4();

        let outcome = client.generate(pitch_id, &request()).await;
        assert_eq!(outcome, GenerationOutcome::Completed("one".to_string()));

        // The in-flight entry is released; a fresh attempt may start.
        let outcome = client.generate(pitch_id, &request()).await;
        assert_eq!(outcome, GenerationOutcome::TimedOut);
    }
}
