use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Panics at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Base URL of the external workflow engine, e.g. "https://api.promptlayer.com".
    pub workflow_api_url: String,
    pub workflow_api_key: String,
    /// Public base URL of THIS service, used to build the callback_url that the
    /// workflow engine posts completions back to.
    pub callback_base_url: String,
    /// Optional shared secret the engine must present in the Authorization
    /// header of callback requests. Unset = callbacks are unauthenticated.
    pub callback_secret: Option<String>,
    pub port: u16,
    pub rust_log: String,
    /// Outbound launch timeout for full pitch generation jobs.
    pub pitch_timeout_secs: u64,
    /// Outbound launch timeout for guidance jobs (much shorter workflows).
    pub guidance_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            workflow_api_url: require_env("WORKFLOW_API_URL")?,
            workflow_api_key: require_env("WORKFLOW_API_KEY")?,
            callback_base_url: require_env("CALLBACK_BASE_URL")?,
            callback_secret: std::env::var("CALLBACK_SECRET").ok(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            pitch_timeout_secs: std::env::var("PITCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse::<u64>()
                .context("PITCH_TIMEOUT_SECS must be a number of seconds")?,
            guidance_timeout_secs: std::env::var("GUIDANCE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "55".to_string())
                .parse::<u64>()
                .context("GUIDANCE_TIMEOUT_SECS must be a number of seconds")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
