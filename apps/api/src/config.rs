use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::LlmConfig;
use crate::screening::orchestrator::ScreeningOptions;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a numeric one is malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("SCREENER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: parse_env("SCREENER_TEMPERATURE", 0.2)?,
            timeout_secs: parse_env("SCREENER_TIMEOUT_SECS", 60)?,
            max_concurrency: parse_env("SCREENER_MAX_CONCURRENCY", 4)?,
            max_retries: parse_env("SCREENER_MAX_RETRIES", 2)?,
            retry_base_ms: parse_env("SCREENER_RETRY_BASE_MS", 1000)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        if config.max_concurrency == 0 {
            bail!("SCREENER_MAX_CONCURRENCY must be at least 1");
        }

        Ok(config)
    }

    /// Settings for the completion service client.
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Settings for the batch orchestrator.
    pub fn screening_options(&self) -> ScreeningOptions {
        ScreeningOptions {
            max_concurrency: self.max_concurrency,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_ms),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
