//! TOML configuration parsing and validation.
//!
//! All settings live in one file (default `./config/ideas.toml`). Secrets
//! are never stored in the file: the analysis and verification sections
//! name the environment variables that hold them, and the values are read
//! once when the corresponding client is constructed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubmissionConfig {
    /// Maximum non-cached submissions per owner in any rolling 24 hours.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
        }
    }
}

fn default_daily_limit() -> i64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_provider")]
    pub provider: String,
    #[serde(default = "default_analysis_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Wall-clock budget for one analysis, including the retry.
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: default_analysis_provider(),
            endpoint: default_analysis_endpoint(),
            model: None,
            timeout_secs: default_analysis_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl AnalysisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_analysis_provider() -> String {
    "perplexity".to_string()
}
fn default_analysis_endpoint() -> String {
    "https://api.perplexity.ai/chat/completions".to_string()
}
fn default_analysis_timeout_secs() -> u64 {
    45
}
fn default_api_key_env() -> String {
    "PERPLEXITY_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerificationConfig {
    #[serde(default = "default_verification_provider")]
    pub provider: String,
    #[serde(default = "default_verification_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_verification_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            provider: default_verification_provider(),
            endpoint: default_verification_endpoint(),
            secret_env: default_secret_env(),
            timeout_secs: default_verification_timeout_secs(),
        }
    }
}

impl VerificationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_verification_provider() -> String {
    "turnstile".to_string()
}
fn default_verification_endpoint() -> String {
    "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string()
}
fn default_secret_env() -> String {
    "TURNSTILE_SECRET_KEY".to_string()
}
fn default_verification_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Run the queue consumer inside `ideas serve`.
    #[serde(default = "default_embedded")]
    pub embedded: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a received but unacknowledged job stays invisible.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            embedded: default_embedded(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

fn default_embedded() -> bool {
    true
}
fn default_batch_size() -> usize {
    10
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_visibility_timeout_secs() -> i64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Offset from UTC used to decide where "today" starts for best-of-day.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

fn default_utc_offset_minutes() -> i32 {
    -480
}

/// Largest offset any real timezone uses, in minutes.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.submission.daily_limit < 1 {
        anyhow::bail!("submission.daily_limit must be >= 1");
    }

    match config.analysis.provider.as_str() {
        "disabled" | "perplexity" => {}
        other => anyhow::bail!(
            "Unknown analysis provider: '{}'. Must be disabled or perplexity.",
            other
        ),
    }

    if config.analysis.is_enabled() {
        if config.analysis.model.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!(
                "analysis.model must be specified when provider is '{}'",
                config.analysis.provider
            );
        }
        if config.analysis.timeout_secs == 0 {
            anyhow::bail!("analysis.timeout_secs must be > 0");
        }
    }

    match config.verification.provider.as_str() {
        "disabled" | "turnstile" => {}
        other => anyhow::bail!(
            "Unknown verification provider: '{}'. Must be disabled or turnstile.",
            other
        ),
    }

    if config.verification.is_enabled() && config.verification.timeout_secs == 0 {
        anyhow::bail!("verification.timeout_secs must be > 0");
    }

    if config.worker.batch_size == 0 {
        anyhow::bail!("worker.batch_size must be > 0");
    }
    if config.worker.visibility_timeout_secs < 1 {
        anyhow::bail!("worker.visibility_timeout_secs must be >= 1");
    }

    if config.app.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        anyhow::bail!("app.utc_offset_minutes must be within ±{}", MAX_UTC_OFFSET_MINUTES);
    }

    Ok(())
}
