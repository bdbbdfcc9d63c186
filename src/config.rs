//! Forecast pipeline configuration.
//!
//! Everything the pipeline needs from its environment (endpoint, model, credentials,
//! timeout, reporting timezone) lives in [`ForecastConfig`] and is handed to the
//! orchestrator at construction. Only the CLI reads process environment variables.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::pipeline::forecasting::ForecastError;

/// Application-level constants
pub const APP_NAME: &str = "healthcard-forecast";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fewest non-zero days of history worth sending upstream.
pub const MIN_HISTORY_DAYS: usize = 7;

/// Longest horizon a caller may request.
pub const MAX_HORIZON_DAYS: i64 = 90;

/// Upper bound on a single upstream call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Municipal reporting timezone (UTC+08:00).
const DEFAULT_UTC_OFFSET_SECS: i32 = 8 * 3600;

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";

const ENV_PROVIDER: &str = "HEALTHCARD_FORECAST_PROVIDER";
const ENV_ENDPOINT: &str = "HEALTHCARD_FORECAST_ENDPOINT";
const ENV_MODEL: &str = "HEALTHCARD_FORECAST_MODEL";
const ENV_API_KEY: &str = "HEALTHCARD_FORECAST_API_KEY";
const ENV_TIMEOUT_SECS: &str = "HEALTHCARD_FORECAST_TIMEOUT_SECS";
const ENV_UTC_OFFSET: &str = "HEALTHCARD_FORECAST_UTC_OFFSET";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "healthcard_forecast=info,forecast=info,warn"
}

/// Wire protocol spoken by the upstream text-generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Ollama `/api/generate`.
    Ollama,
    /// OpenAI-compatible `/v1/chat/completions`.
    OpenAiCompatible,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAiCompatible => "openai",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai_compatible" | "openai-compatible" => Ok(Self::OpenAiCompatible),
            other => Err(ForecastError::Config(format!("unknown provider '{other}'"))),
        }
    }
}

/// Explicit configuration for one
/// [`ForecastOrchestrator`](crate::pipeline::forecasting::ForecastOrchestrator).
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub provider: Provider,
    /// Base URL of the upstream service, without trailing slash.
    pub endpoint: String,
    pub model: String,
    /// Bearer token for OpenAI-compatible providers.
    pub api_key: Option<String>,
    /// Bound on the upstream call.
    pub timeout: Duration,
    /// Timezone used to bucket completion timestamps into calendar days.
    pub reporting_offset: FixedOffset,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            reporting_offset: default_reporting_offset(),
        }
    }
}

impl ForecastConfig {
    /// Build a config from `HEALTHCARD_FORECAST_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ForecastError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ForecastError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(provider) = lookup(ENV_PROVIDER) {
            config.provider = provider.parse()?;
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup(ENV_MODEL) {
            if model.trim().is_empty() {
                return Err(ForecastError::Config(format!("{ENV_MODEL} is empty")));
            }
            config.model = model;
        }
        config.api_key = lookup(ENV_API_KEY).filter(|k| !k.trim().is_empty());

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ForecastError::Config(format!(
                    "{ENV_TIMEOUT_SECS} must be a whole number, got '{raw}'"
                ))
            })?;
            if secs == 0 {
                return Err(ForecastError::Config(format!("{ENV_TIMEOUT_SECS} must be positive")));
            }
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(ENV_UTC_OFFSET) {
            config.reporting_offset = raw.trim().parse::<FixedOffset>().map_err(|_| {
                ForecastError::Config(format!(
                    "{ENV_UTC_OFFSET} must look like +08:00, got '{raw}'"
                ))
            })?;
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reporting_offset(mut self, offset: FixedOffset) -> Self {
        self.reporting_offset = offset;
        self
    }
}

fn default_reporting_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}
