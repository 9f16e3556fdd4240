use crate::llm::GenerationConfig;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "App báo giá nội thất thông minh dựa trên hình ảnh";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set. Export it or add it to a .env file")]
    MissingApiKey,

    #[error("{name} must be {expected}, got {value}")]
    OutOfRange {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{name} is not a valid number: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// API credential. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Everything needed to build the model client. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: ApiKey,
    pub model: String,
    pub base_url: String,
    pub system_instruction: String,
    pub generation: GenerationConfig,
    /// `None` waits for the provider indefinitely.
    pub request_timeout: Option<Duration>,
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub system_instruction: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ModelConfig {
    /// Load from the process environment, then apply `overrides`.
    pub fn from_env(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), overrides)
    }

    pub fn from_lookup<F>(lookup: F, overrides: &Overrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            temperature: pick(
                overrides.temperature,
                parse_var(&lookup, "GEMINI_TEMPERATURE")?,
                defaults.temperature,
            ),
            top_p: pick(
                overrides.top_p,
                parse_var(&lookup, "GEMINI_TOP_P")?,
                defaults.top_p,
            ),
            top_k: pick(
                overrides.top_k,
                parse_var(&lookup, "GEMINI_TOP_K")?,
                defaults.top_k,
            ),
            max_output_tokens: pick(
                overrides.max_output_tokens,
                parse_var(&lookup, "GEMINI_MAX_OUTPUT_TOKENS")?,
                defaults.max_output_tokens,
            ),
        };

        let timeout_secs: Option<u64> = overrides
            .timeout_secs
            .or(parse_var(&lookup, "GEMINI_TIMEOUT_SECS")?);

        let config = Self {
            api_key: ApiKey::new(api_key),
            model: overrides
                .model
                .clone()
                .or_else(|| lookup("GEMINI_MODEL"))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            system_instruction: overrides
                .system_instruction
                .clone()
                .or_else(|| lookup("GEMINI_SYSTEM_PROMPT"))
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            generation,
            // zero means no deadline
            request_timeout: timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generation;
        if !(0.0..=2.0).contains(&g.temperature) {
            return Err(out_of_range("temperature", "within [0, 2]", g.temperature));
        }
        if !(0.0..=1.0).contains(&g.top_p) {
            return Err(out_of_range("top_p", "within [0, 1]", g.top_p));
        }
        if g.top_k == 0 {
            return Err(out_of_range("top_k", "a positive integer", g.top_k));
        }
        if g.max_output_tokens == 0 {
            return Err(out_of_range(
                "max_output_tokens",
                "a positive integer",
                g.max_output_tokens,
            ));
        }
        Ok(())
    }
}

fn pick<T>(flag: Option<T>, env: Option<T>, default: T) -> T {
    flag.or(env).unwrap_or(default)
}

fn parse_var<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
    }
}

fn out_of_range(name: &'static str, expected: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        expected,
        value: value.to_string(),
    }
}
