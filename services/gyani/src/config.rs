//! Application Configuration Module
//!
//! Loads the service settings from environment variables (and an optional
//! `.env` file) into a single struct handed to the rest of the binary.

use gyani_core::InterviewConfig;
use gyani_core::embedding::DEFAULT_DIMENSION;
use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAI,
    /// Canned replies, no network. Useful for rehearsals and demos.
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Hashing,
    OpenAI,
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: LlmProvider,
    pub gemini_api_key: Option<SecretString>,
    pub openai_api_key: Option<SecretString>,
    pub chat_model: String,
    pub embedding_provider: EmbeddingProvider,
    pub knowledge_base_path: PathBuf,
    pub vector_index_path: PathBuf,
    pub vector_dimension: usize,
    pub window_monitor: bool,
    pub log_level: Level,
    pub interview: InterviewConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
    #[error("Could not read interview config {path}: {reason}")]
    InterviewConfig { path: PathBuf, reason: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `LLM_PROVIDER`: "gemini" (default), "openai" or "offline".
    // *   `GEMINI_API_KEY` / `OPENAI_API_KEY`: required by the matching provider.
    // *   `CHAT_MODEL`: (Optional) Defaults to "gemini-2.0-flash" or "gpt-4o".
    // *   `EMBEDDING_PROVIDER`: "hashing" (default) or "openai".
    // *   `KNOWLEDGE_BASE_PATH`, `VECTOR_INDEX_PATH`, `VECTOR_DIMENSION`.
    // *   `WINDOW_MONITOR`: (Optional) "false" disables the focus watcher.
    // *   `INTERVIEW_CONFIG`: (Optional) JSON file overriding interview tunables.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider = match lookup("LLM_PROVIDER")
            .unwrap_or_else(|| "gemini".to_string())
            .to_lowercase()
            .as_str()
        {
            "gemini" => LlmProvider::Gemini,
            "openai" => LlmProvider::OpenAI,
            "offline" => LlmProvider::Offline,
            other => {
                return Err(ConfigError::InvalidValue {
                    var: "LLM_PROVIDER",
                    value: other.to_string(),
                });
            }
        };

        let embedding_provider = match lookup("EMBEDDING_PROVIDER")
            .unwrap_or_else(|| "hashing".to_string())
            .to_lowercase()
            .as_str()
        {
            "hashing" => EmbeddingProvider::Hashing,
            "openai" => EmbeddingProvider::OpenAI,
            other => {
                return Err(ConfigError::InvalidValue {
                    var: "EMBEDDING_PROVIDER",
                    value: other.to_string(),
                });
            }
        };

        let gemini_api_key = lookup("GEMINI_API_KEY").map(SecretString::from);
        let openai_api_key = lookup("OPENAI_API_KEY").map(SecretString::from);

        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| {
            match provider {
                LlmProvider::OpenAI => "gpt-4o",
                _ => "gemini-2.0-flash",
            }
            .to_string()
        });

        let vector_dimension = match lookup("VECTOR_DIMENSION") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(d) if d > 0 => d,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "VECTOR_DIMENSION",
                        value: raw,
                    });
                }
            },
            None => DEFAULT_DIMENSION,
        };

        let window_monitor = match lookup("WINDOW_MONITOR") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                var: "WINDOW_MONITOR",
                value: raw,
            })?,
            None => true,
        };

        let interview = match lookup("INTERVIEW_CONFIG") {
            Some(path) => load_interview_config(PathBuf::from(path))?,
            None => InterviewConfig::default(),
        };

        // Configure logging level from RUST_LOG, with a sensible default.
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let config = Self {
            provider,
            gemini_api_key,
            openai_api_key,
            chat_model,
            embedding_provider,
            knowledge_base_path: lookup("KNOWLEDGE_BASE_PATH")
                .unwrap_or_else(|| "knowledge_base.json".to_string())
                .into(),
            vector_index_path: lookup("VECTOR_INDEX_PATH")
                .unwrap_or_else(|| "vector_index.idx".to_string())
                .into(),
            vector_dimension,
            window_monitor,
            log_level,
            interview,
        };

        // Validate that the required API keys are present for the selected providers.
        if config.provider == LlmProvider::Gemini && config.gemini_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "GEMINI_API_KEY must be set for gemini provider".to_string(),
            ));
        }
        let needs_openai = config.provider == LlmProvider::OpenAI
            || config.embedding_provider == EmbeddingProvider::OpenAI;
        if needs_openai && config.openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for openai provider".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn load_interview_config(path: PathBuf) -> Result<InterviewConfig, ConfigError> {
    let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::InterviewConfig {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::InterviewConfig {
        path,
        reason: e.to_string(),
    })
}
