//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use studypod_core::RagConfig;
use tracing::Level;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub data_dir: PathBuf,
    pub log_level: Level,
    pub cors_origin: String,

    pub groq_api_key: String,
    pub llm_base_url: String,

    /// Speech synthesis is optional; podcasts are unavailable without a key.
    pub openai_api_key: Option<String>,
    pub tts_base_url: String,
    pub tts_voice: String,

    pub embedding_cache_dir: PathBuf,

    /// The immutable settings handed to every core component.
    pub rag: Arc<RagConfig>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, which keeps tests off the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address = parse_var(&lookup, "BIND_ADDRESS", "0.0.0.0:3000")?;
        let data_dir = PathBuf::from(var("DATA_DIR", "./data"));
        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;
        let cors_origin = var("CORS_ORIGIN", "http://localhost:5173");

        // --- LLM ---
        let groq_api_key = lookup("GROQ_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GROQ_API_KEY".to_string()))?;
        let llm_base_url = var("LLM_BASE_URL", GROQ_BASE_URL);

        // --- Speech ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let tts_base_url = var("TTS_BASE_URL", OPENAI_BASE_URL);
        let tts_voice = var("TTS_VOICE", "alloy").to_lowercase();

        let embedding_cache_dir = PathBuf::from(var("EMBEDDING_CACHE_DIR", ".fastembed_cache"));

        // --- Retrieval ---
        let defaults = RagConfig::default();
        let chunk_size: usize = parse_var(&lookup, "CHUNK_SIZE", &defaults.chunk_size.to_string())?;
        let chunk_overlap: usize =
            parse_var(&lookup, "CHUNK_OVERLAP", &defaults.chunk_overlap.to_string())?;
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue(
                "CHUNK_OVERLAP".to_string(),
                format!("must be smaller than CHUNK_SIZE ({})", chunk_size),
            ));
        }
        let top_k: usize = parse_var(&lookup, "TOP_K", &defaults.top_k.to_string())?;
        if top_k == 0 {
            return Err(ConfigError::InvalidValue("TOP_K".to_string(), "must be at least 1".to_string()));
        }
        let max_upload_mb: u64 = parse_var(&lookup, "MAX_UPLOAD_MB", "50")?;

        let rag = RagConfig {
            chunk_size,
            chunk_overlap,
            top_k,
            primary_model: var("LLM_MODEL", &defaults.primary_model),
            fallback_model: var("LLM_FALLBACK_MODEL", &defaults.fallback_model),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            podcast_voice: Some(tts_voice.clone()),
            ..defaults
        };

        Ok(Self {
            bind_address,
            data_dir,
            log_level,
            cors_origin,
            groq_api_key,
            llm_base_url,
            openai_api_key,
            tts_base_url,
            tts_voice,
            embedding_cache_dir,
            rag: Arc::new(rag),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("'{}': {}", raw, e)))
}
