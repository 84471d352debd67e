//! Configuration system for papersum.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/papersum/config.toml` and/or `.papersum/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the summarization pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub rate_limit: RateLimitConfig,
    pub synthesis: SynthesisConfig,
    pub runner: RunnerConfig,
    pub document: DocumentConfig,
    pub store: StoreConfig,
}

/// Configuration for the generative-text provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only "gemini" is wired up.
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.5-flash-lite").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash-lite".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 2048,
            temperature: 0.4,
            timeout_secs: 120,
        }
    }
}

/// Admission budget for the generative-text service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per rolling 60-second window (0 = unlimited).
    pub requests_per_minute: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Gemini free tier.
        Self {
            requests_per_minute: 15,
        }
    }
}

/// Retry and prompt-budget settings for the response synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Excerpt characters kept when building the prompt.
    pub excerpt_max_chars: usize,
    /// Base backoff after a transport failure, doubled per attempt.
    pub transport_backoff_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            excerpt_max_chars: 8000,
            transport_backoff_ms: 1000,
        }
    }
}

/// Batch loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Work items pulled per batch.
    pub batch_size: usize,
    /// Minimum wall-clock spacing between batch starts, in seconds.
    pub batch_interval_secs: u64,
    /// Optional cap on the number of batches in continuous mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batches: Option<usize>,
}

impl RunnerConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_interval_secs: 60,
            max_batches: None,
        }
    }
}

/// Document excerpt settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Characters of extracted text kept per document.
    pub max_chars: usize,
    /// Download timeout in seconds.
    pub timeout_secs: u64,
    /// Largest document body accepted, in bytes.
    pub max_bytes: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_chars: 8000,
            timeout_secs: 60,
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Location of the SQLite store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/papers.sqlite"),
        }
    }
}

/// Load configuration from the layered figment stack.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `PAPERSUM_`, nested with `__`)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.papersum/config.toml`)
/// 4. User config (`~/.config/papersum/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".papersum").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // PAPERSUM_LLM__MODEL, PAPERSUM_RUNNER__BATCH_SIZE, etc.
    figment = figment.merge(Env::prefixed("PAPERSUM_").split("__"));

    figment.extract().map_err(Box::new)
}

/// Path of the user-level config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "papersum", "papersum")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
