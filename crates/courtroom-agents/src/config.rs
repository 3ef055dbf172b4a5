//! Court configuration: provider endpoint plus per-phase model settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `COURT_JUDGE_MODEL`)
//! 2. Values from the config file (TOML, or YAML by extension)
//! 3. Built-in defaults (OpenAI Responses API, `gpt-5-codex` / `gpt-5`)
//!
//! A missing API key is not an error: the capability is reported unavailable
//! and every phase answers with mock text.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use coordination::courtroom::Phase;
use coordination::OrchestratorConfig;
use serde::{Deserialize, Serialize};

/// Default OpenAI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Default per-request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

const ENV_API_KEY: &str = "OPENAI_API_KEY";
const ENV_BASE_URL: &str = "COURT_BASE_URL";
const ENV_OPPOSING_MODEL: &str = "COURT_OPPOSING_MODEL";
const ENV_JUDGE_MODEL: &str = "COURT_JUDGE_MODEL";
const ENV_JURY_MODEL: &str = "COURT_JURY_MODEL";

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{phase} model must not be empty")]
    EmptyModel { phase: Phase },

    #[error("{phase} max_output_tokens must be > 0")]
    ZeroTokenLimit { phase: Phase },

    #[error("timeout_secs must be > 0")]
    ZeroTimeout,

    #[error("base_url must not be empty")]
    EmptyBaseUrl,

    #[error("unsupported config format: {0} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(String),
}

/// OpenAI-compatible endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Top-level configuration for the `courtroom` binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourtConfig {
    pub provider: ProviderConfig,
    pub phases: OrchestratorConfig,
    /// Append-only JSONL sequence telemetry (disabled when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry_path: Option<PathBuf>,
}

impl CourtConfig {
    /// Defaults, then the optional file, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .context("Invalid court configuration")?;
        Ok(config)
    }

    /// Parse a TOML or YAML file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("toml")
            .to_ascii_lowercase();
        match extension.as_str() {
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Failed to parse court config TOML {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse court config YAML {}", path.display())),
            other => Err(ConfigError::UnsupportedFormat(other.to_string()).into()),
        }
    }

    /// Apply environment-style overrides from `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.provider.base_url = url;
        }
        for (phase, env) in [
            (Phase::Opposing, ENV_OPPOSING_MODEL),
            (Phase::Judge, ENV_JUDGE_MODEL),
            (Phase::Jury, ENV_JURY_MODEL),
        ] {
            if let Some(model) = get(env) {
                self.phases.for_phase_mut(phase).model = model;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        for phase in Phase::ALL {
            let settings = self.phases.for_phase(phase);
            if settings.model.trim().is_empty() {
                return Err(ConfigError::EmptyModel { phase });
            }
            if settings.max_output_tokens == Some(0) {
                return Err(ConfigError::ZeroTokenLimit { phase });
            }
        }
        Ok(())
    }
}

/// Check if an endpoint is reachable (GET `{base_url}/models`).
pub async fn check_endpoint(base_url: &str, api_key: &str) -> bool {
    let models_url = format!("{}/models", base_url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .bearer_auth(api_key)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
