use crate::agent::{DEFAULT_MAX_ITERATIONS, RetryPolicy};
use crate::providers::ProviderKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const AGENTRY_DIR: &str = ".agentry";

pub const OPENAI_GPT35_MODEL: &str = "gpt-3.5-turbo";
pub const OPENAI_GPT4_MODEL: &str = "gpt-4";
pub const GROQ_MIXTRAL_MODEL: &str = "mixtral-8x7b-32768";
pub const GROQ_LLAMA2_MODEL: &str = "llama2-70b-4096";
pub const OPENROUTER_MIXTRAL_MODEL: &str = "mistralai/mixtral-8x7b-instruct";

pub const FACTUAL_TEMPERATURE: f64 = 0.0;
pub const CREATIVE_TEMPERATURE: f64 = 0.8;

/// Backend, model and sampling temperature a demo falls back to when nothing
/// else is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f64,
}

impl ModelSettings {
    pub fn new(provider: ProviderKind, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub api_key: String,
    pub base_url: Option<String>,
    /// `0` disables the guard.
    pub max_iterations: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Describe the `<tool_call>` text format in the system prompt, for
    /// backends without native function calling.
    pub text_tool_protocol: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: None,
            model: None,
            temperature: None,
            api_key: String::new(),
            base_url: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_retries: 0,
            retry_base_delay_ms: 500,
            request_timeout_secs: 120,
            text_tool_protocol: false,
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let mut config = if config_exists() {
            load_config()?
        } else {
            Config::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `AGENTRY_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("AGENTRY_PROVIDER") {
            self.provider = Some(provider.parse()?);
        }
        if let Some(model) = get("AGENTRY_MODEL") {
            self.model = Some(model);
        }
        if let Some(temperature) = get("AGENTRY_TEMPERATURE") {
            self.temperature = Some(
                temperature
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid AGENTRY_TEMPERATURE: {}", temperature))?,
            );
        }
        if let Some(base_url) = get("AGENTRY_BASE_URL") {
            self.base_url = Some(base_url);
        }
        if let Some(max) = get("AGENTRY_MAX_ITERATIONS") {
            self.max_iterations = max
                .trim()
                .parse()
                .with_context(|| format!("Invalid AGENTRY_MAX_ITERATIONS: {}", max))?;
        }
        if let Some(enabled) = get("AGENTRY_TEXT_TOOL_PROTOCOL") {
            self.text_tool_protocol = enabled
                .trim()
                .parse()
                .with_context(|| format!("Invalid AGENTRY_TEXT_TOOL_PROTOCOL: {}", enabled))?;
        }

        Ok(())
    }

    /// Layers the configured values over a demo's preset.
    pub fn resolve(&self, preset: &ModelSettings) -> ModelSettings {
        ModelSettings {
            provider: self.provider.unwrap_or(preset.provider),
            model: self.model.clone().unwrap_or_else(|| preset.model.clone()),
            temperature: self.temperature.unwrap_or(preset.temperature),
        }
    }

    pub fn max_iterations(&self) -> Option<usize> {
        (self.max_iterations > 0).then_some(self.max_iterations)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

pub fn get_agentry_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(AGENTRY_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_agentry_dir().join("config.toml")
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!(
                "Config file not found. Run 'agentry onboard' to set up your configuration."
            )
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
        }
    })?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))
}

pub fn save_config(config: &Config) -> Result<PathBuf> {
    let config_path = get_config_path();
    save_config_to(config, &config_path)?;
    Ok(config_path)
}

pub fn save_config_to(config: &Config, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create config directory at {}", parent.display())
        })?;
    }

    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}
