use crate::config::Config;
use crate::providers::OpenAIProvider;
use crate::traits::Provider;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// The OpenAI-compatible backends the demos talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Groq,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::OpenAi, Self::Groq, Self::OpenRouter];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn api_key_env_vars(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY", "AGENTRY_OPENAI_API_KEY"],
            Self::Groq => &["GROQ_API_KEY", "AGENTRY_GROQ_API_KEY"],
            Self::OpenRouter => &["OPENROUTER_API_KEY", "AGENTRY_OPENROUTER_API_KEY"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(anyhow!(
                "Unknown provider: {}. Available: openai, groq, openrouter",
                other
            )),
        }
    }
}

pub fn create_provider(kind: ProviderKind, config: &Config) -> Result<Arc<dyn Provider>> {
    let api_key = resolve_api_key_with_fallback(kind.api_key_env_vars(), &config.api_key)
        .map_err(|_| {
            anyhow!(
                "No API key found for {}. Set {} or add api_key to the config file",
                kind,
                kind.api_key_env_vars()[0]
            )
        })?;

    let mut provider = OpenAIProvider::new(api_key)
        .with_base_url(
            config
                .base_url
                .clone()
                .unwrap_or_else(|| kind.default_base_url().to_string()),
        )
        .with_timeout(Duration::from_secs(config.request_timeout_secs));

    if kind == ProviderKind::OpenRouter {
        provider = provider
            .with_header("HTTP-Referer", "https://github.com/agentry/agentry")
            .with_header("X-Title", "Agentry");
    }

    tracing::info!(provider = %kind, base_url = provider.base_url(), "Provider created");
    Ok(Arc::new(provider))
}

fn resolve_api_key_with_fallback(env_vars: &[&str], config_key: &str) -> Result<String> {
    for var_name in env_vars {
        if let Ok(key) = resolve_api_key_from_env(var_name) {
            return Ok(key);
        }
    }
    if !config_key.is_empty() {
        Ok(config_key.to_string())
    } else {
        Err(anyhow!("No API key found"))
    }
}

fn resolve_api_key_from_env(var_name: &str) -> Result<String> {
    std::env::var(var_name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("Environment variable {} not set", var_name))
}
