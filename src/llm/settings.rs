use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::config::LlmConfig;

/// Resolved LLM client configuration: the config file's `llm` section with
/// environment variables layered on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    /// `openrouter`, `ollama` or `noop`.
    pub provider: String,
    /// Empty for providers that do not authenticate.
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

impl LlmSettings {
    const PROVIDER_ENV: &'static str = "CODEGUARD_LLM_PROVIDER";
    const API_KEY_ENV: &'static str = "OPENROUTER_API_KEY";
    const ENDPOINT_ENV: &'static str = "CODEGUARD_LLM_ENDPOINT";
    const OLLAMA_URL_ENV: &'static str = "OLLAMA_BASE_URL";
    const MODEL_ENV: &'static str = "CODEGUARD_LLM_MODEL";
    const TIMEOUT_ENV: &'static str = "CODEGUARD_LLM_TIMEOUT_SECS";
    const RETRIES_ENV: &'static str = "CODEGUARD_LLM_MAX_RETRIES";

    pub const PROVIDERS: &'static [&'static str] = &["openrouter", "ollama", "noop"];

    /// Load settings from environment variables only.
    ///
    /// * `CODEGUARD_LLM_PROVIDER`: provider identifier (default: `openrouter`).
    /// * `OPENROUTER_API_KEY`: bearer token for OpenRouter.
    /// * `CODEGUARD_LLM_ENDPOINT` / `OLLAMA_BASE_URL`: custom base URL.
    pub fn from_env() -> Result<Self> {
        Self::resolve(&LlmConfig::default())
    }

    /// Layer the environment over a config file section.
    pub fn resolve(config: &LlmConfig) -> Result<Self> {
        Self::from_map(config, std::env::vars().collect())
    }

    fn from_map(config: &LlmConfig, vars: HashMap<String, String>) -> Result<Self> {
        let var = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider = var(Self::PROVIDER_ENV)
            .or_else(|| config.provider.clone())
            .unwrap_or_else(|| "openrouter".to_string())
            .to_lowercase();
        if !Self::PROVIDERS.contains(&provider.as_str()) {
            bail!(
                "unknown LLM provider '{}' (expected one of: {})",
                provider,
                Self::PROVIDERS.join(", ")
            );
        }

        let api_key = match provider.as_str() {
            "openrouter" => var(Self::API_KEY_ENV).unwrap_or_default(),
            _ => String::new(),
        };
        let endpoint = var(Self::ENDPOINT_ENV)
            .or_else(|| {
                (provider == "ollama")
                    .then(|| var(Self::OLLAMA_URL_ENV))
                    .flatten()
            })
            .or_else(|| config.endpoint.clone());
        let model = var(Self::MODEL_ENV).or_else(|| config.model.clone());
        let timeout_secs = var(Self::TIMEOUT_ENV)
            .and_then(|v| v.parse::<u64>().ok())
            .or(config.timeout_secs);
        let max_retries = var(Self::RETRIES_ENV)
            .and_then(|v| v.parse::<u32>().ok())
            .or(config.max_retries)
            .unwrap_or(2);

        Ok(Self {
            provider,
            api_key,
            endpoint,
            model,
            timeout_secs,
            max_retries,
        })
    }

    /// Whether the settings describe a client that can actually be called.
    pub fn is_usable(&self) -> bool {
        match self.provider.as_str() {
            "openrouter" => !self.api_key.is_empty(),
            "ollama" => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn with_env_lock<F: FnOnce()>(func: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        func();
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_to_openrouter_without_key() {
        let settings = LlmSettings::from_map(&LlmConfig::default(), HashMap::new()).unwrap();
        assert_eq!(settings.provider, "openrouter");
        assert!(settings.api_key.is_empty());
        assert_eq!(settings.max_retries, 2);
        assert!(!settings.is_usable());
    }

    #[test]
    fn test_env_overrides_config() {
        let config = LlmConfig {
            enabled: true,
            provider: Some("ollama".into()),
            model: Some("from-config".into()),
            endpoint: Some("http://config:11434".into()),
            timeout_secs: Some(10),
            max_retries: Some(1),
        };
        let settings = LlmSettings::from_map(
            &config,
            vars(&[
                (LlmSettings::MODEL_ENV, "from-env"),
                (LlmSettings::OLLAMA_URL_ENV, "http://env:11434"),
                (LlmSettings::RETRIES_ENV, "4"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.provider, "ollama");
        assert_eq!(settings.model.as_deref(), Some("from-env"));
        assert_eq!(settings.endpoint.as_deref(), Some("http://env:11434"));
        assert_eq!(settings.timeout_secs, Some(10));
        assert_eq!(settings.max_retries, 4);
        assert!(settings.is_usable());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = LlmSettings::from_map(
            &LlmConfig::default(),
            vars(&[(LlmSettings::PROVIDER_ENV, "azure")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown LLM provider"));
    }

    #[test]
    fn test_reads_process_environment() {
        with_env_lock(|| {
            env::set_var(LlmSettings::PROVIDER_ENV, "OpenRouter");
            env::set_var(LlmSettings::API_KEY_ENV, "secret");
            env::set_var(LlmSettings::TIMEOUT_ENV, "45");
            let settings = LlmSettings::from_env().expect("should load settings");
            assert_eq!(settings.provider, "openrouter");
            assert_eq!(settings.api_key, "secret");
            assert_eq!(settings.timeout_secs, Some(45));
            assert!(settings.is_usable());
            env::remove_var(LlmSettings::PROVIDER_ENV);
            env::remove_var(LlmSettings::API_KEY_ENV);
            env::remove_var(LlmSettings::TIMEOUT_ENV);
        });
    }
}
