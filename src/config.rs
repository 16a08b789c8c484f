//! Configuration schema for codeguard.
//!
//! A `codeguard.yaml` file tunes every layer of the pipeline. Every field is
//! optional; a missing file means all defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File names searched for when no `--config` is given.
pub const CONFIG_FILE_NAMES: &[&str] = &["codeguard.yaml", ".codeguard.yaml"];

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub detectors: DetectorConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub dynamic: DynamicConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub verdict: VerdictConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            detectors: DetectorConfig::default(),
            registry: RegistryConfig::default(),
            dynamic: DynamicConfig::default(),
            llm: LlmConfig::default(),
            verdict: VerdictConfig::default(),
            api: ApiConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit file, or the first `codeguard.yaml`/`.codeguard.yaml`
    /// found in `dir`, or the defaults.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::parse_file(path);
        }
        match discover(dir) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using discovered config");
                Self::parse_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=10.0).contains(&self.verdict.bug_threshold) {
            return Err(ConfigError::Invalid(format!(
                "verdict.bug_threshold must be between 0 and 10, got {}",
                self.verdict.bug_threshold
            )));
        }
        if self.evaluation.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "evaluation.concurrency must be at least 1".to_string(),
            ));
        }
        if self.dynamic.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "dynamic.timeout_secs must be at least 1".to_string(),
            ));
        }
        for pattern in &self.registry.allowlist {
            globset::Glob::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("invalid registry.allowlist pattern {:?}: {}", pattern, e))
            })?;
        }
        if let Some(provider) = &self.llm.provider {
            if !matches!(provider.to_lowercase().as_str(), "openrouter" | "ollama" | "noop") {
                return Err(ConfigError::Invalid(format!(
                    "llm.provider must be openrouter, ollama or noop, got {:?}",
                    provider
                )));
            }
        }
        Ok(())
    }

    /// The default configuration as YAML, used by `codeguard init`.
    pub fn default_yaml() -> String {
        let body = serde_yaml::to_string(&Config::default()).unwrap_or_default();
        format!("# codeguard configuration\n{}", body)
    }
}

/// First known config file name present in `dir`.
pub fn discover(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn default_version() -> String {
    "1".to_string()
}

fn default_true() -> bool {
    true
}

/// Toggles for the static detectors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    #[serde(default = "default_true")]
    pub syntax: bool,
    #[serde(default = "default_true")]
    pub incomplete: bool,
    #[serde(default = "default_true")]
    pub hallucination: bool,
    #[serde(default = "default_true")]
    pub attributes: bool,
    #[serde(default = "default_true")]
    pub input_types: bool,
    #[serde(default = "default_true")]
    pub silly: bool,
    #[serde(default = "default_true")]
    pub corner_cases: bool,
    #[serde(default = "default_true")]
    pub prompt_bias: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            syntax: true,
            incomplete: true,
            hallucination: true,
            attributes: true,
            input_types: true,
            silly: true,
            corner_cases: true,
            prompt_bias: true,
        }
    }
}

/// Package registry verification (hallucinated third-party imports).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Request timeout in milliseconds (default: 5000)
    #[serde(default = "default_registry_timeout")]
    pub timeout_ms: u64,
    /// How long to cache registry responses in hours (default: 24)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_hours: u32,
    /// Package names or glob patterns to skip verification for
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// If true, registry timeouts become warnings; otherwise they are ignored
    #[serde(default)]
    pub fail_on_timeout: bool,
    /// Override for the PyPI JSON API root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_registry_timeout() -> u64 {
    5000
}

fn default_cache_ttl() -> u32 {
    24
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_registry_timeout(),
            cache_ttl_hours: default_cache_ttl(),
            allowlist: Vec::new(),
            fail_on_timeout: false,
            base_url: None,
        }
    }
}

/// Sandboxed execution of the code sample.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DynamicConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Try a Docker sandbox before the subprocess fallback
    #[serde(default = "default_true")]
    pub use_docker: bool,
    #[serde(default = "default_dynamic_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_docker_image")]
    pub docker_image: String,
    #[serde(default = "default_memory_limit")]
    pub memory_limit_mb: u64,
    /// CFS quota in microseconds per 100ms period (50000 = half a CPU)
    #[serde(default = "default_cpu_quota")]
    pub cpu_quota: u64,
    /// Interpreter for the subprocess fallback
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_dynamic_timeout() -> u64 {
    5
}

fn default_docker_image() -> String {
    "python:3.10-slim".to_string()
}

fn default_memory_limit() -> u64 {
    128
}

fn default_cpu_quota() -> u64 {
    50000
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_docker: true,
            timeout_secs: default_dynamic_timeout(),
            docker_image: default_docker_image(),
            memory_limit_mb: default_memory_limit(),
            cpu_quota: default_cpu_quota(),
            python: default_python(),
        }
    }
}

/// LLM reasoning layer. Environment variables override these values.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "openrouter" (default), "ollama" or "noop"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// Fusion of layer signals into a verdict.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerdictConfig {
    /// Severity score at or above which a sample is labelled a bug
    #[serde(default = "default_bug_threshold")]
    pub bug_threshold: f64,
}

fn default_bug_threshold() -> f64 {
    4.0
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            bug_threshold: default_bug_threshold(),
        }
    }
}

/// Remote analysis endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    /// Retries for transient upstream failures (502/503/504, timeouts)
    #[serde(default)]
    pub max_retries: u32,
}

fn default_endpoint() -> String {
    "http://localhost:8000/api/analyze".to_string()
}

fn default_api_timeout() -> u64 {
    120
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_api_timeout(),
            max_retries: 0,
        }
    }
}

/// Test-set evaluation runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_test_sets_dir")]
    pub test_sets_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_test_sets_dir() -> PathBuf {
    PathBuf::from("test_sets")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_concurrency() -> usize {
    1
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_sets_dir: default_test_sets_dir(),
            results_dir: default_results_dir(),
            concurrency: default_concurrency(),
        }
    }
}
