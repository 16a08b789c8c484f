//! Registry checks for third-party imports.
//!
//! An import that is neither stdlib nor defined locally must come from PyPI;
//! a package PyPI has never heard of is a hallucinated dependency.

mod cache;
mod pypi;

pub use cache::RegistryCache;
pub use pypi::normalize_package_name;

use std::time::Duration;

use futures::stream::{self, StreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::detect::{BugPattern, Finding, Severity};

/// Parallel registry requests per verification.
const MAX_CONCURRENT_REQUESTS: usize = 16;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by registry")]
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageStatus {
    Exists,
    NotFound,
    /// Could not determine (unexpected status, registry disabled, ...).
    Unknown(String),
}

/// Import names whose distribution is published under another name.
static DISTRIBUTION_NAMES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "sklearn" => "scikit-learn",
    "cv2" => "opencv-python",
    "PIL" => "pillow",
    "yaml" => "pyyaml",
    "bs4" => "beautifulsoup4",
    "dateutil" => "python-dateutil",
    "dotenv" => "python-dotenv",
    "jwt" => "pyjwt",
    "serial" => "pyserial",
    "skimage" => "scikit-image",
    "attr" => "attrs",
    "Crypto" => "pycryptodome",
    "google" => "protobuf",
    "OpenSSL" => "pyopenssl",
    "magic" => "python-magic",
    "docx" => "python-docx",
};

/// PyPI distribution name for a top-level import name.
pub fn distribution_name(import: &str) -> &str {
    DISTRIBUTION_NAMES.get(import).copied().unwrap_or(import)
}

pub struct RegistryClient {
    http: reqwest::Client,
    cache: RegistryCache,
    allowlist: Option<GlobSet>,
    config: RegistryConfig,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let cache = RegistryCache::new(config.cache_ttl_hours);
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: RegistryConfig, cache: RegistryCache) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("codeguard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            cache,
            allowlist: build_allowlist(&config.allowlist),
            config,
        })
    }

    /// Whether `import` exists on PyPI, consulting the cache first.
    pub async fn check_package(&self, import: &str) -> Result<PackageStatus, RegistryError> {
        if !self.config.enabled {
            return Ok(PackageStatus::Unknown("registry disabled".to_string()));
        }

        let package = normalize_package_name(distribution_name(import));
        if let Some(cached) = self.cache.get(&package) {
            debug!(package = %package, status = ?cached, "registry cache hit");
            return Ok(cached);
        }

        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(pypi::DEFAULT_BASE_URL);
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let status = pypi::check(&self.http, base_url, &package, timeout).await;

        if let Ok(found @ (PackageStatus::Exists | PackageStatus::NotFound)) = &status {
            self.cache.set(&package, found.clone());
        }
        status
    }

    pub fn is_allowlisted(&self, import: &str) -> bool {
        self.allowlist.as_ref().is_some_and(|set| {
            set.is_match(import) || set.is_match(distribution_name(import))
        })
    }

    pub fn fail_on_timeout(&self) -> bool {
        self.config.fail_on_timeout
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.stats()
    }
}

fn build_allowlist(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "ignoring invalid allowlist glob"),
        }
    }
    builder.build().ok()
}

/// Check third-party imports against PyPI concurrently.
///
/// Unknown packages become `hallucinated_object` errors; lookups that could
/// not be answered only produce warnings when `fail_on_timeout` is set.
pub async fn verify_imports(client: &RegistryClient, imports: &[String]) -> Vec<Finding> {
    let to_check: Vec<String> = imports
        .iter()
        .filter(|import| !client.is_allowlisted(import))
        .cloned()
        .collect();
    if to_check.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<_> = stream::iter(to_check)
        .map(|import| async move {
            let status = client.check_package(&import).await;
            (import, status)
        })
        .buffer_unordered(MAX_CONCURRENT_REQUESTS)
        .collect()
        .await;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let (hits, misses) = client.cache_stats();
    debug!(hits, misses, "registry cache");

    let mut findings = Vec::new();
    for (import, status) in results {
        match status {
            Ok(PackageStatus::NotFound) => findings.push(Finding::new(
                BugPattern::HallucinatedObject,
                Severity::Error,
                0,
                format!("package `{}` does not exist on PyPI", import),
            )),
            Ok(PackageStatus::Exists) => {}
            Ok(PackageStatus::Unknown(reason)) => {
                if client.fail_on_timeout() {
                    findings.push(Finding::new(
                        BugPattern::HallucinatedObject,
                        Severity::Warning,
                        0,
                        format!("could not verify package `{}`: {}", import, reason),
                    ));
                }
            }
            Err(e) => {
                warn!(package = %import, error = %e, "registry lookup failed");
                if client.fail_on_timeout() {
                    findings.push(Finding::new(
                        BugPattern::HallucinatedObject,
                        Severity::Warning,
                        0,
                        format!("registry error checking `{}`: {}", import, e),
                    ));
                }
            }
        }
    }
    findings
}
