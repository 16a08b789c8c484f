//! Client for a remote `POST /api/analyze` endpoint.
//!
//! Deployed services disagree on field names, so the response is read
//! leniently and normalized into a [`RemoteVerdict`].

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::verdict::Label;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("request rejected {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Failures of the service rather than of the sample. These are excluded
    /// from accuracy.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout(_) => true,
            ApiError::Upstream { status, .. } => matches!(status, 502..=504),
            ApiError::Network(e) => e.is_connect() || e.is_timeout(),
            ApiError::Rejected { .. } | ApiError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiRequest<'a> {
    pub code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'a str>,
    pub language: &'static str,
}

impl<'a> ApiRequest<'a> {
    pub fn new(code: &'a str, prompt: Option<&'a str>) -> Self {
        Self {
            code,
            prompt,
            language: "python",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedBug {
    #[serde(rename = "type")]
    pub pattern: String,
    #[serde(default)]
    pub description: String,
}

/// Normalized answer of the remote service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteVerdict {
    pub label: Label,
    pub severity_score: f64,
    pub bugs: Vec<ReportedBug>,
    #[serde(skip)]
    pub latency: Duration,
}

pub struct ApiClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder()
            .user_agent(concat!("codeguard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(ApiError::Network)?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            timeout,
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn analyze(&self, request: &ApiRequest<'_>) -> Result<RemoteVerdict, ApiError> {
        let mut attempt = 0u32;
        let mut backoff = Duration::from_secs(1);
        loop {
            let started = Instant::now();
            match self.send(request).await {
                Ok(mut verdict) => {
                    verdict.latency = started.elapsed();
                    return Ok(verdict);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!(attempt, error = %e, "transient API failure, retrying");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(16));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, request: &ApiRequest<'_>) -> Result<RemoteVerdict, ApiError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify_error(e))?;
        debug!(%status, bytes = body.len(), "API response received");

        if status.is_server_error() {
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        parse_response(&value)
    }

    fn classify_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Network(e)
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Read a response body in any of the known shapes.
pub fn parse_response(value: &Value) -> Result<RemoteVerdict, ApiError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ApiError::Decode("response is not a JSON object".into()))?;

    let bugs: Vec<ReportedBug> = ["bug_patterns", "bugs_found"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
        .map(|items| items.iter().filter_map(parse_bug).collect())
        .unwrap_or_default();

    let explicit = ["verdict", "prediction"]
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find_map(Label::parse);
    let flagged = ["has_bugs", "has_bug"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_bool))
        .map(|b| if b { Label::Bug } else { Label::Clean });

    let label = explicit.or(flagged).unwrap_or(if bugs.is_empty() {
        Label::Clean
    } else {
        Label::Bug
    });

    let severity_score = ["severity_score", "overall_severity"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_f64))
        .unwrap_or(0.0);

    Ok(RemoteVerdict {
        label,
        severity_score,
        bugs,
        latency: Duration::ZERO,
    })
}

fn parse_bug(item: &Value) -> Option<ReportedBug> {
    if let Some(name) = item.as_str() {
        return Some(ReportedBug {
            pattern: name.to_string(),
            description: String::new(),
        });
    }
    let obj = item.as_object()?;
    Some(ReportedBug {
        pattern: first_str(obj, &["pattern_name", "type", "pattern"])?,
        description: first_str(obj, &["description", "message"]).unwrap_or_default(),
    })
}

fn first_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
