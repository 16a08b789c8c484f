use super::{LlmClient, LlmSettings};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// OpenAI-compatible chat completions through OpenRouter.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: Client,
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenRouterClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("OpenRouter API key must be provided via OPENROUTER_API_KEY");
        }
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));
        let http = Client::builder()
            .user_agent(concat!("codeguard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(60)))
            .build()
            .context("failed to build OpenRouter HTTP client")?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_retries: settings.max_retries,
        })
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn ask(&self, question: &str) -> Result<String> {
        let payload = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: question,
            }],
            temperature: 0.0,
        };

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(500);
        loop {
            let response = self
                .http
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err).context("failed to call OpenRouter chat completions API");
                    }
                    warn!(attempt, error = %err, "OpenRouter request failed, retrying");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(8));
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let retryable = status.is_server_error() || status.as_u16() == 429;
                if !retryable || attempt >= self.max_retries {
                    let body = response.text().await.unwrap_or_default();
                    bail!("OpenRouter API error ({}): {}", status, body);
                }
                warn!(attempt, %status, "OpenRouter returned an error status, retrying");
                sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(8));
                attempt += 1;
                continue;
            }

            let completion: ChatResponse = response
                .json()
                .await
                .context("failed to parse OpenRouter response")?;
            debug!(model = %self.model, attempts = attempt + 1, "OpenRouter completion received");
            return completion
                .choices
                .into_iter()
                .find_map(|choice| choice.message.content)
                .ok_or_else(|| anyhow!("OpenRouter response missing message content"));
        }
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn settings(url: String) -> LlmSettings {
        LlmSettings {
            provider: "openrouter".into(),
            api_key: "test-key".into(),
            endpoint: Some(url),
            model: Some("test/model".into()),
            timeout_secs: Some(5),
            max_retries: 0,
        }
    }

    #[test]
    fn test_requires_api_key() {
        let mut settings = settings("http://localhost".into());
        settings.api_key.clear();
        assert!(OpenRouterClient::new(&settings).is_err());
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn test_ask_returns_message_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#);
        });

        let client = OpenRouterClient::new(&settings(server.base_url())).unwrap();
        assert_eq!(client.ask("hi").await.unwrap(), "hello");
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn test_retries_server_errors() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(502);
        });

        let mut settings = settings(server.base_url());
        settings.max_retries = 1;
        let client = OpenRouterClient::new(&settings).unwrap();
        let err = client.ask("hi").await.unwrap_err();
        assert!(err.to_string().contains("OpenRouter API error"));
        mock.assert_hits(2);
    }
}
