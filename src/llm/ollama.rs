use super::{LlmClient, LlmSettings};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "devstral";

/// Local Ollama server, non-streaming `/api/chat`.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(120)))
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            client,
            base_url: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn ask(&self, question: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: question.to_string(),
            }],
            stream: false,
        };

        debug!(model = %self.model, "sending chat request to Ollama");
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .context("failed to call Ollama chat API")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama API error: {} - {}", status, text);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("failed to parse Ollama response")?;
        Ok(chat.message.content)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn test_ask_posts_non_streaming_chat() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/chat")
                .json_body_partial(r#"{"stream": false, "model": "coder"}"#);
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"message":{"role":"assistant","content":"{}"},"done":true}"#);
        });

        let settings = LlmSettings {
            provider: "ollama".into(),
            api_key: String::new(),
            endpoint: Some(format!("{}/", server.base_url())),
            model: Some("coder".into()),
            timeout_secs: Some(5),
            max_retries: 0,
        };
        let client = OllamaClient::new(&settings).unwrap();
        assert_eq!(client.ask("analyze").await.unwrap(), "{}");
        mock.assert();
    }
}
