//! Linguistic layer: an LLM judges whether the code does what the prompt
//! asked for.

mod ollama;
mod openrouter;
mod reasoner;
mod settings;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

pub use ollama::OllamaClient;
pub use openrouter::OpenRouterClient;
pub use reasoner::{strip_code_fences, LlmReasoner, SemanticAnalysis};
pub use settings::LlmSettings;

/// A chat model that answers a single question.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;

    fn name(&self) -> &str;

    /// Whether calling [`ask`](Self::ask) can produce a real answer.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Stand-in used when no provider is configured.
#[derive(Debug, Default, Clone)]
pub struct NoopLlmClient;

#[async_trait]
impl LlmClient for NoopLlmClient {
    async fn ask(&self, _question: &str) -> Result<String> {
        anyhow::bail!("LLM provider not configured")
    }

    fn name(&self) -> &str {
        "noop"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the client the settings describe.
///
/// OpenRouter without an API key is not an error: the layer is disabled and
/// a noop client returned.
pub fn build_client(settings: &LlmSettings) -> Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match settings.provider.as_str() {
        "openrouter" if settings.is_usable() => Arc::new(OpenRouterClient::new(settings)?),
        "openrouter" => {
            warn!("OPENROUTER_API_KEY is not set, LLM layer disabled");
            Arc::new(NoopLlmClient)
        }
        "ollama" => Arc::new(OllamaClient::new(settings)?),
        _ => Arc::new(NoopLlmClient),
    };
    info!(provider = client.name(), enabled = client.is_enabled(), "LLM client ready");
    Ok(client)
}
