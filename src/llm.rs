//! Language-model backends used by the LLM-assisted trace strategy.

use crate::Result;
use crate::config::LlmSettings;
use async_trait::async_trait;
use std::sync::Arc;

/// A text completion backend.
///
/// Backends are shared as `Arc<dyn LlmBackend>` and called sequentially, one
/// prompt per simulation.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Display name for logs
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the configured backend, if any.
///
/// Returns `None` when no LLM settings are present or the crate was built
/// without the `llm` feature.
pub fn backend_from_settings(settings: Option<&LlmSettings>) -> Result<Option<Arc<dyn LlmBackend>>> {
    let Some(settings) = settings else {
        return Ok(None);
    };
    #[cfg(feature = "llm")]
    {
        let backend = OpenAiCompatibleBackend::new(settings.clone())?;
        Ok(Some(Arc::new(backend)))
    }
    #[cfg(not(feature = "llm"))]
    {
        tracing::warn!(
            "LLM endpoint {} configured but documcp was built without the `llm` feature; using static tracing",
            settings.base_url
        );
        Ok(None)
    }
}

#[cfg(feature = "llm")]
pub use openai::OpenAiCompatibleBackend;

#[cfg(feature = "llm")]
mod openai {
    use super::LlmBackend;
    use crate::config::LlmSettings;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use reqwest::Client;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tracing::debug;

    #[derive(Debug, Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: Vec<ChatMessage<'a>>,
        temperature: f32,
    }

    #[derive(Debug, Serialize)]
    struct ChatMessage<'a> {
        role: &'a str,
        content: &'a str,
    }

    #[derive(Debug, Deserialize)]
    struct ChatResponse {
        choices: Vec<ChatChoice>,
    }

    #[derive(Debug, Deserialize)]
    struct ChatChoice {
        message: ChatContent,
    }

    #[derive(Debug, Deserialize)]
    struct ChatContent {
        content: Option<String>,
    }

    const SYSTEM_PROMPT: &str = "You trace code examples without running them. \
        Answer with a single JSON object and nothing else.";

    /// Chat-completions client for OpenAI-compatible endpoints (OpenAI, LM Studio, Ollama)
    pub struct OpenAiCompatibleBackend {
        settings: LlmSettings,
        client: Client,
    }

    impl OpenAiCompatibleBackend {
        pub fn new(settings: LlmSettings) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(settings.timeout_secs))
                .build()
                .map_err(|e| Error::Llm(format!("failed to create HTTP client: {}", e)))?;
            Ok(Self { settings, client })
        }
    }

    #[async_trait]
    impl LlmBackend for OpenAiCompatibleBackend {
        fn name(&self) -> &str {
            &self.settings.model
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            let request = ChatRequest {
                model: &self.settings.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    ChatMessage {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.0,
            };
            let url = format!(
                "{}/chat/completions",
                self.settings.base_url.trim_end_matches('/')
            );
            let mut builder = self.client.post(&url).json(&request);
            if let Some(api_key) = &self.settings.api_key {
                builder = builder.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = builder
                .send()
                .await
                .map_err(|e| Error::Llm(format!("request to {} failed: {}", url, e)))?;
            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(Error::Llm(format!("API error ({}): {}", status, body)));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| Error::Llm(format!("unreadable chat response: {}", e)))?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| Error::Llm("no choices in response".to_string()))?;
            debug!("{} answered with {} bytes", self.settings.model, content.len());
            Ok(content)
        }
    }
}
