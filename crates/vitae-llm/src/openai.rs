use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::anthropic::{classify_reqwest_error, classify_status};
use crate::provider::{LlmProvider, ProviderError};

/// OpenAI-compatible chat provider (secondary). Works against OpenAI, Azure,
/// or any server speaking the same protocol via `with_base_url`.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            model,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": &self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": "You are a helpful, professional assistant. Answer clearly and concisely."},
                {"role": "user", "content": prompt},
            ],
        });

        debug!(model = %self.model, "sending OpenAI API request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = resp.text().await.unwrap_or_default();
            error!(provider = "openai", status = %status, error = %text, "llm_error");
            return Err(classify_status(status.as_u16(), retry_after, &text));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("response parse error: {e}")))?;

        let choice = &data["choices"][0];
        if choice["finish_reason"] == "content_filter" {
            return Err(ProviderError::Policy("completion filtered".into()));
        }

        let text = choice["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if text.is_empty() {
            return Err(ProviderError::Policy("empty completion".into()));
        }

        Ok(text)
    }
}
