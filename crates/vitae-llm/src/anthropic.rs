use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::provider::{LlmProvider, ProviderError};

/// Anthropic Claude API provider (primary).
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: "https://api.anthropic.com/v1".into(),
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
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": &self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        debug!(model = %self.model, "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
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
            error!(provider = "anthropic", status = %status, error = %text, "llm_error");
            return Err(classify_status(status.as_u16(), retry_after, &text));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("response parse error: {e}")))?;

        if data["stop_reason"] == "refusal" {
            return Err(ProviderError::Policy("completion refused".into()));
        }

        let text = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| {
                        if b["type"] == "text" {
                            b["text"].as_str().map(str::to_string)
                        } else {
                            None
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::Policy("empty completion".into()));
        }

        Ok(text)
    }
}

/// Map a transport-level failure onto the taxonomy.
pub(crate) fn classify_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::Transient(e.to_string())
    } else if e.is_builder() {
        ProviderError::Fatal(e.to_string())
    } else {
        ProviderError::Transient(e.to_string())
    }
}

/// Map an HTTP status onto the taxonomy.
pub(crate) fn classify_status(
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after_secs },
        401 | 403 => ProviderError::Fatal(format!("HTTP {status}: invalid credential")),
        500..=599 => ProviderError::Transient(format!("HTTP {status}: {body}")),
        _ => ProviderError::Fatal(format!("HTTP {status}: {body}")),
    }
}
