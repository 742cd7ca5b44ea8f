use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use vitae_core::{Result, VitaeError};

/// What the embedding will be used for. Providers that distinguish the two
/// produce asymmetric vectors; providers that don't simply ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    Document,
    Query,
}

/// Trait for generating text embeddings of a fixed dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the text.
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>>;

    /// The dimensionality of the output embeddings.
    fn dimensions(&self) -> usize;

    /// Provider name.
    fn name(&self) -> &str;
}

/// Retry attempts before an embedding failure propagates.
const MAX_ATTEMPTS: u32 = 6;
/// Lower bound on each retry wait.
const MIN_WAIT_MS: u64 = 1000;
/// Ceiling on each retry wait.
const MAX_WAIT_MS: u64 = 60_000;

/// Retry an operation with randomized exponential waits: each wait is drawn
/// uniformly from [min, min(cap, min * 2^attempt)]. The last error
/// propagates once the attempts are exhausted.
pub(crate) async fn retry_random_exponential<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt + 1 < MAX_ATTEMPTS {
                    let cap = (MIN_WAIT_MS * 2u64.pow(attempt)).min(MAX_WAIT_MS);
                    let wait = rand::thread_rng().gen_range(MIN_WAIT_MS..=cap.max(MIN_WAIT_MS));
                    warn!(
                        attempt = attempt + 1,
                        max = MAX_ATTEMPTS,
                        wait_ms = wait,
                        error = %e,
                        "embedding attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("at least one attempt ran"))
}

/// OpenAI embeddings provider (text-embedding-3-small, text-embedding-3-large, etc.)
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedding {
    /// Create a provider with text-embedding-3-small (1536 dims).
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            model: "text-embedding-3-small".into(),
            dims: 1536,
        }
    }

    /// Use a specific model (e.g. "text-embedding-3-large" with 3072 dims).
    pub fn with_model(mut self, model: String, dims: usize) -> Self {
        self.model = model;
        self.dims = dims;
        self
    }

    /// Use a custom base URL (e.g. for Azure OpenAI).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": &self.model,
            "input": [text],
        });

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| VitaeError::Embedding(format!("embedding request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(VitaeError::Embedding(format!(
                "embedding HTTP {status}: {text}"
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VitaeError::Embedding(format!("embedding parse error: {e}")))?;

        let vector: Vec<f32> = data["data"][0]["embedding"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect()
            })
            .unwrap_or_default();

        if vector.is_empty() {
            return Err(VitaeError::Embedding("embedding response was empty".into()));
        }

        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>> {
        // The OpenAI endpoint produces symmetric embeddings; the task tag
        // only matters for logging here.
        debug!(model = %self.model, ?task, "generating embedding");
        retry_random_exponential(|| self.request(text)).await
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "openai"
    }
}
