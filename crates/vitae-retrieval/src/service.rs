use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use vitae_core::{Result, VitaeError};

use crate::embedding::{EmbedTask, EmbeddingProvider};
use crate::repository::{SearchHit, VectorRepository};

/// High-level retrieval operations: embed + persist, embed + search, delete.
///
/// Both collaborators are injected; tests substitute a deterministic
/// embedding provider.
pub struct RetrievalService {
    provider: Arc<dyn EmbeddingProvider>,
    repository: Arc<VectorRepository>,
    /// Cumulative deadline for one embedding call, retries included.
    embed_timeout: Duration,
}

impl RetrievalService {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        repository: Arc<VectorRepository>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            repository,
            embed_timeout,
        }
    }

    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>> {
        tokio::time::timeout(self.embed_timeout, self.provider.embed(text, task))
            .await
            .map_err(|_| VitaeError::Embedding("embedding deadline exceeded".into()))?
    }

    /// Embed a document and persist it. Returns the stored id.
    pub async fn ingest(&self, content: &str, metadata: serde_json::Value) -> Result<i64> {
        let vector = self.embed(content, EmbedTask::Document).await?;
        let id = self.repository.save(content, &vector, &metadata)?;
        info!(id, chars = content.len(), "document ingested");
        Ok(id)
    }

    /// Embed a query and return ranked neighbors above the threshold.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.embed(query, EmbedTask::Query).await?;
        self.repository.find_similar(&vector, limit, threshold)
    }

    /// Delete a stored embedding. Idempotent.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        self.repository.delete(id)
    }

    pub fn repository(&self) -> &Arc<VectorRepository> {
        &self.repository
    }
}
