//! Mock embedding provider for deterministic testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use vitae_core::{Result, VitaeError};

use crate::embedding::{EmbedTask, EmbeddingProvider};

/// Returns pre-registered vectors by exact text match, and a unit basis
/// vector for everything else. Optionally fails the first N calls to
/// exercise retry and error paths.
pub struct MockEmbedding {
    dims: usize,
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    fail_remaining: Mutex<u32>,
}

impl MockEmbedding {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: Mutex::new(HashMap::new()),
            fail_remaining: Mutex::new(0),
        }
    }

    /// Register the vector returned for an exact text.
    pub fn with_vector(self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.lock().insert(text.to_string(), vector);
        self
    }

    /// Fail the next `n` embed calls.
    pub fn failing_next(self, n: u32) -> Self {
        *self.fail_remaining.lock() = n;
        self
    }

    fn default_vector(&self) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        if self.dims > 0 {
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        {
            let mut remaining = self.fail_remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(VitaeError::Embedding("mock embedding failure".into()));
            }
        }
        Ok(self
            .vectors
            .lock()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default_vector()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "mock"
    }
}
