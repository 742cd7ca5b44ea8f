//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured outcomes without making any HTTP calls and counts
//! how often it was invoked.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::provider::{LlmProvider, ProviderError};

/// A mock provider that plays back queued outcomes, then repeats a default.
///
/// # Example
/// ```
/// use vitae_llm::mock::MockProvider;
/// let provider = MockProvider::new("test").with_response("Hello, world!");
/// ```
pub struct MockProvider {
    name: String,
    script: Mutex<Vec<Result<String, ProviderError>>>,
    /// Played when the script runs dry. Defaults to a placeholder response.
    default_outcome: Result<String, ProviderError>,
    calls: Arc<AtomicU32>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(Vec::new()),
            default_outcome: Ok("(mock: no more queued responses)".to_string()),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Queue a successful text response.
    pub fn with_response(self, text: &str) -> Self {
        self.script.lock().push(Ok(text.to_string()));
        self
    }

    /// Queue a single error outcome.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.script.lock().push(Err(error));
        self
    }

    /// Fail every call with a transient error.
    pub fn always_transient(mut self, msg: &str) -> Self {
        self.default_outcome = Err(ProviderError::Transient(msg.to_string()));
        self
    }

    /// Fail every call with a rate-limit error.
    pub fn always_rate_limited(mut self) -> Self {
        self.default_outcome = Err(ProviderError::RateLimited {
            retry_after_secs: Some(60),
        });
        self
    }

    /// Fail every call with a policy refusal.
    pub fn always_policy(mut self, msg: &str) -> Self {
        self.default_outcome = Err(ProviderError::Policy(msg.to_string()));
        self
    }

    /// Fail every call with a fatal error.
    pub fn always_fatal(mut self, msg: &str) -> Self {
        self.default_outcome = Err(ProviderError::Fatal(msg.to_string()));
        self
    }

    /// Succeed every call with the same text.
    pub fn always_ok(mut self, text: &str) -> Self {
        self.default_outcome = Ok(text.to_string());
        self
    }

    /// How many times `generate` ran.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared handle to the call counter, usable after the provider has been
    /// moved behind an `Arc<dyn LlmProvider>`.
    pub fn calls_handle(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        if script.is_empty() {
            self.default_outcome.clone()
        } else {
            script.remove(0)
        }
    }
}
