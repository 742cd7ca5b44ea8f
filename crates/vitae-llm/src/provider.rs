use async_trait::async_trait;
use thiserror::Error;

/// How a provider call failed. The router branches on these tags; none of
/// them ever reaches the router's caller.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network timeout, connection reset, 5xx. Worth retrying.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Quota exceeded / 429. Not retried at this layer; the router moves on.
    #[error("provider rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The provider refused the request or filtered the output.
    #[error("provider policy refusal: {0}")]
    Policy(String),

    /// Misconfiguration or invalid credential. Retrying is pointless.
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Trait implemented by each text-generation backend.
///
/// `generate` returns non-empty text on success; an empty or filtered
/// completion surfaces as [`ProviderError::Policy`]. Providers are
/// non-streaming by contract.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable identifier, unique across the process. Used in breaker keys
    /// and every log event.
    fn name(&self) -> &str;

    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}
