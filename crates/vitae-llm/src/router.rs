//! Resilient routing across the provider chain.
//!
//! The router tries each enabled provider in order, skipping any whose
//! circuit is open, retrying transient faults with exponential backoff, and
//! finishing with the static degraded responder when every upstream is
//! exhausted. It never returns an error: the static responder is the
//! terminal sink.

use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use vitae_config::schema::BreakerConfig;
use vitae_core::{timed, KvStore};

use crate::breaker::CircuitBreaker;
use crate::provider::{LlmProvider, ProviderError};
use crate::static_fallback::{FallbackHit, StaticResponder, STATIC_FALLBACK_NAME};

/// Retry attempts per provider for transient errors.
const MAX_ATTEMPTS: u32 = 3;
/// Base delay for exponential backoff (doubles each retry).
const BASE_DELAY_MS: u64 = 1000;
/// Backoff ceiling.
const MAX_DELAY_MS: u64 = 4000;
/// Random jitter added on top of each backoff wait.
const JITTER_MS: u64 = 250;
/// Recent latencies kept per provider.
const LATENCY_SAMPLES: usize = 100;
/// Deadline on best-effort telemetry writes.
const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(1);

/// Request-scoped routing context.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    pub conversation_id: Option<String>,
    pub correlation_id: String,
    /// Top retrieved hits, rendered by the static responder if every
    /// provider fails.
    pub hits: Vec<FallbackHit>,
}

/// The routing outcome. Always produced, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct RouterReply {
    pub text: String,
    pub provider: String,
    pub fallback_used: bool,
    pub metadata: RouteMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteMetadata {
    /// "primary", "secondary", ... or "static".
    pub layer: String,
    pub conversation_id: Option<String>,
    pub correlation_id: String,
    /// Last provider error, present only on the static path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct RouterEntry {
    provider: Arc<dyn LlmProvider>,
    breaker: CircuitBreaker,
}

/// Orchestrates the provider chain. One instance serves all requests.
pub struct LlmRouter {
    entries: Vec<RouterEntry>,
    kv: Arc<dyn KvStore>,
    breaker_config: BreakerConfig,
}

fn layer_name(position: usize) -> String {
    match position {
        0 => "primary".to_string(),
        1 => "secondary".to_string(),
        n => format!("layer{}", n + 1),
    }
}

impl LlmRouter {
    pub fn new(kv: Arc<dyn KvStore>, breaker_config: BreakerConfig) -> Self {
        Self {
            entries: Vec::new(),
            kv,
            breaker_config,
        }
    }

    /// Register a provider at the end of the chain. Registration order is
    /// dispatch order.
    pub fn add_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        info!(provider = %name, "registered LLM provider");
        let breaker = CircuitBreaker::new(Arc::clone(&self.kv), &name, self.breaker_config.clone());
        self.entries.push(RouterEntry { provider, breaker });
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    /// Generate a response, falling through the provider chain. Guaranteed
    /// to produce text: when every provider fails, the static responder
    /// renders the request's hits (or the apology) instead.
    pub async fn generate(&self, prompt: &str, ctx: &RouteContext) -> RouterReply {
        let mut attempts: Vec<(usize, &RouterEntry)> = Vec::new();
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.breaker.can_attempt().await {
                attempts.push((position, entry));
            } else {
                info!(
                    event = "circuit_open_skip",
                    provider = %entry.provider.name(),
                    correlation_id = %ctx.correlation_id,
                    "skipping provider with open circuit"
                );
            }
        }

        let mut last_error: Option<ProviderError> = None;
        let total = attempts.len();
        for (tried, (position, entry)) in attempts.into_iter().enumerate() {
            let name = entry.provider.name().to_string();
            match self.call_with_retry(entry, prompt, ctx).await {
                Ok((text, latency_ms)) => {
                    entry.breaker.record_success().await;
                    self.record_telemetry(&name, latency_ms).await;
                    info!(
                        event = "llm_success",
                        provider = %name,
                        latency_ms,
                        correlation_id = %ctx.correlation_id,
                    );
                    return RouterReply {
                        text,
                        provider: name,
                        fallback_used: position != 0,
                        metadata: RouteMetadata {
                            layer: layer_name(position),
                            conversation_id: ctx.conversation_id.clone(),
                            correlation_id: ctx.correlation_id.clone(),
                            error: None,
                        },
                    };
                }
                Err(e) => {
                    warn!(
                        event = "llm_fallback",
                        from_provider = %name,
                        error = %e,
                        trying_next = tried + 1 < total,
                        correlation_id = %ctx.correlation_id,
                    );
                    last_error = Some(e);
                }
            }
        }

        error!(
            event = "all_llm_failed",
            last_error = last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            conversation_id = ctx.conversation_id.as_deref().unwrap_or(""),
            correlation_id = %ctx.correlation_id,
        );

        let responder = StaticResponder::new(ctx.hits.clone());
        RouterReply {
            text: responder.render(),
            provider: STATIC_FALLBACK_NAME.to_string(),
            fallback_used: true,
            metadata: RouteMetadata {
                layer: "static".to_string(),
                conversation_id: ctx.conversation_id.clone(),
                correlation_id: ctx.correlation_id.clone(),
                error: last_error.map(|e| e.to_string()),
            },
        }
    }

    /// Call one provider with exponential backoff on transient errors only.
    /// Each failed attempt is recorded against the breaker, so a provider
    /// that times out repeatedly trips its circuit at the attempt rate it
    /// actually burns.
    async fn call_with_retry(
        &self,
        entry: &RouterEntry,
        prompt: &str,
        ctx: &RouteContext,
    ) -> Result<(String, u64), ProviderError> {
        let provider = &*entry.provider;
        let mut last_err: Option<ProviderError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            let (result, latency_ms) = timed(provider.generate(prompt)).await;
            match result {
                Ok(text) => return Ok((text, latency_ms)),
                Err(e) => {
                    entry.breaker.record_failure().await;
                    warn!(
                        event = "llm_error",
                        provider = %provider.name(),
                        attempt = attempt + 1,
                        error = %e,
                        latency_ms,
                        correlation_id = %ctx.correlation_id,
                    );
                    if e.is_transient() && attempt + 1 < MAX_ATTEMPTS {
                        let backoff = (BASE_DELAY_MS * 2u64.pow(attempt)).min(MAX_DELAY_MS);
                        let jitter = rand::thread_rng().gen_range(0..JITTER_MS);
                        tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                        last_err = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_err.expect("retry loop exits early unless a transient error was stored"))
    }

    /// Best-effort request/latency telemetry. A slow or broken store never
    /// affects the response.
    async fn record_telemetry(&self, provider: &str, latency_ms: u64) {
        let requests_key = format!("llm:{provider}:requests");
        let latency_key = format!("llm:{provider}:latency_ms");
        let _ = tokio::time::timeout(TELEMETRY_TIMEOUT, self.kv.incr(&requests_key)).await;
        let _ = tokio::time::timeout(
            TELEMETRY_TIMEOUT,
            self.kv
                .push_bounded(&latency_key, &latency_ms.to_string(), LATENCY_SAMPLES),
        )
        .await;
    }
}
