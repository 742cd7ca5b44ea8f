//! # vitae-llm
//!
//! The resilient LLM routing plane: provider adapters over external
//! backends, a shared-store circuit breaker per provider, and a router that
//! chains them with retry, telemetry, and a static degraded responder so a
//! usable answer comes back on every request.

pub mod anthropic;
pub mod breaker;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod router;
pub mod static_fallback;

pub use breaker::{CircuitBreaker, CircuitState};
pub use mock::MockProvider;
pub use provider::{LlmProvider, ProviderError};
pub use router::{LlmRouter, RouteContext, RouterReply};
pub use static_fallback::{FallbackHit, StaticResponder, STATIC_FALLBACK_NAME};
