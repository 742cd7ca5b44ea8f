//! Per-provider circuit breaker backed by the shared key-value store.
//!
//! Tracks provider health across workers:
//! - CLOSED: normal operation
//! - OPEN: provider failing, reject dispatch until the cooldown elapses
//! - HALF_OPEN: allow a probe request to test recovery
//!
//! Store keys:
//! - `llm:{provider}:failures` - windowed failure counter (TTL = failure window)
//! - `llm:{provider}:circuit_state` - current state (TTL 10 min)
//! - `llm:{provider}:opened_at` - unix timestamp the circuit opened (TTL 10 min)
//!
//! Every operation is best-effort. If the store is slow or unreachable the
//! breaker fails open: requests keep flowing and the router stays available.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use vitae_config::schema::BreakerConfig;
use vitae_core::KvStore;

/// TTL on the state and opened-at keys, so a silent provider cannot leave a
/// stale OPEN circuit behind forever.
const STATE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CLOSED" => Some(Self::Closed),
            "OPEN" => Some(Self::Open),
            "HALF_OPEN" => Some(Self::HalfOpen),
            _ => None,
        }
    }
}

/// Circuit breaker for one provider.
#[derive(Clone)]
pub struct CircuitBreaker {
    kv: Arc<dyn KvStore>,
    provider: String,
    config: BreakerConfig,
    failure_key: String,
    state_key: String,
    opened_key: String,
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl CircuitBreaker {
    pub fn new(kv: Arc<dyn KvStore>, provider: &str, config: BreakerConfig) -> Self {
        Self {
            kv,
            provider: provider.to_string(),
            failure_key: format!("llm:{provider}:failures"),
            state_key: format!("llm:{provider}:circuit_state"),
            opened_key: format!("llm:{provider}:opened_at"),
            config,
        }
    }

    fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.config.store_timeout_ms)
    }

    /// Bounded store read. Timeouts and errors read as absent.
    async fn kv_get(&self, key: &str) -> Option<String> {
        match tokio::time::timeout(self.store_timeout(), self.kv.get(key)).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                warn!(provider = %self.provider, error = %e, "breaker store read failed, failing open");
                None
            }
            Err(_) => {
                warn!(provider = %self.provider, "breaker store read timed out, failing open");
                None
            }
        }
    }

    /// Bounded store write. Failures are logged and swallowed.
    async fn kv_set(&self, key: &str, value: &str, ttl: Duration) {
        match tokio::time::timeout(self.store_timeout(), self.kv.set(key, value, Some(ttl))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(provider = %self.provider, error = %e, "breaker store write failed"),
            Err(_) => warn!(provider = %self.provider, "breaker store write timed out"),
        }
    }

    async fn set_state(&self, state: CircuitState) {
        self.kv_set(&self.state_key, state.as_str(), STATE_TTL).await;
        if state == CircuitState::Open {
            self.kv_set(&self.opened_key, &now_unix().to_string(), STATE_TTL)
                .await;
        }
    }

    /// Current circuit state. Lazily transitions OPEN to HALF_OPEN once the
    /// cooldown has elapsed. Store failure reads as CLOSED.
    pub async fn get_state(&self) -> CircuitState {
        let Some(raw) = self.kv_get(&self.state_key).await else {
            return CircuitState::Closed;
        };
        let state = CircuitState::parse(&raw).unwrap_or(CircuitState::Closed);

        if state == CircuitState::Open {
            if let Some(opened_at) = self
                .kv_get(&self.opened_key)
                .await
                .and_then(|v| v.parse::<f64>().ok())
            {
                if now_unix() - opened_at >= self.config.open_duration_secs as f64 {
                    self.set_state(CircuitState::HalfOpen).await;
                    return CircuitState::HalfOpen;
                }
            }
        }

        state
    }

    /// Whether the provider may be dispatched to right now.
    pub async fn can_attempt(&self) -> bool {
        matches!(
            self.get_state().await,
            CircuitState::Closed | CircuitState::HalfOpen
        )
    }

    /// Record a successful call: reset the failure window, and close the
    /// circuit if this was the half-open probe.
    pub async fn record_success(&self) {
        let state = self.get_state().await;

        if let Ok(Err(e)) =
            tokio::time::timeout(self.store_timeout(), self.kv.delete(&self.failure_key)).await
        {
            warn!(provider = %self.provider, error = %e, "breaker failure reset failed");
        }

        if state == CircuitState::HalfOpen {
            self.set_state(CircuitState::Closed).await;
            info!(event = "circuit_closed", provider = %self.provider, "provider recovered");
        }
    }

    /// Record a failed call, tripping the circuit once the windowed counter
    /// reaches the threshold. A half-open probe failure reopens immediately.
    pub async fn record_failure(&self) {
        if self.get_state().await == CircuitState::HalfOpen {
            self.set_state(CircuitState::Open).await;
            warn!(event = "circuit_opened", provider = %self.provider, "half-open probe failed");
            return;
        }

        let failures =
            match tokio::time::timeout(self.store_timeout(), self.kv.incr(&self.failure_key)).await
            {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    warn!(provider = %self.provider, error = %e, "breaker failure count failed");
                    return;
                }
                Err(_) => {
                    warn!(provider = %self.provider, "breaker failure count timed out");
                    return;
                }
            };

        let window = Duration::from_secs(self.config.failure_window_secs);
        if let Ok(Err(e)) =
            tokio::time::timeout(self.store_timeout(), self.kv.expire(&self.failure_key, window))
                .await
        {
            warn!(provider = %self.provider, error = %e, "breaker window refresh failed");
        }

        if failures >= self.config.failure_threshold as i64 {
            self.set_state(CircuitState::Open).await;
            warn!(
                event = "circuit_opened",
                provider = %self.provider,
                failures,
                "circuit opened after repeated failures"
            );
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vitae_core::{MemoryKv, VitaeError};

    fn breaker(kv: Arc<dyn KvStore>) -> CircuitBreaker {
        CircuitBreaker::new(kv, "test_provider", BreakerConfig::default())
    }

    #[tokio::test]
    async fn test_initial_state_is_closed() {
        let b = breaker(Arc::new(MemoryKv::new()));
        assert_eq!(b.get_state().await, CircuitState::Closed);
        assert!(b.can_attempt().await);
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold_failures() {
        let b = breaker(Arc::new(MemoryKv::new()));
        for _ in 0..4 {
            b.record_failure().await;
            assert!(b.can_attempt().await);
        }
        b.record_failure().await;
        assert_eq!(b.get_state().await, CircuitState::Open);
        assert!(!b.can_attempt().await);
    }

    #[tokio::test]
    async fn test_open_transitions_to_half_open_after_cooldown() {
        let kv = Arc::new(MemoryKv::new());
        let b = breaker(kv.clone());

        // Preset an OPEN circuit whose cooldown has already elapsed.
        kv.set("llm:test_provider:circuit_state", "OPEN", None)
            .await
            .unwrap();
        kv.set(
            "llm:test_provider:opened_at",
            &(now_unix() - 121.0).to_string(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(b.get_state().await, CircuitState::HalfOpen);
        assert!(b.can_attempt().await);
    }

    #[tokio::test]
    async fn test_open_rejects_before_cooldown() {
        let kv = Arc::new(MemoryKv::new());
        let b = breaker(kv.clone());

        kv.set("llm:test_provider:circuit_state", "OPEN", None)
            .await
            .unwrap();
        kv.set(
            "llm:test_provider:opened_at",
            &now_unix().to_string(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(b.get_state().await, CircuitState::Open);
        assert!(!b.can_attempt().await);
    }

    #[tokio::test]
    async fn test_success_in_half_open_closes_circuit() {
        let kv = Arc::new(MemoryKv::new());
        let b = breaker(kv.clone());

        kv.set("llm:test_provider:circuit_state", "HALF_OPEN", None)
            .await
            .unwrap();
        b.record_success().await;
        assert_eq!(b.get_state().await, CircuitState::Closed);
        // Failure window was reset along the way
        assert_eq!(kv.get("llm:test_provider:failures").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_in_half_open_reopens_circuit() {
        let kv = Arc::new(MemoryKv::new());
        let b = breaker(kv.clone());

        kv.set("llm:test_provider:circuit_state", "HALF_OPEN", None)
            .await
            .unwrap();
        b.record_failure().await;
        assert_eq!(b.get_state().await, CircuitState::Open);
        assert!(!b.can_attempt().await);
    }

    /// A store that fails every operation, simulating an unreachable backend.
    struct FailingKv;

    #[async_trait]
    impl KvStore for FailingKv {
        async fn get(&self, _: &str) -> vitae_core::Result<Option<String>> {
            Err(VitaeError::KvStore("store unreachable".into()))
        }
        async fn set(
            &self,
            _: &str,
            _: &str,
            _: Option<Duration>,
        ) -> vitae_core::Result<()> {
            Err(VitaeError::KvStore("store unreachable".into()))
        }
        async fn incr(&self, _: &str) -> vitae_core::Result<i64> {
            Err(VitaeError::KvStore("store unreachable".into()))
        }
        async fn expire(&self, _: &str, _: Duration) -> vitae_core::Result<()> {
            Err(VitaeError::KvStore("store unreachable".into()))
        }
        async fn delete(&self, _: &str) -> vitae_core::Result<()> {
            Err(VitaeError::KvStore("store unreachable".into()))
        }
        async fn push_bounded(&self, _: &str, _: &str, _: usize) -> vitae_core::Result<()> {
            Err(VitaeError::KvStore("store unreachable".into()))
        }
        async fn list(&self, _: &str) -> vitae_core::Result<Vec<String>> {
            Err(VitaeError::KvStore("store unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_open() {
        let b = breaker(Arc::new(FailingKv));
        assert_eq!(b.get_state().await, CircuitState::Closed);
        assert!(b.can_attempt().await);
        // Recording against a dead store must not panic or error out.
        b.record_failure().await;
        b.record_success().await;
        assert!(b.can_attempt().await);
    }
}
