use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `vitae.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitaeConfig {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub embedding: EmbeddingConfig,
    pub breaker: BreakerConfig,
    pub rag: RagConfig,
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. `["*"]` is rejected in production.
    pub cors_origins: Vec<String>,
    pub debug: bool,
    pub rate_limit_enabled: bool,
    /// Requests allowed per client IP per minute.
    pub requests_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".into()],
            debug: false,
            rate_limit_enabled: true,
            requests_per_minute: 60,
        }
    }
}

// ── LLM providers ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Primary provider credential. The provider is enabled iff set.
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    /// Secondary provider credential. The provider is enabled iff set.
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    /// Per-attempt adapter call timeout.
    pub request_timeout_secs: u64,
    /// Maximum tokens per generated answer.
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".into(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".into(),
            request_timeout_secs: 30,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

// ── Embeddings ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_key: Option<String>,
    pub model: String,
    /// Expected vector length. A save with any other length is rejected.
    pub dimensions: usize,
    /// Cumulative deadline across retries.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "text-embedding-3-small".into(),
            dimensions: 1536,
            timeout_secs: 60,
        }
    }
}

// ── Circuit breaker ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures within the window that trip the circuit.
    pub failure_threshold: u32,
    /// Sliding failure window, seconds.
    pub failure_window_secs: u64,
    /// How long an open circuit rejects before a probe is allowed, seconds.
    pub open_duration_secs: u64,
    /// Per-operation deadline on the backing store; timeout means fail-open.
    pub store_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 300,
            open_duration_secs: 120,
            store_timeout_ms: 1000,
        }
    }
}

// ── RAG tuning ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Token budget for the prompt history block.
    pub history_token_budget: usize,
    /// Minimum similarity for a retrieved hit to count as context.
    pub similarity_threshold: f32,
    /// How many recent turns to consider for the history window.
    pub history_turns: usize,
    /// Context items retrieved when the request doesn't say.
    pub default_context_items: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            history_token_budget: 2048,
            similarity_threshold: 0.5,
            history_turns: 10,
            default_context_items: 5,
        }
    }
}

// ── Scraper ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Browser contexts in the pool.
    pub pool_size: usize,
    /// How long an acquire waits before fabricating a fresh context, seconds.
    pub acquire_timeout_secs: u64,
    /// Page navigation deadline, seconds.
    pub page_timeout_secs: u64,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            acquire_timeout_secs: 30,
            page_timeout_secs: 30,
            cache_enabled: true,
            cache_ttl_secs: 3600,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
        }
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database holding embeddings and conversations.
    pub db_path: PathBuf,
    /// Retention window consumed by the offline cleanup job.
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("vitae.db"),
            retention_days: 90,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter, e.g. "info" or "vitae=debug,info".
    pub level: String,
    /// "text" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl VitaeConfig {
    /// Validate config values. Returns warnings for soft issues,
    /// errors for configurations that must not start.
    pub fn validate(&self, production: bool) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.embedding.dimensions == 0 {
            return Err("embedding.dimensions must be positive".into());
        }
        if self.breaker.failure_threshold == 0 {
            return Err("breaker.failure_threshold must be positive".into());
        }
        if self.scraper.pool_size == 0 {
            return Err("scraper.pool_size must be positive".into());
        }
        if self.rag.history_token_budget == 0 {
            return Err("rag.history_token_budget must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.rag.similarity_threshold) {
            return Err("rag.similarity_threshold must be within [0, 1]".into());
        }

        if production {
            if self.server.debug {
                return Err("server.debug must be false in production".into());
            }
            if self.server.cors_origins.iter().any(|o| o == "*") {
                return Err("server.cors_origins cannot be open (*) in production".into());
            }
            if !self.scraper.cache_enabled {
                return Err("scraper.cache_enabled must be true in production".into());
            }
        }

        if self.providers.anthropic_api_key.is_none() && self.providers.openai_api_key.is_none() {
            warnings.push(
                "no provider credentials configured: every chat will use the static fallback"
                    .to_string(),
            );
        }
        if self.embedding.api_key.is_none() {
            warnings.push("embedding.api_key not set: ingest and retrieval will fail".to_string());
        }

        Ok(warnings)
    }
}
